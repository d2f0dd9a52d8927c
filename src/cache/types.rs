//! Identifier set types

use crate::types::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// All identifier sets of a cache, by cache key.
///
/// Serialized as a JSON object mapping each key to a sorted array of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierSets {
    sets: BTreeMap<String, BTreeSet<RecordId>>,
}

impl IdentifierSets {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of one set (empty if the key was never written)
    pub fn members(&self, key: &str) -> HashSet<RecordId> {
        self.sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Union `ids` into a set, returning how many were not yet present
    pub fn add<'a>(&mut self, key: &str, ids: impl IntoIterator<Item = &'a RecordId>) -> usize {
        let set = self.sets.entry(key.to_string()).or_default();
        ids.into_iter()
            .filter(|id| set.insert((*id).clone()))
            .count()
    }

    /// Number of members of one set
    pub fn len(&self, key: &str) -> usize {
        self.sets.get(key).map_or(0, BTreeSet::len)
    }
}
