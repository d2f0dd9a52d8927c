//! Change-set resolution

use crate::types::RecordId;
use std::collections::{BTreeSet, HashSet};

/// Identifiers in `fetched` that are not in `known`, in fetch order and
/// without duplicates.
///
/// Comparison is exact: `RecordId::Int(42)` and `RecordId::Text("42")`
/// are different identifiers.
pub fn resolve(fetched: &[RecordId], known: &HashSet<RecordId>) -> Vec<RecordId> {
    let mut seen = BTreeSet::new();
    fetched
        .iter()
        .filter(|id| !known.contains(*id) && seen.insert(*id))
        .cloned()
        .collect()
}
