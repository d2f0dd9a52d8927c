//! Persistence result types

/// Outcome of one upsert batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertResult {
    /// Rows that did not exist before
    pub inserted: usize,
    /// Rows whose primary key already existed and were overwritten
    pub updated: usize,
    /// Records that failed and were skipped
    pub failed: usize,
    /// Indexes (into the input batch) of records that were written
    pub persisted: Vec<usize>,
}

impl UpsertResult {
    /// Records written, inserted or updated
    pub fn written(&self) -> usize {
        self.persisted.len()
    }
}
