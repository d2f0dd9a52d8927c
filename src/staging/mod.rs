//! Staging module
//!
//! Keeps the most recent staged snapshot of each source in an object store,
//! so the validator can later compare it with what the database holds.
//! One JSON object per source, overwritten on every run.

mod store;

pub use store::{staged_key, StagingStore};

#[cfg(test)]
mod tests;
