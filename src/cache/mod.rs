//! Identifier cache module
//!
//! Remembers which record identifiers have already been synchronized, per
//! cache key, so that only unseen records incur a detail fetch.
//!
//! # Overview
//!
//! The cache module provides:
//! - `IdentifierStore` - Get-all / add-members interface over a durable set store
//! - `FileIdentifierStore` - JSON file backed store with atomic writes
//! - `resolve` - Set difference of fetched and known identifiers
//!
//! Identifiers never expire once stored.

mod resolver;
mod store;
mod types;

pub use resolver::resolve;
pub use store::{FileIdentifierStore, IdentifierStore};
pub use types::IdentifierSets;
