//! Table schema module
//!
//! Declares the typed shape of each record type and maps upstream JSON
//! items onto records of that shape.
//!
//! # Features
//!
//! - **Closed type set**: every column has one `FieldType`
//! - **Path mapping**: columns read dot-separated paths from the JSON item
//! - **Coercion**: numbers, strings and timestamps are converted per column
//! - **DDL**: schemas render their own `CREATE TABLE` statement

mod mapping;
mod types;

pub use mapping::{coerce, lookup_path, parse_date, parse_timestamp};
pub use types::{ColumnDef, FieldType, TableSchema};
pub(crate) use types::quote_ident;
