//! Pagination module
//!
//! Supports: Page Number, Cursor (next page token)
//!
//! # Overview
//!
//! Strategies describe how to address a page and when the walk ends; the
//! `PaginatedFetcher` drives them against an upstream API, applying the
//! error policy on every request.

mod fetcher;
mod strategies;
mod types;

pub use fetcher::{DetailBatch, PaginatedFetcher};
pub use strategies::{CursorPaginator, PageNumberPaginator};
pub use types::{items_at, NextPage, Paginator, StopCondition, SyncState};
