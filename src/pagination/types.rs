//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all strategies.
//! A paginator never touches the network: it turns a `SyncState` into
//! query parameters and, once a page has been fetched successfully,
//! advances that state.

use crate::error::{Error, Result};
use crate::schema::lookup_path;
use serde::Deserialize;
use serde_json::Value;

/// Result of the next page computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// More pages available
    Continue,
    /// No more pages
    Done,
}

/// When a page-indexed walk ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// Stop when a page returns fewer items than the page size
    #[default]
    ShortPage,
    /// Stop only when a page is empty
    EmptyPage,
}

/// Position of one fetch run. Created per `fetch_all` call and discarded
/// when it returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Current page number (page-indexed endpoints)
    pub page: u32,
    /// Cursor for the current page (cursor endpoints)
    pub cursor: Option<String>,
    /// Pages fetched successfully so far
    pub pages_fetched: u32,
    /// Items fetched so far
    pub total_fetched: u64,
}

impl SyncState {
    /// Create state with a starting page
    pub fn with_page(page: u32) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Short description of the position, for logs and errors
    pub fn describe(&self) -> String {
        match &self.cursor {
            Some(cursor) => format!("cursor {cursor}"),
            None if self.pages_fetched == 0 && self.page == 0 => "first page".to_string(),
            None => format!("page {}", self.page),
        }
    }

    /// Record a fetched page
    pub fn record_page(&mut self, item_count: usize) {
        self.pages_fetched += 1;
        self.total_fetched += item_count as u64;
    }
}

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// State for the first request
    fn initial_state(&self) -> SyncState {
        SyncState::default()
    }

    /// Query parameters for the page `state` points at
    fn request_params(&self, state: &SyncState) -> Vec<(String, String)>;

    /// Pull the items out of a page body
    fn extract_items(&self, body: &Value) -> Result<Vec<Value>>;

    /// Move past a successfully fetched page
    fn advance(&self, body: &Value, item_count: usize, state: &mut SyncState) -> NextPage;
}

/// Items of a page: the body itself if it is an array, otherwise the array
/// at `items_path`
pub fn items_at(body: &Value, items_path: Option<&str>) -> Result<Vec<Value>> {
    let target = match items_path {
        Some(path) => match lookup_path(body, path) {
            Some(value) => value,
            // A page without the items field has no items
            None => return Ok(Vec::new()),
        },
        None => body,
    };

    match target {
        Value::Array(items) => Ok(items.clone()),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::decode(format!(
            "expected an array of items{}, got {}",
            items_path.map(|p| format!(" at '{p}'")).unwrap_or_default(),
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
