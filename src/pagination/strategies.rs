//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{items_at, NextPage, Paginator, StopCondition, SyncState};
use crate::error::Result;
use crate::schema::lookup_path;
use serde_json::Value;
use tracing::warn;

// ============================================================================
// Page Number Pagination
// ============================================================================

/// Page number pagination
///
/// Common patterns:
/// - `?page=2&per_page=50`
#[derive(Debug, Clone)]
pub struct PageNumberPaginator {
    /// Query parameter name for page number
    pub page_param: String,
    /// First page number (usually 0 or 1)
    pub start_page: u32,
    /// Page size parameter name
    pub page_size_param: String,
    /// Page size value
    pub page_size: u32,
    /// Path to the items array, if the body is not the array itself
    pub items_path: Option<String>,
    /// Stop condition
    pub stop_condition: StopCondition,
    /// Upper bound on pages per run
    pub max_pages: Option<u32>,
}

impl PageNumberPaginator {
    /// Create a new page number paginator using `page` / `per_page`
    pub fn new(page_size: u32) -> Self {
        Self {
            page_param: "page".to_string(),
            start_page: 1,
            page_size_param: "per_page".to_string(),
            page_size,
            items_path: None,
            stop_condition: StopCondition::default(),
            max_pages: None,
        }
    }

    /// Set parameter names
    #[must_use]
    pub fn with_params(
        mut self,
        page_param: impl Into<String>,
        page_size_param: impl Into<String>,
    ) -> Self {
        self.page_param = page_param.into();
        self.page_size_param = page_size_param.into();
        self
    }

    /// Set the first page number
    #[must_use]
    pub fn with_start_page(mut self, start_page: u32) -> Self {
        self.start_page = start_page;
        self
    }

    /// Read items from a field of the body
    #[must_use]
    pub fn with_items_path(mut self, path: impl Into<String>) -> Self {
        self.items_path = Some(path.into());
        self
    }

    /// Set the stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, stop_condition: StopCondition) -> Self {
        self.stop_condition = stop_condition;
        self
    }

    /// Stop after this many pages
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

impl Paginator for PageNumberPaginator {
    fn initial_state(&self) -> SyncState {
        SyncState::with_page(self.start_page)
    }

    fn request_params(&self, state: &SyncState) -> Vec<(String, String)> {
        vec![
            (self.page_param.clone(), state.page.to_string()),
            (self.page_size_param.clone(), self.page_size.to_string()),
        ]
    }

    fn extract_items(&self, body: &Value) -> Result<Vec<Value>> {
        items_at(body, self.items_path.as_deref())
    }

    fn advance(&self, _body: &Value, item_count: usize, state: &mut SyncState) -> NextPage {
        state.record_page(item_count);

        // An empty page ends the walk under either condition
        let done = match self.stop_condition {
            StopCondition::EmptyPage => item_count == 0,
            StopCondition::ShortPage => item_count == 0 || item_count < self.page_size as usize,
        };
        if done {
            return NextPage::Done;
        }

        if let Some(max) = self.max_pages {
            if state.pages_fetched >= max {
                warn!(max_pages = max, page = state.page, "Reached page limit, stopping pagination");
                return NextPage::Done;
            }
        }

        state.page += 1;
        NextPage::Continue
    }
}

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Cursor-based pagination driven by a next-page token in the body
///
/// Common patterns:
/// - `?pageToken=CAUQAA&maxResults=50` with `nextPageToken` in the response
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    /// Query parameter name for cursor
    pub cursor_param: String,
    /// Path to the next cursor in the response
    pub cursor_path: String,
    /// Page size parameter name and value
    pub page_size: Option<(String, u32)>,
    /// Path to the items array
    pub items_path: Option<String>,
    /// Upper bound on pages per run
    pub max_pages: Option<u32>,
}

impl CursorPaginator {
    /// Create a new cursor paginator
    pub fn new(cursor_param: impl Into<String>, cursor_path: impl Into<String>) -> Self {
        Self {
            cursor_param: cursor_param.into(),
            cursor_path: cursor_path.into(),
            page_size: None,
            items_path: None,
            max_pages: None,
        }
    }

    /// `pageToken` / `nextPageToken` / `items`
    pub fn next_page_token() -> Self {
        Self::new("pageToken", "nextPageToken").with_items_path("items")
    }

    /// Send a page size parameter
    #[must_use]
    pub fn with_page_size(mut self, param: impl Into<String>, size: u32) -> Self {
        self.page_size = Some((param.into(), size));
        self
    }

    /// Read items from a field of the body
    #[must_use]
    pub fn with_items_path(mut self, path: impl Into<String>) -> Self {
        self.items_path = Some(path.into());
        self
    }

    /// Stop after this many pages
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

impl Paginator for CursorPaginator {
    fn request_params(&self, state: &SyncState) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some((param, size)) = &self.page_size {
            params.push((param.clone(), size.to_string()));
        }
        if let Some(cursor) = &state.cursor {
            params.push((self.cursor_param.clone(), cursor.clone()));
        }
        params
    }

    fn extract_items(&self, body: &Value) -> Result<Vec<Value>> {
        items_at(body, self.items_path.as_deref())
    }

    fn advance(&self, body: &Value, item_count: usize, state: &mut SyncState) -> NextPage {
        state.record_page(item_count);

        let next = lookup_path(body, &self.cursor_path)
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());
        let Some(cursor) = next else {
            return NextPage::Done;
        };

        if let Some(max) = self.max_pages {
            if state.pages_fetched >= max {
                warn!(max_pages = max, "Reached page limit, stopping pagination");
                return NextPage::Done;
            }
        }

        state.cursor = Some(cursor.to_string());
        NextPage::Continue
    }
}
