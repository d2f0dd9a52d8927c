//! Endpoint definitions
//!
//! Each source declares its endpoints by name. The kind of an endpoint
//! decides how it is paged; lookups go through `EndpointRegistry`.

use crate::error::{Error, Result};
use crate::pagination::{CursorPaginator, PageNumberPaginator, Paginator, StopCondition};
use serde::Deserialize;
use std::collections::BTreeMap;

/// A named upstream endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    /// `?page=N&per_page=M` list endpoint
    PageIndexed(PageIndexedParams),
    /// Token-paged list endpoint
    Cursor(CursorParams),
    /// One record per request, addressed by id
    Detail(DetailParams),
}

/// Parameters of a page-indexed endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageIndexedParams {
    /// Request path, relative to the source base URL
    pub path: String,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    #[serde(default)]
    pub stop: StopCondition,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Path to the items array when the body is an object
    #[serde(default)]
    pub items_path: Option<String>,
    /// Extra query parameters sent with every page
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Parameters of a cursor endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CursorParams {
    pub path: String,
    #[serde(default = "default_cursor_param")]
    pub cursor_param: String,
    #[serde(default = "default_cursor_path")]
    pub cursor_path: String,
    #[serde(default = "default_items_path")]
    pub items_path: String,
    #[serde(default)]
    pub page_size_param: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Parameters of a detail endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DetailParams {
    /// Path template containing `{{ id }}`
    pub path: String,
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_page_size_param() -> String {
    "per_page".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_start_page() -> u32 {
    1
}

fn default_cursor_param() -> String {
    "pageToken".to_string()
}

fn default_cursor_path() -> String {
    "nextPageToken".to_string()
}

fn default_items_path() -> String {
    "items".to_string()
}

fn default_max_pages() -> u32 {
    200
}

impl Endpoint {
    /// Request path (a template for detail endpoints)
    pub fn path(&self) -> &str {
        match self {
            Endpoint::PageIndexed(p) => &p.path,
            Endpoint::Cursor(p) => &p.path,
            Endpoint::Detail(p) => &p.path,
        }
    }

    /// Fixed query parameters
    pub fn query_params(&self) -> Vec<(String, String)> {
        let params = match self {
            Endpoint::PageIndexed(p) => &p.params,
            Endpoint::Cursor(p) => &p.params,
            Endpoint::Detail(_) => return Vec::new(),
        };
        params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Paginator for list endpoints, `None` for detail endpoints
    pub fn paginator(&self) -> Option<Box<dyn Paginator>> {
        match self {
            Endpoint::PageIndexed(p) => {
                let mut paginator = PageNumberPaginator::new(p.page_size)
                    .with_params(&p.page_param, &p.page_size_param)
                    .with_start_page(p.start_page)
                    .with_stop_condition(p.stop)
                    .with_max_pages(p.max_pages);
                if let Some(ref items_path) = p.items_path {
                    paginator = paginator.with_items_path(items_path);
                }
                Some(Box::new(paginator))
            }
            Endpoint::Cursor(p) => {
                let mut paginator = CursorPaginator::new(&p.cursor_param, &p.cursor_path)
                    .with_items_path(&p.items_path)
                    .with_max_pages(p.max_pages);
                if let (Some(param), Some(size)) = (&p.page_size_param, p.page_size) {
                    paginator = paginator.with_page_size(param, size);
                }
                Some(Box::new(paginator))
            }
            Endpoint::Detail(_) => None,
        }
    }

    /// Whether this endpoint returns one record per id
    pub fn is_detail(&self) -> bool {
        matches!(self, Endpoint::Detail(_))
    }
}

/// Lookup table of a source's endpoints
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    source: String,
    endpoints: BTreeMap<String, Endpoint>,
}

impl EndpointRegistry {
    /// Create a registry for a source
    pub fn new(source: impl Into<String>, endpoints: BTreeMap<String, Endpoint>) -> Self {
        Self {
            source: source.into(),
            endpoints,
        }
    }

    /// Reject list endpoints whose paging could never end
    pub fn validate(&self) -> Result<()> {
        for (name, endpoint) in &self.endpoints {
            let (page_size, max_pages) = match endpoint {
                Endpoint::PageIndexed(p) => (Some(p.page_size), p.max_pages),
                Endpoint::Cursor(p) => (p.page_size, p.max_pages),
                Endpoint::Detail(_) => continue,
            };
            if page_size == Some(0) {
                return Err(Error::config(format!(
                    "endpoint '{name}' of source '{}' has page_size 0",
                    self.source
                )));
            }
            if max_pages == 0 {
                return Err(Error::config(format!(
                    "endpoint '{name}' of source '{}' has max_pages 0",
                    self.source
                )));
            }
        }
        Ok(())
    }

    /// Look up an endpoint by name
    pub fn get(&self, name: &str) -> Result<&Endpoint> {
        self.endpoints
            .get(name)
            .ok_or_else(|| Error::UnknownEndpoint {
                source_name: self.source.clone(),
                endpoint: name.to_string(),
            })
    }

    /// Look up a list endpoint
    pub fn list(&self, name: &str) -> Result<&Endpoint> {
        let endpoint = self.get(name)?;
        if endpoint.is_detail() {
            return Err(Error::config(format!(
                "endpoint '{name}' of source '{}' is a detail endpoint, expected a list",
                self.source
            )));
        }
        Ok(endpoint)
    }

    /// Look up a detail endpoint
    pub fn detail(&self, name: &str) -> Result<&Endpoint> {
        let endpoint = self.get(name)?;
        if !endpoint.is_detail() {
            return Err(Error::config(format!(
                "endpoint '{name}' of source '{}' is not a detail endpoint",
                self.source
            )));
        }
        Ok(endpoint)
    }
}
