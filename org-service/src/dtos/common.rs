use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::{Page, PageResult, SortSpec};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Raw pagination query; values stay strings so bad input falls back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub order_by: Option<String>,
    pub sort: Option<String>,
    pub search: Option<String>,
}

impl ListParams {
    pub fn page(&self) -> Page {
        Page::from_params(self.limit.as_deref(), self.offset.as_deref())
    }

    pub fn sort_spec(&self) -> Option<SortSpec> {
        SortSpec::from_params(self.order_by.as_deref(), self.sort.as_deref())
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GetManyResponse<T> {
    pub limit: u64,
    pub offset: u64,
    pub total: u64,
    pub has_next: bool,
    pub items: Vec<T>,
}

impl<T> GetManyResponse<T> {
    pub fn from_page<E>(result: PageResult<E>, map: impl FnMut(E) -> T) -> Self {
        let result = result.map(map);
        Self {
            limit: result.page.limit,
            offset: result.page.offset,
            total: result.total,
            has_next: result.has_next,
            items: result.items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfoResponse {
    pub version: String,
    pub env: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PatchLogLevel {
    #[validate(length(min = 1, message = "Level is required"))]
    pub level: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}
