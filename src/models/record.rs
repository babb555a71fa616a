//! Search result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ranked result: the first document of a provider group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// 1-based position in provider order.
    pub position: usize,
    pub domain: String,
    pub url: String,
    pub title: String,
    /// First passage, or empty when the provider sent none.
    pub snippet: String,
    /// Detected document language.
    pub lang: String,
    pub charset: String,
    /// Document size in bytes.
    pub size: u64,
    /// Last modification time; `None` when the provider left it empty.
    pub modified: Option<DateTime<Utc>>,
}

/// A parsed search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Provider request id, useful when reporting issues upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reqid: Option<String>,
    /// Query text as the provider understood it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Estimated total number of matching documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<u64>,
    /// Human-readable phrase for the estimate ("Found 3 thousand answers").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_human: Option<String>,
    pub records: Vec<SearchRecord>,
}

impl SearchResponse {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
