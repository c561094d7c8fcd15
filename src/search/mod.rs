//! Web search
//!
//! A search call never fails from the caller's point of view: provider
//! errors degrade to an empty result list, and a research run carries on
//! with whatever evidence it already has.

mod tavily;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use tavily::{SearchDepth, TavilySearchClient, Topic, DEFAULT_TAVILY_BASE_URL};

/// One search result with usable content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub content: String,
}

impl SearchHit {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
        }
    }
}

/// Executes one search query
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Up to `max_results` hits, each with non-empty content.
    /// Returns an empty list on any failure.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit>;
}
