//! Tavily Search client
//!
//! Posts one query to the Tavily Search API with a rotated credential.
//! Rate-limit, quota and auth failures move on to the next key; anything
//! else, or running out of keys, yields an empty result list.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{SearchClient, SearchHit};
use crate::credentials::{Credential, RotatingCredentials};
use crate::error::SearchError;
use crate::retry::{RotationError, RotationPolicy};

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// Default timeout for Tavily API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tavily rejects longer queries
const MAX_QUERY_CHARS: usize = 400;

/// Tavily's per-request result cap
const MAX_RESULTS_CAP: usize = 20;

/// Search depth for Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Fast search with basic results
    #[default]
    Basic,
    /// More thorough search with detailed results
    Advanced,
}

/// Topic filter for Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// General web search
    #[default]
    General,
    /// Recent news articles
    News,
}

/// Tavily-backed [`SearchClient`]
///
/// # Example
/// ```ignore
/// let keys = Arc::new(RotatingCredentials::from_env("TAVILY_API_KEY")?);
/// let search = TavilySearchClient::new(keys);
/// let hits = search.search("Chevening Scholarship deadline", 3).await;
/// ```
pub struct TavilySearchClient {
    credentials: Arc<RotatingCredentials>,
    client: Client,
    base_url: String,
    timeout: Duration,
    search_depth: SearchDepth,
    topic: Topic,
    policy: RotationPolicy,
}

impl TavilySearchClient {
    pub fn new(credentials: Arc<RotatingCredentials>) -> Self {
        Self {
            credentials,
            client: Client::new(),
            base_url: DEFAULT_TAVILY_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            search_depth: SearchDepth::default(),
            topic: Topic::default(),
            policy: RotationPolicy::default(),
        }
    }

    /// Point at a different API host (mock servers, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_search_depth(mut self, depth: SearchDepth) -> Self {
        self.search_depth = depth;
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }

    pub fn with_rotation_policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn build_request(&self, query: &str, max_results: usize) -> TavilyRequest {
        TavilyRequest {
            query: truncate_chars(query, MAX_QUERY_CHARS),
            max_results: max_results.clamp(1, MAX_RESULTS_CAP),
            search_depth: self.search_depth,
            topic: self.topic,
            include_answer: false,
            include_raw_content: false,
        }
    }

    /// Execute a single HTTP request with one credential
    async fn execute_single_request(
        &self,
        credential: &Credential,
        request: &TavilyRequest,
    ) -> Result<TavilyResponse, SearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", credential.secret))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else if e.is_connect() {
                    SearchError::Connection(e.to_string())
                } else {
                    SearchError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SearchError::ParseError(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => Err(SearchError::Unauthorized),
            429 => Err(SearchError::RateLimited),
            // Tavily: key or plan usage limit exceeded
            code @ (432 | 433) => Err(SearchError::QuotaExceeded(code)),
            400 => Err(SearchError::BadRequest(error_text)),
            code @ 500..=599 => Err(SearchError::ServerError(code, error_text)),
            code => Err(SearchError::HttpError(code, error_text)),
        }
    }

    /// Search with credential rotation; typed error on failure
    pub async fn try_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, RotationError<SearchError>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        let request = self.build_request(query, max_results);

        let response = self
            .policy
            .run(
                &self.credentials,
                "tavily_search",
                SearchError::is_rotatable,
                |credential| {
                    let request = &request;
                    async move { self.execute_single_request(&credential, request).await }
                },
            )
            .await?;

        Ok(response.into_hits(request.max_results))
    }
}

#[async_trait]
impl SearchClient for TavilySearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        match self.try_search(query, max_results).await {
            Ok(hits) => {
                debug!(query, hits = hits.len(), "Search completed");
                hits
            }
            Err(RotationError::Fatal(e)) => {
                warn!(query, error = %e, "Search failed, continuing without results");
                Vec::new()
            }
            Err(RotationError::Exhausted { attempts, last }) => {
                warn!(query, attempts, error = %last, "Search keys exhausted, continuing without results");
                Vec::new()
            }
        }
    }
}

/// Request body for Tavily API
#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    max_results: usize,
    search_depth: SearchDepth,
    topic: Topic,
    include_answer: bool,
    include_raw_content: bool,
}

/// Response from Tavily API
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

/// Individual search result
#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: Option<String>,
}

impl TavilyResponse {
    /// Drop results without content, cap at `max_results`
    fn into_hits(self, max_results: usize) -> Vec<SearchHit> {
        self.results
            .into_iter()
            .filter_map(|r| match r.content {
                Some(content) if !content.trim().is_empty() => Some(SearchHit::new(r.url, content)),
                _ => None,
            })
            .take(max_results)
            .collect()
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}


/// HTTP tests against a mocked Tavily server
#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, keys: &[&str]) -> TavilySearchClient {
        let creds = RotatingCredentials::new("tavily", keys.iter().map(|k| k.to_string()).collect())
            .unwrap();
        TavilySearchClient::new(Arc::new(creds))
            .with_base_url(server.uri())
            .with_timeout(Duration::from_secs(5))
    }

    fn sample_success_response() -> serde_json::Value {
        serde_json::json!({
            "answer": null,
            "results": [
                {
                    "title": "Chevening Scholarships",
                    "url": "https://www.chevening.org",
                    "content": "Chevening is the UK government's international scholarships programme.",
                    "score": 0.95,
                    "raw_content": null
                },
                {
                    "title": "Empty page",
                    "url": "https://empty.example",
                    "content": "",
                    "score": 0.2,
                    "raw_content": null
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_http_successful_search() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer key-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_success_response()))
            .mount(&mock_server)
            .await;

        let tool = client_for(&mock_server, &["key-1"]);
        let hits = tool.search("Chevening Scholarship", 5).await;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://www.chevening.org");
    }

    #[tokio::test]
    async fn test_http_rate_limit_rotates_to_next_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer key-1"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer key-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_success_response()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let tool = client_for(&mock_server, &["key-1", "key-2"]);
        let hits = tool.search("Chevening Scholarship", 5).await;

        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_http_quota_exhausted_on_every_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(432).set_body_string("Usage limit exceeded"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let tool = client_for(&mock_server, &["a", "b", "c"]);

        let result = tool.try_search("test", 5).await;
        assert!(matches!(
            result,
            Err(RotationError::Exhausted { attempts: 3, last: SearchError::QuotaExceeded(432) })
        ));
    }

    #[tokio::test]
    async fn test_zero_max_results_skips_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_success_response()))
            .expect(0)
            .mount(&mock_server)
            .await;

        let tool = client_for(&mock_server, &["key-1"]);

        assert!(tool.search("Chevening Scholarship", 0).await.is_empty());
        assert!(matches!(tool.try_search("Chevening Scholarship", 0).await, Ok(hits) if hits.is_empty()));
    }

    #[tokio::test]
    async fn test_http_server_error_degrades_without_rotation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal server error"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let tool = client_for(&mock_server, &["a", "b"]);
        let hits = tool.search("test", 5).await;

        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_http_malformed_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
            .mount(&mock_server)
            .await;

        let tool = client_for(&mock_server, &["a"]);

        let result = tool.try_search("test", 5).await;
        assert!(matches!(result, Err(RotationError::Fatal(SearchError::ParseError(_)))));
        assert!(tool.search("test", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_http_connection_refused_degrades() {
        let tool = {
            let creds = RotatingCredentials::new("tavily", vec!["a".to_string()]).unwrap();
            TavilySearchClient::new(Arc::new(creds))
                .with_base_url("http://127.0.0.1:9")
                .with_timeout(Duration::from_secs(2))
        };

        assert!(tool.search("test", 5).await.is_empty());
    }
}
