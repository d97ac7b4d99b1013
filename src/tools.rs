//! # Tools Module
//!
//! Web search through the Tavily Search API.
//!
//! - Typed errors for rate limits, timeouts and auth failures
//! - Retry with exponential backoff on transient failures only
//! - A [`WebSearch`] trait so the research step can run against a fake

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default Tavily endpoint
pub const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Default timeout for Tavily API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Tavily rejects longer queries
const MAX_QUERY_CHARS: usize = 400;

// =============================================================================
// CUSTOM ERROR TYPE
// =============================================================================
/// Typed errors for the Tavily API
#[derive(Debug, Error)]
pub enum TavilyError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check TAVILY_API_KEY")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TavilyError {
    /// Only transient failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TavilyError::Timeout
                | TavilyError::Connection(_)
                | TavilyError::RateLimited
                | TavilyError::ServerError(_, _)
        )
    }
}

// =============================================================================
// SEARCH RESULT STRUCT
// =============================================================================
/// One web page returned by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    /// Extracted content/snippet
    pub content: String,
    /// Relevance score (0-1)
    pub score: f64,
}

/// What a search pass returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Provider-written answer, when one was requested
    pub answer: Option<String>,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// Render as markdown for the reflection and analysis prompts
    pub fn to_markdown(&self) -> String {
        if self.hits.is_empty() && self.answer.is_none() {
            return "No web results found.".to_string();
        }

        let mut output = String::new();
        if let Some(answer) = &self.answer {
            output.push_str(&format!("**Summary:** {answer}\n\n"));
        }

        for hit in &self.hits {
            output.push_str(&format!(
                "### [{}]({})\n**Relevance:** {:.0}%\n\n{}\n\n",
                hit.title,
                hit.url,
                hit.score * 100.0,
                hit.content
            ));
        }

        output.trim_end().to_string()
    }
}

// =============================================================================
// WEB SEARCH TRAIT
// =============================================================================
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResults, TavilyError>;
}

// =============================================================================
// TAVILY CLIENT
// =============================================================================
/// Request body for the Tavily API
#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    topic: &'static str,
    include_answer: bool,
    include_raw_content: bool,
}

/// Response from the Tavily API
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// Tavily Search client
///
/// # Example
/// ```ignore
/// let search = TavilySearch::new("tvly-...", 5);
/// let results = search.search("at-will employment California").await?;
/// ```
pub struct TavilySearch {
    api_key: String,
    client: Client,
    endpoint: String,
    max_results: usize,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl std::fmt::Debug for TavilySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilySearch")
            .field("endpoint", &self.endpoint)
            .field("max_results", &self.max_results)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, max_results: usize) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            endpoint: TAVILY_ENDPOINT.to_string(),
            max_results: max_results.max(1),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Point the client at another endpoint (test servers, proxies)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay of the exponential backoff
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Execute HTTP request with retry and backoff
    async fn execute_with_retry(
        &self,
        request: &TavilyRequest<'_>,
    ) -> Result<TavilyResponse, TavilyError> {
        let mut last_error = TavilyError::Unknown("No attempts made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_base_delay * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis(), "Retrying Tavily request");
                tokio::time::sleep(delay).await;
            }

            match self.execute_single_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "Tavily request failed, will retry");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn execute_single_request(
        &self,
        request: &TavilyRequest<'_>,
    ) -> Result<TavilyResponse, TavilyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TavilyError::Timeout
                } else if e.is_connect() {
                    TavilyError::Connection(e.to_string())
                } else {
                    TavilyError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| TavilyError::ParseError(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(TavilyError::Unauthorized),
            429 => Err(TavilyError::RateLimited),
            400 => Err(TavilyError::BadRequest(error_text)),
            500..=599 => Err(TavilyError::ServerError(status.as_u16(), error_text)),
            _ => Err(TavilyError::HttpError(status.as_u16(), error_text)),
        }
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> Result<SearchResults, TavilyError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(TavilyError::BadRequest("empty query".to_string()));
        }

        // Truncate on a char boundary
        let query = match query.char_indices().nth(MAX_QUERY_CHARS) {
            Some((cut, _)) => &query[..cut],
            None => query,
        };

        info!(query = %query, "Performing web search");

        let request = TavilyRequest {
            query,
            max_results: self.max_results,
            search_depth: "advanced",
            topic: "general",
            include_answer: true,
            include_raw_content: false,
        };

        let response = self.execute_with_retry(&request).await?;

        if response.results.is_empty() {
            warn!(query = %query, "No search results found");
        } else {
            info!(query = %query, count = response.results.len(), "Search completed");
        }

        Ok(SearchResults {
            answer: response.answer.filter(|a| !a.trim().is_empty()),
            hits: response.results.into_iter().take(self.max_results).collect(),
        })
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TavilySearch {
        TavilySearch::new("tvly-test", 2)
            .with_endpoint(format!("{}/search", server.uri()))
            .with_retry_base_delay(Duration::from_millis(1))
    }

    fn body() -> serde_json::Value {
        json!({
            "answer": "At-will employment is the default in California.",
            "results": [
                {"title": "Labor Code 2922", "url": "https://leginfo.legislature.ca.gov/2922", "content": "An employment, having no specified term...", "score": 0.93},
                {"title": "DIR FAQ", "url": "https://www.dir.ca.gov/faq", "content": "Exceptions to at-will...", "score": 0.81},
                {"title": "Blog", "url": "https://blog.example.com", "content": "Opinion", "score": 0.2}
            ]
        })
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TavilyError::Timeout.is_retryable());
        assert!(TavilyError::RateLimited.is_retryable());
        assert!(TavilyError::ServerError(503, String::new()).is_retryable());
        assert!(!TavilyError::Unauthorized.is_retryable());
        assert!(!TavilyError::BadRequest(String::new()).is_retryable());
    }

    #[test]
    fn test_markdown_rendering() {
        let results = SearchResults {
            answer: Some("Yes.".to_string()),
            hits: vec![SearchHit {
                title: "Labor Code 2922".to_string(),
                url: "https://example.com/2922".to_string(),
                content: "No specified term".to_string(),
                score: 0.5,
            }],
        };
        let md = results.to_markdown();
        assert!(md.starts_with("**Summary:** Yes."));
        assert!(md.contains("[Labor Code 2922](https://example.com/2922)"));
        assert!(md.contains("50%"));

        assert_eq!(SearchResults::default().to_markdown(), "No web results found.");
    }

    #[tokio::test]
    async fn test_search_success_caps_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer tvly-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .expect(1)
            .mount(&server)
            .await;

        let results = client(&server).search("at-will employment").await.unwrap();

        assert_eq!(results.hits.len(), 2);
        assert_eq!(results.hits[0].title, "Labor Code 2922");
        assert!(results.answer.is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).search("q").await.unwrap_err();
        assert!(matches!(err, TavilyError::Unauthorized));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server)
            .with_max_retries(2)
            .search("q")
            .await
            .unwrap_err();
        assert!(matches!(err, TavilyError::ServerError(503, ref text) if text == "busy"));
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .mount(&server)
            .await;

        let results = client(&server).search("q").await.unwrap();
        assert_eq!(results.hits.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).search("q").await.unwrap_err();
        assert!(matches!(err, TavilyError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_empty_query_rejected_locally() {
        let search = TavilySearch::new("k", 5).with_endpoint("http://127.0.0.1:9/search");
        let err = search.search("   ").await.unwrap_err();
        assert!(matches!(err, TavilyError::BadRequest(_)));
    }
}
