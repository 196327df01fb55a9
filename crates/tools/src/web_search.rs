//! Web search tool backed by the Tavily search API.

use std::time::Duration;

use async_trait::async_trait;
use handoff_core::error::ToolError;
use handoff_core::tool::Tool;
use serde_json::{Value, json};
use tracing::{debug, warn};

const NAME: &str = "web_search";
const TAVILY_URL: &str = "https://api.tavily.com/search";
const DEFAULT_MAX_RESULTS: u64 = 5;
const MAX_RESULTS_CEILING: u64 = 20;

pub struct WebSearchTool {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: TAVILY_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Point the tool at a different search endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn payload(api_key: &str, query: &str, max_results: Option<u64>) -> Value {
        json!({
            "api_key": api_key,
            "query": query,
            "max_results": max_results
                .unwrap_or(DEFAULT_MAX_RESULTS)
                .clamp(1, MAX_RESULTS_CEILING),
            "search_depth": "basic",
            "include_answer": true,
        })
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Search the web for real-time information, news and answers. Returns a short answer \
         plus a list of results with titles, URLs and snippets."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (1-20, default 5)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ToolError::failed(
                NAME,
                "Tavily API key (TAVILY_API_KEY) is not set",
            ));
        };
        let query = arguments["query"].as_str().unwrap_or_default().trim();
        if query.is_empty() {
            return Err(ToolError::invalid(NAME, "a search query must be provided"));
        }

        let max_results = &arguments["max_results"];
        let max_results = max_results
            .as_u64()
            .or_else(|| max_results.as_f64().map(|f| f as u64));
        let payload = Self::payload(api_key, query, max_results);
        debug!(query, "Searching the web");

        let response = self
            .client
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ToolError::failed(NAME, format!("Network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Tavily search failed");
            return Err(ToolError::failed(
                NAME,
                format!("HTTP error {}: {body}", status.as_u16()),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolError::failed(NAME, format!("Malformed search response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn max_results_is_clamped() {
        assert_eq!(WebSearchTool::payload("k", "q", None)["max_results"], 5);
        assert_eq!(WebSearchTool::payload("k", "q", Some(0))["max_results"], 1);
        assert_eq!(WebSearchTool::payload("k", "q", Some(99))["max_results"], 20);
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let tool = WebSearchTool::new(None).with_base_url("http://127.0.0.1:9");
        let err = tool.execute(json!({"query": "rust"})).await.unwrap_err();
        assert!(err.to_string().contains("TAVILY_API_KEY"));
    }

    #[tokio::test]
    async fn blank_query_is_invalid() {
        let tool = WebSearchTool::new(Some("key".into()));
        let err = tool.execute(json!({"query": "   "})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn returns_search_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"query": "rust", "api_key": "key"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Rust is a systems language.",
                "results": [{"title": "Rust", "url": "https://www.rust-lang.org", "content": "..."}]
            })))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Some("key".into())).with_base_url(server.uri());
        let result = tool.execute(json!({"query": "rust"})).await.unwrap();
        assert_eq!(result["answer"], "Rust is a systems language.");
        assert_eq!(result["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn http_error_is_execution_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Some("key".into())).with_base_url(server.uri());
        let err = tool.execute(json!({"query": "rust"})).await.unwrap_err();
        assert!(err.to_string().contains("HTTP error 401"));
    }
}
