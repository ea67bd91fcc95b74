//! Tool: web_fetch. HTTP GET with a 30 s timeout, body truncated at 50k.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{truncate_output, Tool, ToolOutput};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct Params {
    url: String,
}

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL with HTTP GET and return the response body as text. \
         Times out after 30 seconds; output is truncated at 50000 characters."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch."
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutput {
        let params: Params = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("invalid arguments: {e}")),
        };

        if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
            return ToolOutput::error(format!("not an http(s) URL: '{}'", params.url));
        }

        let resp = match self.client.get(&params.url).send().await {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("fetch failed: {e}")),
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolOutput::error(format!("failed to read body: {e}")),
        };

        if !status.is_success() {
            return ToolOutput::error(format!("HTTP {status}: {}", truncate_output(body)));
        }
        ToolOutput::success(truncate_output(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_http_urls_are_rejected() {
        let tool = WebFetchTool::new();
        let out = tool
            .execute(serde_json::json!({"url": "file:///etc/passwd"}))
            .await;
        assert!(out.is_error);
    }
}
