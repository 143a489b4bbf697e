//! HTTP executor for `api_call` steps.

use std::time::Duration;

use anyhow::Context;
use devflow_core::capability::{StepExecutor, ToolError};
use devflow_core::workflow::StepContext;
use serde_json::{Map, Value, json};

use super::{optional_str, required_str};

/// Sends one HTTP request per invocation.
///
/// Parameters: `url` (required), `method` (default GET), `headers` (object of
/// strings), `body` (strings are sent verbatim, other values as JSON).
/// Non-2xx responses are step failures.
#[derive(Debug, Clone)]
pub struct ApiCall {
    client: reqwest::Client,
}

impl ApiCall {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("devflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl StepExecutor for ApiCall {
    async fn execute(
        &self,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> Result<Value, ToolError> {
        let url = required_str(&parameters, "url")?;
        let method = optional_str(&parameters, "method")
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let http_method: reqwest::Method = method
            .parse()
            .map_err(|_| ToolError::invalid(format!("invalid HTTP method: {method}")))?;

        let mut request = self.client.request(http_method, url);

        if let Some(headers) = parameters.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                request = request.header(key.as_str(), value);
            }
        }

        match parameters.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::String(body)) => request = request.body(body.clone()),
            Some(body) => request = request.json(body),
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::failed(format!("HTTP request to '{url}' failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::failed(format!("failed to read HTTP response body: {e}")))?;

        tracing::info!(
            step_id = %context.step_id,
            method = method.as_str(),
            url,
            status = status.as_u16(),
            "api call completed"
        );

        if !status.is_success() {
            return Err(ToolError::failed(format!(
                "{method} {url} returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({
            "url": url,
            "method": method,
            "status": status.as_u16(),
            "data": data,
        }))
    }
}
