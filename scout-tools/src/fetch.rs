//! Web fetch capability.
//!
//! Downloads a page with a bounded redirect chain and returns the raw body as
//! a [`FetchPayload`]. Non-success statuses are call failures.

use crate::http::{build_client, check_response, transport_error};
use crate::registry::Capability;
use async_trait::async_trait;
use scout_core::client::{capabilities, operations};
use scout_core::config::ToolsConfig;
use scout_core::error::ToolError;
use scout_core::payload::FetchPayload;
use serde_json::Value;
use tracing::debug;

/// Fetches a URL over HTTP(S).
pub struct WebFetch {
    http: reqwest::Client,
}

impl WebFetch {
    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        Ok(Self {
            http: build_client(
                capabilities::WEB_FETCH,
                &config.user_agent,
                config.call_timeout(),
                config.max_redirects,
            )?,
        })
    }
}

/// Only absolute http and https URLs are fetched.
pub fn validate_url(raw: &str) -> Result<url::Url, ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        capability: capabilities::WEB_FETCH.to_string(),
        operation: operations::FETCH.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(format!("invalid url '{raw}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported url scheme '{other}'"))),
    }
}

#[async_trait]
impl Capability for WebFetch {
    fn name(&self) -> &str {
        capabilities::WEB_FETCH
    }

    fn operations(&self) -> &[&'static str] {
        &[operations::FETCH]
    }

    async fn invoke(&self, operation: &str, params: Value) -> Result<Value, ToolError> {
        const CAP: &str = capabilities::WEB_FETCH;
        if operation != operations::FETCH {
            return Err(ToolError::UnknownOperation {
                capability: CAP.to_string(),
                operation: operation.to_string(),
            });
        }
        let raw = params.get("url").and_then(Value::as_str).ok_or_else(|| {
            ToolError::InvalidArguments {
                capability: CAP.to_string(),
                operation: operation.to_string(),
                reason: "missing required parameter: url".into(),
            }
        })?;
        let url = validate_url(raw)?;

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(CAP, operation, e))?;
        let resp = check_response(CAP, operation, resp).await?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let html = resp
            .text()
            .await
            .map_err(|e| transport_error(CAP, operation, e))?;
        debug!(url = %url, final_url = %final_url, status, bytes = html.len(), "Fetched page");

        serde_json::to_value(FetchPayload {
            url: final_url,
            status,
            content_type,
            html,
        })
        .map_err(|e| ToolError::MalformedPayload {
            capability: CAP.to_string(),
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}
