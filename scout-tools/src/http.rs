//! Shared HTTP helpers for the networked capabilities.
//!
//! Centralizes client construction, credential resolution and status-code
//! mapping so each capability only builds its request and maps its response.

use scout_core::error::ToolError;
use std::time::Duration;

const ERROR_BODY_CHARS: usize = 200;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Build a `reqwest` client with the shared user agent and request timeout.
pub fn build_client(
    capability: &str,
    user_agent: &str,
    timeout: Duration,
    max_redirects: usize,
) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(max_redirects))
        .build()
        .map_err(|e| ToolError::NotConfigured {
            capability: capability.to_string(),
            hint: format!("failed to create HTTP client: {e}"),
        })
}

/// Map a non-success response onto [`ToolError`].
///
/// Returns the response unchanged on success. 401/403 mean the key was
/// rejected; 429 and everything else are ordinary call failures.
pub async fn check_response(
    capability: &str,
    operation: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ToolError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ToolError::NotConfigured {
            capability: capability.to_string(),
            hint: format!("the service rejected the API key (HTTP {})", status.as_u16()),
        });
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(parse_retry_after)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ToolError::CallFailed {
            capability: capability.to_string(),
            operation: operation.to_string(),
            message: format!("rate limited, retry after {retry_after}s"),
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ToolError::CallFailed {
        capability: capability.to_string(),
        operation: operation.to_string(),
        message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, ERROR_BODY_CHARS)),
    })
}

/// `Retry-After` as seconds, falling back to 60.
pub fn parse_retry_after(value: &str) -> u64 {
    value.trim().parse().unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Transport errors (connect, timeout, body) are always call failures.
pub fn transport_error(capability: &str, operation: &str, err: reqwest::Error) -> ToolError {
    ToolError::CallFailed {
        capability: capability.to_string(),
        operation: operation.to_string(),
        message: err.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

/// Whether `key` looks like a usable API key: long enough and made of
/// `[A-Za-z0-9_-]` only.
pub fn is_valid_key(key: &str, min_len: usize) -> bool {
    key.len() >= min_len
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Read an API key from `env_var`, returning a configuration hint when it is
/// missing or malformed.
pub fn resolve_key(env_var: &str, min_len: usize, signup_url: &str) -> Result<String, String> {
    let raw = std::env::var(env_var).unwrap_or_default();
    let key = raw.trim();
    if key.is_empty() {
        return Err(format!(
            "set the {env_var} environment variable (get a key at {signup_url})"
        ));
    }
    if !is_valid_key(key, min_len) {
        return Err(format!(
            "{env_var} looks malformed: expected at least {min_len} characters of [A-Za-z0-9_-]"
        ));
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("120"), 120);
        assert_eq!(parse_retry_after(" 30 "), 30);
        assert_eq!(parse_retry_after("not-a-number"), 60);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("  short  ", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("BSA_abcdefghijklmnopq", 20));
        assert!(!is_valid_key("BSA_short", 20));
        assert!(!is_valid_key("BSA abcdefghijklmnopqrst", 20));
        assert!(!is_valid_key("BSA.abcdefghijklmnopqrst", 20));
    }

    #[test]
    fn test_resolve_key_missing() {
        let missing = resolve_key("SCOUT_TEST_KEY_THAT_IS_NEVER_SET", 20, "https://example.org/keys")
            .unwrap_err();
        assert!(missing.contains("SCOUT_TEST_KEY_THAT_IS_NEVER_SET"));
        assert!(missing.contains("https://example.org/keys"));
    }
}
