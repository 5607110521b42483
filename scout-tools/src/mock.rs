//! Deterministic synthetic responses for mock mode.
//!
//! The same capability, operation and params always produce the same payload
//! (publication dates are offsets from the call's date). Research-tools
//! operations run the local implementations, which need no network anyway.

use crate::research_tools::ResearchTools;
use chrono::{DateTime, Duration, Utc};
use scout_core::client::{capabilities, operations};
use scout_core::error::ToolError;
use scout_core::payload::{FetchPayload, SearchHit, SearchPayload};
use serde_json::Value;

const MOCK_DOMAINS: &[&str] = &[
    "github.com",
    "stackoverflow.com",
    "learn.microsoft.com",
    "medium.com",
    "arxiv.org",
];
const DEFAULT_MOCK_HITS: usize = 3;
const MAX_MOCK_HITS: usize = 10;

/// Lower-case, `-`-joined form of `text` for use in a URL path.
pub fn slug(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Synthetic search hits for `query`, one per mock domain in turn.
pub fn search_hits(provider: &str, query: &str, count: usize, now: DateTime<Utc>) -> Vec<SearchHit> {
    let slug = slug(query);
    (0..count)
        .map(|i| {
            let domain = MOCK_DOMAINS[i % MOCK_DOMAINS.len()];
            let suffix = if i == 0 { String::new() } else { format!(" ({})", i + 1) };
            SearchHit {
                title: format!("{query} - in-depth guide{suffix}"),
                url: format!("https://{domain}/{slug}-{provider}-{}", i + 1),
                snippet: format!(
                    "A practical look at {query}: implementation approaches, best practices and common pitfalls."
                ),
                published_at: Some(
                    (now - Duration::days(30 * (i as i64 + 1)))
                        .format("%Y-%m-%d")
                        .to_string(),
                ),
            }
        })
        .collect()
}

/// A small HTML page about `url`.
pub fn page(url: &str) -> String {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or("page");
    format!(
        "<html><head><title>{name}</title><meta name=\"author\" content=\"Scout Mock\"></head>\
         <body><h1>{name}</h1><p>Synthetic content served for {url}.</p>\
         <p>It stands in for the real page when running without network access.</p></body></html>"
    )
}

/// Produce the mock payload for one call.
pub fn respond(
    capability: &str,
    operation: &str,
    params: &Value,
    tools: &ResearchTools,
    now: DateTime<Utc>,
) -> Result<Value, ToolError> {
    let to_value = |v: Result<Value, serde_json::Error>| {
        v.map_err(|e| ToolError::MalformedPayload {
            capability: capability.to_string(),
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    };
    match (capability, operation) {
        (capabilities::BRAVE_SEARCH | capabilities::SERPAPI, operations::WEB_SEARCH) => {
            let query = params
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let count = params
                .get("count")
                .and_then(Value::as_u64)
                .map_or(DEFAULT_MOCK_HITS, |c| c as usize)
                .min(MAX_MOCK_HITS);
            to_value(serde_json::to_value(SearchPayload {
                results: search_hits(capability, query, count, now),
            }))
        }
        (capabilities::WEB_FETCH, operations::FETCH) => {
            let url = params
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default();
            to_value(serde_json::to_value(FetchPayload {
                url: url.to_string(),
                status: 200,
                content_type: Some("text/html; charset=utf-8".into()),
                html: page(url),
            }))
        }
        (capabilities::RESEARCH_TOOLS, _) => tools.run(operation, params, now),
        _ => Err(ToolError::UnknownOperation {
            capability: capability.to_string(),
            operation: operation.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Cloud Native  Architecture!"), "cloud-native-architecture");
        assert_eq!(slug("云原生 架构"), "云原生-架构");
    }

    #[test]
    fn test_search_is_deterministic() {
        let a = search_hits("brave-search", "rust async", 3, now());
        let b = search_hits("brave-search", "rust async", 3, now());
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].title, "rust async - in-depth guide");
        assert_eq!(a[1].url, "https://stackoverflow.com/rust-async-brave-search-2");
        assert_eq!(a[0].published_at.as_deref(), Some("2026-01-30"));
    }

    #[test]
    fn test_providers_give_distinct_urls() {
        let brave = search_hits("brave-search", "rust", 2, now());
        let serp = search_hits("serpapi", "rust", 2, now());
        assert!(brave.iter().all(|b| serp.iter().all(|s| s.url != b.url)));
    }

    #[test]
    fn test_respond_search_count() {
        let tools = ResearchTools::default();
        let out = respond("serpapi", "web_search", &json!({"query": "q", "count": 50}), &tools, now()).unwrap();
        assert_eq!(out["results"].as_array().unwrap().len(), MAX_MOCK_HITS);
        let out = respond("serpapi", "web_search", &json!({"query": "q"}), &tools, now()).unwrap();
        assert_eq!(out["results"].as_array().unwrap().len(), DEFAULT_MOCK_HITS);
    }

    #[test]
    fn test_respond_fetch_and_extract() {
        let tools = ResearchTools::default();
        let fetched = respond("web-fetch", "fetch", &json!({"url": "https://a.io/guide"}), &tools, now()).unwrap();
        assert_eq!(fetched["status"], 200);
        let html = fetched["html"].as_str().unwrap();
        assert!(html.contains("https://a.io/guide"));

        let extracted = respond(
            "research-tools",
            "extract_readable",
            &json!({"html": html, "url": "https://a.io/guide"}),
            &tools,
            now(),
        )
        .unwrap();
        assert_eq!(extracted["title"], "guide");
        assert_eq!(extracted["byline"], "Scout Mock");
    }

    #[test]
    fn test_respond_unknown() {
        let tools = ResearchTools::default();
        assert!(matches!(
            respond("web-fetch", "post", &json!({}), &tools, now()),
            Err(ToolError::UnknownOperation { .. })
        ));
    }
}
