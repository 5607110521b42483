//! Search provider capabilities: Brave Search and SerpApi.
//!
//! Both answer `web_search` with a [`SearchPayload`]. API keys are resolved
//! from the configured environment variables when the capability is built; a
//! missing or malformed key makes every call fail with a configuration hint
//! instead of falling back to anything synthetic.

use crate::http::{build_client, check_response, resolve_key, transport_error};
use crate::registry::Capability;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use scout_core::client::{capabilities, operations};
use scout_core::config::ToolsConfig;
use scout_core::error::ToolError;
use scout_core::payload::{SearchHit, SearchPayload};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const BRAVE_SIGNUP: &str = "https://brave.com/search/api/";
const BRAVE_MIN_KEY_LEN: usize = 20;
const BRAVE_MAX_COUNT: u64 = 20;

const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
const SERPAPI_SIGNUP: &str = "https://serpapi.com/";
const SERPAPI_MIN_KEY_LEN: usize = 30;
const SERPAPI_MAX_COUNT: u64 = 100;

const DEFAULT_COUNT: u64 = 10;

/// Parameters every search provider accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub count: u64,
    pub lang: Option<String>,
    pub since: Option<NaiveDate>,
}

impl SearchRequest {
    pub fn from_params(capability: &str, params: &Value) -> Result<Self, ToolError> {
        let invalid = |reason: &str| ToolError::InvalidArguments {
            capability: capability.to_string(),
            operation: operations::WEB_SEARCH.to_string(),
            reason: reason.to_string(),
        };
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| invalid("missing required parameter: query"))?;
        let count = params
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_COUNT)
            .max(1);
        let lang = params
            .get("lang")
            .and_then(Value::as_str)
            .map(String::from);
        let since = match params.get("since").and_then(Value::as_str) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| invalid("since must be YYYY-MM-DD"))?,
            ),
            None => None,
        };
        Ok(Self {
            query: query.to_string(),
            count,
            lang,
            since,
        })
    }
}

fn unsupported(capability: &str, operation: &str) -> ToolError {
    ToolError::UnknownOperation {
        capability: capability.to_string(),
        operation: operation.to_string(),
    }
}

fn malformed(capability: &str, err: reqwest::Error) -> ToolError {
    ToolError::MalformedPayload {
        capability: capability.to_string(),
        operation: operations::WEB_SEARCH.to_string(),
        reason: err.to_string(),
    }
}

fn to_value(capability: &str, payload: SearchPayload) -> Result<Value, ToolError> {
    serde_json::to_value(payload).map_err(|e| ToolError::MalformedPayload {
        capability: capability.to_string(),
        operation: operations::WEB_SEARCH.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Brave
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct BraveResponse {
    #[serde(default)]
    pub web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BraveWeb {
    #[serde(default)]
    pub results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
pub struct BraveResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub page_age: Option<String>,
}

impl BraveResponse {
    pub fn into_hits(self) -> Vec<SearchHit> {
        self.web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.description,
                published_at: r.page_age,
            })
            .collect()
    }
}

/// Brave Search web search.
pub struct BraveSearch {
    http: reqwest::Client,
    api_key: Result<String, String>,
}

impl BraveSearch {
    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        Ok(Self {
            http: build_client(
                capabilities::BRAVE_SEARCH,
                &config.user_agent,
                config.call_timeout(),
                config.max_redirects,
            )?,
            api_key: resolve_key(&config.brave_api_key_env, BRAVE_MIN_KEY_LEN, BRAVE_SIGNUP),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_ok()
    }

    fn request_url(request: &SearchRequest) -> String {
        let mut url = format!(
            "{BRAVE_ENDPOINT}?q={}&count={}",
            urlencoding::encode(&request.query),
            request.count.min(BRAVE_MAX_COUNT)
        );
        if let Some(lang) = &request.lang {
            let lang = if lang == "zh" { "zh-hans" } else { lang.as_str() };
            url.push_str(&format!("&search_lang={}", urlencoding::encode(lang)));
        }
        if let Some(since) = request.since {
            let today = Utc::now().date_naive();
            url.push_str(&format!("&freshness={}to{}", since, today));
        }
        url
    }
}

#[async_trait]
impl Capability for BraveSearch {
    fn name(&self) -> &str {
        capabilities::BRAVE_SEARCH
    }

    fn operations(&self) -> &[&'static str] {
        &[operations::WEB_SEARCH]
    }

    async fn invoke(&self, operation: &str, params: Value) -> Result<Value, ToolError> {
        const CAP: &str = capabilities::BRAVE_SEARCH;
        if operation != operations::WEB_SEARCH {
            return Err(unsupported(CAP, operation));
        }
        let api_key = self.api_key.as_ref().map_err(|hint| ToolError::NotConfigured {
            capability: CAP.to_string(),
            hint: hint.clone(),
        })?;
        let request = SearchRequest::from_params(CAP, &params)?;
        debug!(query = %request.query, count = request.count, "Brave search");

        let resp = self
            .http
            .get(Self::request_url(&request))
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key.as_str())
            .send()
            .await
            .map_err(|e| transport_error(CAP, operation, e))?;
        let body: BraveResponse = check_response(CAP, operation, resp)
            .await?
            .json()
            .await
            .map_err(|e| malformed(CAP, e))?;

        to_value(
            CAP,
            SearchPayload {
                results: body.into_hits(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// SerpApi
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SerpApiResponse {
    #[serde(default)]
    pub organic_results: Vec<SerpApiResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SerpApiResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl SerpApiResponse {
    pub fn into_hits(self) -> Vec<SearchHit> {
        self.organic_results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
                published_at: r.date,
            })
            .collect()
    }
}

/// SerpApi (Google engine) web search.
pub struct SerpApiSearch {
    http: reqwest::Client,
    api_key: Result<String, String>,
}

impl SerpApiSearch {
    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        Ok(Self {
            http: build_client(
                capabilities::SERPAPI,
                &config.user_agent,
                config.call_timeout(),
                config.max_redirects,
            )?,
            api_key: resolve_key(&config.serpapi_api_key_env, SERPAPI_MIN_KEY_LEN, SERPAPI_SIGNUP),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_ok()
    }

    fn request_url(request: &SearchRequest, api_key: &str) -> String {
        let mut url = format!(
            "{SERPAPI_ENDPOINT}?engine=google&q={}&num={}&api_key={}",
            urlencoding::encode(&request.query),
            request.count.min(SERPAPI_MAX_COUNT),
            urlencoding::encode(api_key)
        );
        if let Some(lang) = &request.lang {
            let hl = if lang == "zh" { "zh-cn" } else { lang.as_str() };
            url.push_str(&format!("&hl={}", urlencoding::encode(hl)));
        }
        if let Some(since) = request.since {
            let tbs = format!("cdr:1,cd_min:{}", since.format("%m/%d/%Y"));
            url.push_str(&format!("&tbs={}", urlencoding::encode(&tbs)));
        }
        url
    }
}

#[async_trait]
impl Capability for SerpApiSearch {
    fn name(&self) -> &str {
        capabilities::SERPAPI
    }

    fn operations(&self) -> &[&'static str] {
        &[operations::WEB_SEARCH]
    }

    async fn invoke(&self, operation: &str, params: Value) -> Result<Value, ToolError> {
        const CAP: &str = capabilities::SERPAPI;
        if operation != operations::WEB_SEARCH {
            return Err(unsupported(CAP, operation));
        }
        let api_key = self.api_key.as_ref().map_err(|hint| ToolError::NotConfigured {
            capability: CAP.to_string(),
            hint: hint.clone(),
        })?;
        let request = SearchRequest::from_params(CAP, &params)?;
        debug!(query = %request.query, count = request.count, "SerpApi search");

        let resp = self
            .http
            .get(Self::request_url(&request, api_key))
            .send()
            .await
            .map_err(|e| transport_error(CAP, operation, e))?;
        let body: SerpApiResponse = check_response(CAP, operation, resp)
            .await?
            .json()
            .await
            .map_err(|e| malformed(CAP, e))?;

        // SerpApi reports "no results" as an error string with HTTP 200
        if let Some(error) = body.error.as_deref()
            && body.organic_results.is_empty()
            && !error.to_lowercase().contains("hasn't returned any results")
        {
            return Err(ToolError::CallFailed {
                capability: CAP.to_string(),
                operation: operation.to_string(),
                message: error.to_string(),
            });
        }

        to_value(
            CAP,
            SearchPayload {
                results: body.into_hits(),
            },
        )
    }
}
