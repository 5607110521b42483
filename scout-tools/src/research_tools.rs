//! Local research tools: readable-text extraction, normalisation and a
//! heuristic quality score.
//!
//! None of these touch the network, so the capability is always configured.

use crate::registry::Capability;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use scout_core::client::{capabilities, operations};
use scout_core::config::EnrichmentConfig;
use scout_core::error::ToolError;
use scout_core::payload::{ExtractPayload, NormalizedItem, QualityPayload, parse_timestamp};
use scout_core::research::enrichment::{is_authoritative, is_promotional};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

const EXCERPT_CHARS: usize = 200;
const ID_TITLE_CHARS: usize = 32;
const MAX_KEYWORDS: usize = 10;

const QUALITY_BASE: f64 = 0.4;
const AUTHORITY_BONUS: f64 = 0.2;
const MARKETING_PENALTY: f64 = 0.2;
const LENGTH_BONUS_MAX: f64 = 0.2;
const LENGTH_FOR_FULL_BONUS: f64 = 8000.0;
const DAYS_PER_MONTH: f64 = 30.0;

static TITLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok());
static AUTHOR_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s+[^>]*name\s*=\s*["']author["'][^>]*content\s*=\s*["']([^"']*)["']"#)
        .ok()
});

/// Strip markup from HTML, dropping script and style bodies and keeping
/// block boundaries as newlines.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut skipping: Option<&'static str> = None;
    let mut tag = String::new();

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name: String = tag
                    .trim_start()
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '/')
                    .collect::<String>()
                    .to_lowercase();
                match (skipping, name.as_str()) {
                    (None, "script") => skipping = Some("/script"),
                    (None, "style") => skipping = Some("/style"),
                    (None, "title") => skipping = Some("/title"),
                    (Some(end), n) if n == end => skipping = None,
                    _ => {}
                }
                let block = name.trim_start_matches('/');
                if matches!(
                    block,
                    "p" | "br" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                        | "section" | "article" | "header" | "footer"
                ) {
                    text.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ if skipping.is_some() => {}
            _ => text.push(ch),
        }
    }

    let text = decode_entities(&text);
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Readable title, byline and text of an HTML page.
pub fn extract_readable(html: &str, url: Option<&str>) -> ExtractPayload {
    let title = TITLE_RE
        .as_ref()
        .and_then(|re| re.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()).split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let byline = AUTHOR_RE
        .as_ref()
        .and_then(|re| re.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty());
    let content_text = html_to_text(html);
    let excerpt: String = content_text.chars().take(EXCERPT_CHARS).collect();

    ExtractPayload {
        title,
        byline,
        excerpt,
        length: content_text.chars().count(),
        content_text,
        url: url.unwrap_or_default().to_string(),
    }
}

/// `zh` when the text carries any CJK ideograph, `en` otherwise.
pub fn detect_lang(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{4e00}'..='\u{9fa5}').contains(&c)) {
        "zh"
    } else {
        "en"
    }
}

/// Words longer than two characters that occur more than once, most frequent
/// first, ties alphabetical.
pub fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.chars().count() > 2)
    {
        *counts.entry(word.to_string()).or_default() += 1;
    }
    let mut words: Vec<(String, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.into_iter().take(limit).map(|(w, _)| w).collect()
}

fn str_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Fill in host, language, id, timestamps and keywords for a raw item.
pub fn normalize(item: &Value, now: DateTime<Utc>) -> NormalizedItem {
    let url = str_field(item, &["url"]).unwrap_or_default().to_string();
    let host = url::Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
        .unwrap_or_default();
    let title = str_field(item, &["title"]).unwrap_or_default().to_string();
    let content_text = str_field(item, &["content_text", "text"])
        .unwrap_or_default()
        .to_string();
    let lang = str_field(item, &["lang"])
        .map(String::from)
        .unwrap_or_else(|| detect_lang(&content_text).to_string());
    let id = str_field(item, &["id"]).map(String::from).unwrap_or_else(|| {
        let short: String = title.chars().take(ID_TITLE_CHARS).collect();
        format!("{url}#{short}")
    });
    let keywords = match item.get("keywords").and_then(Value::as_array) {
        Some(given) if !given.is_empty() => given
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => top_keywords(&content_text, MAX_KEYWORDS),
    };

    NormalizedItem {
        id,
        url,
        host,
        title,
        author: str_field(item, &["byline", "author"]).map(String::from),
        lang,
        published_at: str_field(item, &["published_at"]).map(String::from),
        extracted_at: str_field(item, &["extracted_at"])
            .map(String::from)
            .unwrap_or_else(|| now.to_rfc3339()),
        content_text,
        keywords,
    }
}

/// Heuristic scoring for normalised items.
pub struct ResearchTools {
    authority_domains: Vec<String>,
    marketing_terms: Vec<String>,
}

impl ResearchTools {
    pub fn new(authority_domains: Vec<String>, marketing_terms: Vec<String>) -> Self {
        Self {
            authority_domains,
            marketing_terms,
        }
    }

    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self::new(
            config.authority_domains.clone(),
            config.marketing_terms.clone(),
        )
    }

    /// Base 0.4; +0.2 authoritative host; -0.2 promotional text; up to +0.2
    /// for length; -0.1 past 18 months and -0.2 past 36. Clamped to `[0, 1]`.
    pub fn quality_score(&self, item: &NormalizedItem, now: DateTime<Utc>) -> QualityPayload {
        let mut score = QUALITY_BASE;
        let mut labels = Vec::new();

        let host = if item.host.is_empty() {
            url::Url::parse(&item.url)
                .ok()
                .and_then(|u| u.host_str().map(String::from))
                .unwrap_or_default()
        } else {
            item.host.clone()
        };
        if !host.is_empty() && is_authoritative(&host, &self.authority_domains) {
            score += AUTHORITY_BONUS;
            labels.push("authoritative".to_string());
        }

        if is_promotional(&item.content_text, &self.marketing_terms) {
            score -= MARKETING_PENALTY;
            labels.push("marketing".to_string());
        }

        let length = item.content_text.chars().count() as f64;
        score += (length / LENGTH_FOR_FULL_BONUS * LENGTH_BONUS_MAX).min(LENGTH_BONUS_MAX);

        let dated = item
            .published_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| parse_timestamp(&item.extracted_at));
        if let Some(dated) = dated {
            let months = (now - dated).num_days() as f64 / DAYS_PER_MONTH;
            if months > 36.0 {
                score -= 0.2;
                labels.push("stale>36m".to_string());
            } else if months > 18.0 {
                score -= 0.1;
                labels.push("stale>18m".to_string());
            }
        }

        QualityPayload {
            score: score.clamp(0.0, 1.0),
            labels,
        }
    }

    /// Dispatch one research-tools operation. Pure apart from reading the clock.
    pub fn run(&self, operation: &str, params: &Value, now: DateTime<Utc>) -> Result<Value, ToolError> {
        const CAP: &str = capabilities::RESEARCH_TOOLS;
        let invalid = |reason: &str| ToolError::InvalidArguments {
            capability: CAP.to_string(),
            operation: operation.to_string(),
            reason: reason.to_string(),
        };
        let out = match operation {
            operations::EXTRACT_READABLE => {
                let html = params
                    .get("html")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("missing required parameter: html"))?;
                let url = params.get("url").and_then(Value::as_str);
                serde_json::to_value(extract_readable(html, url))
            }
            operations::NORMALIZE => {
                let item = params
                    .get("item")
                    .filter(|v| v.is_object())
                    .ok_or_else(|| invalid("missing required object parameter: item"))?;
                serde_json::to_value(normalize(item, now))
            }
            operations::QUALITY_SCORE => {
                let item = params
                    .get("item")
                    .filter(|v| v.is_object())
                    .ok_or_else(|| invalid("missing required object parameter: item"))?;
                let normalized = normalize(item, now);
                serde_json::to_value(self.quality_score(&normalized, now))
            }
            other => {
                return Err(ToolError::UnknownOperation {
                    capability: CAP.to_string(),
                    operation: other.to_string(),
                });
            }
        };
        out.map_err(|e| ToolError::MalformedPayload {
            capability: CAP.to_string(),
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for ResearchTools {
    fn default() -> Self {
        Self::from_config(&EnrichmentConfig::default())
    }
}

#[async_trait]
impl Capability for ResearchTools {
    fn name(&self) -> &str {
        capabilities::RESEARCH_TOOLS
    }

    fn operations(&self) -> &[&'static str] {
        &[
            operations::EXTRACT_READABLE,
            operations::NORMALIZE,
            operations::QUALITY_SCORE,
        ]
    }

    async fn invoke(&self, operation: &str, params: Value) -> Result<Value, ToolError> {
        self.run(operation, &params, Utc::now())
    }
}
