//! Relevance scoring for search candidates.
//!
//! A candidate's score is the weighted coverage and frequency of query terms in
//! its title, snippet and url. Everything here is pure and deterministic.

use crate::types::SourceCandidate;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

pub const TITLE_WEIGHT: f64 = 0.5;
pub const SNIPPET_WEIGHT: f64 = 0.3;
pub const URL_WEIGHT: f64 = 0.2;

const COVERAGE_WEIGHT: f64 = 0.8;
const FREQUENCY_WEIGHT: f64 = 0.2;
const FREQUENCY_CAP: f64 = 3.0;

pub const MAX_QUERY_TERMS: usize = 15;
const MIN_TERM_CHARS: usize = 2;

pub const LOW_RELEVANCE_THRESHOLD: f64 = 0.2;
pub const LOW_AVERAGE_THRESHOLD: f64 = 0.3;
pub const DUPLICATE_RATIO_THRESHOLD: f64 = 0.2;
pub const MIN_TITLE_CHARS: usize = 5;
/// A later result may exceed the one before it by at most this fraction.
pub const RANKING_TOLERANCE: f64 = 0.1;

const STOP_WORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "与", "the",
    "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

const PLACEHOLDER_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// Anything with the three scored fields.
pub trait Scorable {
    fn title(&self) -> &str;
    fn snippet(&self) -> &str;
    fn url(&self) -> &str;
}

impl Scorable for SourceCandidate {
    fn title(&self) -> &str {
        &self.title
    }
    fn snippet(&self) -> &str {
        &self.snippet
    }
    fn url(&self) -> &str {
        &self.url
    }
}

impl Scorable for crate::payload::SearchHit {
    fn title(&self) -> &str {
        &self.title
    }
    fn snippet(&self) -> &str {
        &self.snippet
    }
    fn url(&self) -> &str {
        &self.url
    }
}

fn is_term_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Split a query into lower-cased key terms, dropping stop words and
/// single-character tokens.
pub fn extract_key_terms(query: &str) -> Vec<String> {
    let normalized: String = query
        .to_lowercase()
        .chars()
        .map(|c| {
            if is_term_char(c) || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS && !STOP_WORDS.contains(t))
        .take(MAX_QUERY_TERMS)
        .map(String::from)
        .collect()
}

/// Coverage and frequency of `terms` in one field.
pub fn field_score(text: &str, terms: &[String]) -> f64 {
    if text.is_empty() || terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let mut matched = 0usize;
    let mut occurrences = 0usize;
    for term in terms {
        let count = lower.matches(term.as_str()).count();
        if count > 0 {
            matched += 1;
            occurrences += count;
        }
    }
    let total = terms.len() as f64;
    let coverage = matched as f64 / total;
    let frequency = (occurrences as f64 / total).min(FREQUENCY_CAP) / FREQUENCY_CAP;
    COVERAGE_WEIGHT * coverage + FREQUENCY_WEIGHT * frequency
}

/// Score a candidate against the query that found it. Always in `[0, 1]`.
pub fn score<S: Scorable + ?Sized>(candidate: &S, query: &str) -> f64 {
    if query.trim().is_empty() {
        return 0.0;
    }
    let (title, snippet, url) = (candidate.title(), candidate.snippet(), candidate.url());
    if title.is_empty() && snippet.is_empty() && url.is_empty() {
        return 0.0;
    }
    let terms = extract_key_terms(query);
    if terms.is_empty() {
        return 0.0;
    }
    let total = field_score(title, &terms) * TITLE_WEIGHT
        + field_score(snippet, &terms) * SNIPPET_WEIGHT
        + field_score(url, &terms) * URL_WEIGHT;
    total.clamp(0.0, 1.0)
}

/// A problem found by [`validate_quality`]. Indices are 0-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityIssue {
    NoResults,
    LowRelevance { index: usize, score: f64, title: String },
    MissingTitle { index: usize },
    PlaceholderDomain { index: usize, url: String },
    LowAverageRelevance { average: f64 },
    DuplicateTitles { ratio: f64 },
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::NoResults => write!(f, "no search results"),
            QualityIssue::LowRelevance {
                index,
                score,
                title,
            } => write!(
                f,
                "result {index} has low relevance ({:.1}%): {title}",
                score * 100.0
            ),
            QualityIssue::MissingTitle { index } => {
                write!(f, "result {index} has a missing or too-short title")
            }
            QualityIssue::PlaceholderDomain { index, url } => {
                write!(f, "result {index} uses a placeholder domain: {url}")
            }
            QualityIssue::LowAverageRelevance { average } => {
                write!(f, "average relevance too low ({:.1}%)", average * 100.0)
            }
            QualityIssue::DuplicateTitles { ratio } => {
                write!(f, "duplicate titles ({:.1}% of results)", ratio * 100.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub is_valid: bool,
    pub avg_relevance: f64,
    pub issues: Vec<QualityIssue>,
}

fn is_placeholder_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    PLACEHOLDER_DOMAINS.contains(&host)
}

/// Check a result set for signs that the search went wrong.
pub fn validate_quality<S: Scorable>(results: &[S], query: &str) -> QualityReport {
    if results.is_empty() {
        return QualityReport {
            is_valid: false,
            avg_relevance: 0.0,
            issues: vec![QualityIssue::NoResults],
        };
    }

    let mut issues = Vec::new();
    let mut total = 0.0;

    for (index, result) in results.iter().enumerate() {
        let relevance = score(result, query);
        total += relevance;

        if relevance < LOW_RELEVANCE_THRESHOLD {
            issues.push(QualityIssue::LowRelevance {
                index,
                score: relevance,
                title: result.title().to_string(),
            });
        }
        if result.title().trim().chars().count() < MIN_TITLE_CHARS {
            issues.push(QualityIssue::MissingTitle { index });
        }
        if is_placeholder_url(result.url()) {
            issues.push(QualityIssue::PlaceholderDomain {
                index,
                url: result.url().to_string(),
            });
        }
    }

    let avg_relevance = total / results.len() as f64;
    if avg_relevance < LOW_AVERAGE_THRESHOLD {
        issues.push(QualityIssue::LowAverageRelevance {
            average: avg_relevance,
        });
    }

    let unique: HashSet<&str> = results.iter().map(|r| r.title()).collect();
    let duplicates = results.len() - unique.len();
    let ratio = duplicates as f64 / results.len() as f64;
    if duplicates > 0 && ratio >= DUPLICATE_RATIO_THRESHOLD {
        issues.push(QualityIssue::DuplicateTitles { ratio });
    }

    QualityReport {
        is_valid: issues.is_empty(),
        avg_relevance,
        issues,
    }
}

/// A later result that outranks the one before it by more than the tolerance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingIssue {
    pub index: usize,
    pub score: f64,
    pub previous_index: usize,
    pub previous_score: f64,
}

impl fmt::Display for RankingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "result {} ({:.1}%) scores higher than result {} ({:.1}%)",
            self.index,
            self.score * 100.0,
            self.previous_index,
            self.previous_score * 100.0
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingReport {
    pub is_valid: bool,
    pub issues: Vec<RankingIssue>,
}

/// Check that scores are non-increasing, allowing a small tolerance.
pub fn validate_ranking<S: Scorable>(results: &[S], query: &str) -> RankingReport {
    let scores: Vec<f64> = results.iter().map(|r| score(r, query)).collect();
    let issues: Vec<RankingIssue> = scores
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] > pair[0] * (1.0 + RANKING_TOLERANCE))
        .map(|(i, pair)| RankingIssue {
            index: i + 1,
            score: pair[1],
            previous_index: i,
            previous_score: pair[0],
        })
        .collect();

    RankingReport {
        is_valid: issues.is_empty(),
        issues,
    }
}
