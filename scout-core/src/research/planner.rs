//! Topic decomposition into subtopics and search queries.

use crate::error::{Result, ValidationError};
use crate::pipeline::{Artifact, PipelineState, Stage};
use crate::types::{Plan, ResearchOptions, SearchQuery, StageKind, Timeline, TimelinePhase};
use async_trait::async_trait;
use chrono::{Datelike, Utc};

/// Checkpoint names recorded on every plan, in pipeline order.
pub const CHECKPOINTS: &[&str] = &["search_complete", "enrichment_complete", "report_drafted"];

/// Breaks a topic into subtopics and language-tagged queries.
#[derive(Debug, Clone)]
pub struct Planner {
    reference_year: i32,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    /// Planner whose year-sensitive queries use the current year.
    pub fn new() -> Self {
        Self {
            reference_year: Utc::now().year(),
        }
    }

    /// Planner pinned to a fixed year, for reproducible plans.
    pub fn with_year(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn plan(&self, topic: &str, options: &ResearchOptions) -> std::result::Result<Plan, ValidationError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ValidationError::EmptyTopic);
        }

        let primary = options.langs.first().map(String::as_str).unwrap_or("en");
        let plan = Plan {
            topic: topic.to_string(),
            subtopics: subtopics(topic, primary),
            queries: self.queries(topic, options),
            checkpoints: CHECKPOINTS.iter().map(|c| c.to_string()).collect(),
            timeline: timeline(options.depth),
        };

        tracing::debug!(
            topic = %plan.topic,
            subtopics = plan.subtopics.len(),
            queries = plan.queries.len(),
            "Plan created"
        );
        Ok(plan)
    }

    fn queries(&self, topic: &str, options: &ResearchOptions) -> Vec<SearchQuery> {
        let year = self.reference_year;
        let mut queries = Vec::new();
        for lang in &options.langs {
            let mut texts = match lang.as_str() {
                "zh" => vec![
                    format!("{topic} 现状 发展"),
                    format!("{topic} 技术趋势 {year}"),
                    format!("{topic} 应用 案例"),
                ],
                _ => vec![
                    format!("{topic} current state development"),
                    format!("{topic} technology trends {year}"),
                    format!("{topic} applications use cases"),
                ],
            };
            if options.depth >= 3 {
                texts.push(match lang.as_str() {
                    "zh" => format!("{topic} 挑战 局限"),
                    _ => format!("{topic} challenges limitations"),
                });
            }
            queries.extend(texts.into_iter().map(|text| SearchQuery {
                text,
                lang: lang.clone(),
            }));
        }
        queries
    }
}

fn subtopics(topic: &str, lang: &str) -> Vec<String> {
    match lang {
        "zh" => vec![
            format!("{topic}的现状分析"),
            format!("{topic}的发展趋势"),
            format!("{topic}的关键技术"),
            format!("{topic}的应用场景"),
            format!("{topic}的挑战与机遇"),
        ],
        _ => vec![
            format!("Current state of {topic}"),
            format!("Development trends in {topic}"),
            format!("Key technologies behind {topic}"),
            format!("Applications and use cases of {topic}"),
            format!("Challenges and opportunities for {topic}"),
        ],
    }
}

fn timeline(depth: u8) -> Timeline {
    let phases = vec![
        TimelinePhase {
            name: "planning".into(),
            minutes: 5,
        },
        TimelinePhase {
            name: "search".into(),
            minutes: u32::from(depth) * 10,
        },
        TimelinePhase {
            name: "enrichment".into(),
            minutes: 15,
        },
        TimelinePhase {
            name: "analysis".into(),
            minutes: 10,
        },
        TimelinePhase {
            name: "writing".into(),
            minutes: 10,
        },
    ];
    Timeline {
        estimated_minutes: phases.iter().map(|p| p.minutes).sum(),
        phases,
    }
}

#[async_trait]
impl Stage for Planner {
    fn kind(&self) -> StageKind {
        StageKind::Plan
    }

    async fn run(&self, state: &PipelineState) -> Result<Artifact> {
        Ok(Artifact::Plan(self.plan(&state.topic, &state.options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn options(langs: &[&str], depth: u8) -> ResearchOptions {
        ResearchOptions {
            langs: langs.iter().map(|l| l.to_string()).collect(),
            depth,
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_queries_per_language() {
        let plan = Planner::with_year(2025)
            .plan("edge computing", &options(&["zh", "en"], 2))
            .unwrap();
        assert_eq!(plan.queries.len(), 6);
        assert_eq!(
            plan.queries[1],
            SearchQuery {
                text: "edge computing 技术趋势 2025".into(),
                lang: "zh".into(),
            }
        );
        assert_eq!(plan.queries[4].text, "edge computing technology trends 2025");
        assert!(plan.queries[3..].iter().all(|q| q.lang == "en"));
    }

    #[test]
    fn test_deeper_plans_add_queries() {
        let plan = Planner::with_year(2025)
            .plan("quantum networking", &options(&["en"], 3))
            .unwrap();
        assert_eq!(plan.queries.len(), 4);
        assert_eq!(plan.queries[3].text, "quantum networking challenges limitations");
    }

    #[test]
    fn test_subtopics_follow_primary_language() {
        let en = Planner::new().plan("wasm", &options(&["en", "zh"], 1)).unwrap();
        assert_eq!(en.subtopics.len(), 5);
        assert_eq!(en.subtopics[0], "Current state of wasm");

        let zh = Planner::new().plan("大模型", &options(&["zh"], 1)).unwrap();
        assert_eq!(zh.subtopics[0], "大模型的现状分析");
    }

    #[test]
    fn test_plan_trims_and_rejects_empty_topic() {
        let plan = Planner::new().plan("  rust  ", &options(&["en"], 1)).unwrap();
        assert_eq!(plan.topic, "rust");
        assert_eq!(
            Planner::new().plan("", &options(&["en"], 1)),
            Err(ValidationError::EmptyTopic)
        );
    }

    #[test]
    fn test_timeline_scales_with_depth() {
        let shallow = timeline(1);
        let deep = timeline(5);
        assert_eq!(shallow.estimated_minutes, 50);
        assert_eq!(deep.estimated_minutes, 90);
        assert_eq!(deep.phases.len(), 5);
    }

    #[test]
    fn test_checkpoints_in_order() {
        let plan = Planner::new().plan("x y", &options(&["en"], 1)).unwrap();
        assert_eq!(
            plan.checkpoints,
            vec!["search_complete", "enrichment_complete", "report_drafted"]
        );
    }

    #[tokio::test]
    async fn test_stage_produces_plan_artifact() {
        let state = PipelineState::new("serverless", options(&["en"], 2));
        let artifact = Planner::new().run(&state).await.unwrap();
        assert!(matches!(artifact, Artifact::Plan(ref p) if p.topic == "serverless"));
    }
}
