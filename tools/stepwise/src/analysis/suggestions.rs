use crate::analysis::patterns::{Pattern, PatternDetector};
use crate::config::SuggestionConfig;
use crate::logging::append_run_log;
use crate::priority::{classify_pattern_priority, Priority};
use crate::runtime::lock_or_recover;
use crate::session::Recording;
use crate::types::Step;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    PatternAutomation,
    WorkflowOptimization,
    Performance,
}

impl SuggestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PatternAutomation => "pattern_automation",
            Self::WorkflowOptimization => "workflow_optimization",
            Self::Performance => "performance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub impact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
}

/// Input to suggestion generation: a step list and its total duration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowSample {
    pub steps: Vec<Step>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl From<&Recording> for WorkflowSample {
    fn from(recording: &Recording) -> Self {
        Self {
            steps: recording.steps.clone(),
            duration_ms: recording.duration_ms,
        }
    }
}

pub struct SuggestionGenerator {
    detector: Arc<PatternDetector>,
    cfg: SuggestionConfig,
    latest: Mutex<Vec<Suggestion>>,
}

impl SuggestionGenerator {
    pub fn new(detector: Arc<PatternDetector>, cfg: SuggestionConfig) -> Self {
        Self {
            detector,
            cfg,
            latest: Mutex::new(Vec::new()),
        }
    }

    /// Feeds `sample` through the detector and replaces the stored snapshot.
    pub fn generate(&self, sample: &WorkflowSample) -> Vec<Suggestion> {
        let patterns = self.detector.detect(sample.steps.as_slice());
        let mut suggestions = Vec::new();

        for pattern in patterns {
            let Some(priority) = classify_pattern_priority(pattern.occurrences, &self.cfg) else {
                continue;
            };
            suggestions.push(Suggestion {
                kind: SuggestionKind::PatternAutomation,
                priority,
                title: "Repeated Action Pattern Detected".to_string(),
                description: format!(
                    "The sequence \"{}\" appears {} times. Consider creating a macro.",
                    pattern.key, pattern.occurrences
                ),
                impact: format!(
                    "Potential time saving: {}ms per occurrence",
                    pattern.potential_time_saving_ms
                ),
                pattern: Some(pattern),
            });
        }

        if sample.steps.len() > self.cfg.complex_workflow_steps {
            suggestions.push(Suggestion {
                kind: SuggestionKind::WorkflowOptimization,
                priority: Priority::Medium,
                title: "Complex Workflow Detected".to_string(),
                description: "This workflow has many steps. Consider breaking it into smaller, reusable components.".to_string(),
                impact: "Improved maintainability and reusability".to_string(),
                pattern: None,
            });
        }

        if let Some(duration_ms) = sample.duration_ms {
            let average_ms = duration_ms as f64 / sample.steps.len().max(1) as f64;
            if average_ms > self.cfg.slow_step_ms {
                suggestions.push(Suggestion {
                    kind: SuggestionKind::Performance,
                    priority: Priority::High,
                    title: "Slow Action Execution".to_string(),
                    description: format!(
                        "Average step time is {average_ms}ms. Consider optimizing slow operations."
                    ),
                    impact: "Faster automation execution".to_string(),
                    pattern: None,
                });
            }
        }

        append_run_log(
            "info",
            "suggestions.generated",
            json!({
                "steps": sample.steps.len(),
                "suggestions": suggestions
                    .iter()
                    .map(|suggestion| suggestion.kind.as_str())
                    .collect::<Vec<_>>(),
            }),
        );
        *lock_or_recover(&self.latest) = suggestions.clone();
        suggestions
    }

    pub fn latest(&self) -> Vec<Suggestion> {
        lock_or_recover(&self.latest).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{SuggestionGenerator, SuggestionKind, WorkflowSample};
    use crate::analysis::patterns::PatternDetector;
    use crate::config::{PatternConfig, SuggestionConfig};
    use crate::priority::Priority;
    use crate::types::{Action, Step};
    use serde_json::json;
    use std::sync::Arc;

    fn sample(labels: &[&str], duration_ms: Option<u64>) -> WorkflowSample {
        WorkflowSample {
            steps: labels
                .iter()
                .enumerate()
                .map(|(index, label)| Step {
                    step_number: index as u32 + 1,
                    timestamp_ms: index as u64 * 10,
                    action: Action::custom(*label, json!({})),
                    metadata: Default::default(),
                })
                .collect(),
            duration_ms,
        }
    }

    fn generator() -> SuggestionGenerator {
        SuggestionGenerator::new(
            Arc::new(PatternDetector::new(PatternConfig::default())),
            SuggestionConfig::default(),
        )
    }

    #[test]
    fn repeated_patterns_become_automation_suggestions() {
        let generator = generator();
        let suggestions = generator.generate(&sample(
            &["click", "type", "click", "type", "click", "type"],
            Some(5_000),
        ));
        let automation = suggestions
            .iter()
            .find(|s| s.pattern.as_ref().is_some_and(|p| p.key == "click->type"))
            .expect("click->type suggestion");
        assert_eq!(automation.kind, SuggestionKind::PatternAutomation);
        assert_eq!(automation.priority, Priority::High);
        assert!(automation.description.contains("appears 3 times"));
        assert!(suggestions
            .iter()
            .all(|s| s.kind != SuggestionKind::Performance));
    }

    #[test]
    fn long_workflows_get_a_structure_suggestion() {
        let labels = (0..15).map(|i| format!("action{i}")).collect::<Vec<_>>();
        let labels = labels.iter().map(String::as_str).collect::<Vec<_>>();
        let suggestions = generator().generate(&sample(&labels, Some(10_000)));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::WorkflowOptimization);
        assert_eq!(suggestions[0].priority, Priority::Medium);
    }

    #[test]
    fn slow_average_step_time_is_flagged_high() {
        let generator = generator();
        let suggestions = generator.generate(&sample(&["test"], Some(10_000)));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::Performance);
        assert_eq!(suggestions[0].priority, Priority::High);
        assert!(suggestions[0].description.contains("10000ms"));
    }

    #[test]
    fn each_generation_replaces_the_snapshot() {
        let generator = generator();
        generator.generate(&sample(&["test"], Some(10_000)));
        assert_eq!(generator.latest().len(), 1);
        generator.generate(&sample(&["test"], None));
        assert!(generator.latest().is_empty());
    }

    #[test]
    fn suggestions_serialize_kind_as_type() {
        let suggestions = generator().generate(&sample(&["slow"], Some(9_000)));
        let value = serde_json::to_value(&suggestions[0]).expect("serialize");
        assert_eq!(value["type"], json!("performance"));
        assert_eq!(value["priority"], json!("high"));
        assert!(value.get("pattern").is_none());
    }
}
