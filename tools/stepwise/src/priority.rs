use serde::{Deserialize, Serialize};

use crate::config::SuggestionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Priority of an automation suggestion for a pattern seen `occurrences` times.
/// `None` when the pattern has not repeated often enough to suggest anything.
pub fn classify_pattern_priority(occurrences: u32, cfg: &SuggestionConfig) -> Option<Priority> {
    if occurrences >= cfg.high_priority_occurrences {
        return Some(Priority::High);
    }
    if occurrences >= cfg.min_occurrences {
        return Some(Priority::Medium);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{classify_pattern_priority, Priority};
    use crate::config::SuggestionConfig;

    #[test]
    fn pattern_priority_follows_occurrence_thresholds() {
        let cfg = SuggestionConfig::default();
        assert_eq!(classify_pattern_priority(1, &cfg), None);
        assert_eq!(classify_pattern_priority(2, &cfg), Some(Priority::Medium));
        assert_eq!(classify_pattern_priority(3, &cfg), Some(Priority::High));
        assert_eq!(classify_pattern_priority(9, &cfg), Some(Priority::High));
    }

    #[test]
    fn serialized_form_matches_as_str() {
        for value in [Priority::High, Priority::Medium, Priority::Low] {
            let rendered = serde_json::to_value(value).expect("serialize");
            assert_eq!(rendered, serde_json::json!(value.as_str()));
        }
    }
}
