use crate::config::PatternConfig;
use crate::logging::append_run_log;
use crate::runtime::lock_or_recover;
use crate::types::Action;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const KEY_SEPARATOR: &str = "->";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub key: String,
    pub sequence: Vec<String>,
    pub occurrences: u32,
    pub potential_time_saving_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_action: String,
    pub confidence: f64,
    pub matched_pattern_key: String,
}

pub fn pattern_key<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

#[derive(Debug, Clone)]
struct ObservedWindow {
    key: String,
    sequence: Vec<String>,
    observations: u32,
}

#[derive(Debug, Default)]
struct DetectorState {
    patterns: Vec<Pattern>,
    pattern_index: HashMap<String, usize>,
    observed: Vec<ObservedWindow>,
    observed_index: HashMap<String, usize>,
}

impl DetectorState {
    fn register(&mut self, labels: &[&str], cfg: &PatternConfig) {
        let key = pattern_key(labels);
        if let Some(&idx) = self.pattern_index.get(&key) {
            self.patterns[idx].occurrences += 1;
            return;
        }
        let manual_ms = cfg.per_action_cost_ms.saturating_mul(labels.len() as u64);
        self.pattern_index.insert(key.clone(), self.patterns.len());
        self.patterns.push(Pattern {
            key,
            sequence: labels.iter().map(|label| label.to_string()).collect(),
            occurrences: 1,
            potential_time_saving_ms: manual_ms.saturating_sub(cfg.automated_cost_ms),
        });
    }

    fn observe(&mut self, labels: &[&str]) {
        let key = pattern_key(labels);
        if let Some(&idx) = self.observed_index.get(&key) {
            self.observed[idx].observations += 1;
            return;
        }
        self.observed_index.insert(key.clone(), self.observed.len());
        self.observed.push(ObservedWindow {
            key,
            sequence: labels.iter().map(|label| label.to_string()).collect(),
            observations: 1,
        });
    }
}

/// Finds repeated contiguous label windows and keeps them in a registry that
/// compounds across calls. Also remembers every window it has seen so that
/// a single observed run can drive predictions.
pub struct PatternDetector {
    cfg: PatternConfig,
    state: Mutex<DetectorState>,
}

impl PatternDetector {
    pub fn new(cfg: PatternConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(DetectorState::default()),
        }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.cfg
    }

    /// Scans `actions` and returns the whole registry afterwards.
    ///
    /// A window of length `L` at `i` repeats when the same labels appear at some
    /// `j >= i + L`. Every distinct start position of a repeated window is one
    /// detection: the first creates the pattern, later ones bump its count.
    pub fn detect<A: AsRef<Action>>(&self, actions: &[A]) -> Vec<Pattern> {
        let labels = actions
            .iter()
            .map(|action| action.as_ref().label())
            .collect::<Vec<_>>();
        let len = labels.len();
        let max_len = self.cfg.max_length.min(len);

        let mut state = lock_or_recover(&self.state);
        let mut counted: HashSet<(usize, usize)> = HashSet::new();
        let mut detections = 0usize;

        for window in self.cfg.min_length..=max_len {
            for i in 0..=(len - window) {
                let candidate = &labels[i..i + window];
                state.observe(candidate);

                let Some(j) = (i + window..=(len - window))
                    .find(|&j| &labels[j..j + window] == candidate)
                else {
                    continue;
                };
                for start in [i, j] {
                    if counted.insert((window, start)) {
                        state.register(candidate, &self.cfg);
                        detections += 1;
                    }
                }
            }
        }

        let patterns = state.patterns.clone();
        drop(state);
        append_run_log(
            "info",
            "patterns.detected",
            json!({
                "actions": len,
                "detections": detections,
                "registry_size": patterns.len(),
            }),
        );
        patterns
    }

    /// Proposes the label that follows `current` in known sequences, best first.
    pub fn predict_next_action<S: AsRef<str>>(&self, current: &[S]) -> Vec<Prediction> {
        let current = current.iter().map(AsRef::as_ref).collect::<Vec<_>>();
        let prefix_start = current.len().saturating_sub(self.cfg.prediction_window);
        let prefix = &current[prefix_start..];
        let next_index = current.len();

        let state = lock_or_recover(&self.state);
        let mut predictions = Vec::new();
        for pattern in &state.patterns {
            if let Some(next) = next_after(&pattern.sequence, prefix, next_index) {
                predictions.push(Prediction {
                    predicted_action: next.to_string(),
                    confidence: f64::from(pattern.occurrences) / self.cfg.confidence_divisor,
                    matched_pattern_key: pattern.key.clone(),
                });
            }
        }
        for window in &state.observed {
            if state.pattern_index.contains_key(&window.key) {
                continue;
            }
            if let Some(next) = next_after(&window.sequence, prefix, next_index) {
                predictions.push(Prediction {
                    predicted_action: next.to_string(),
                    confidence: f64::from(window.observations) / self.cfg.confidence_divisor,
                    matched_pattern_key: window.key.clone(),
                });
            }
        }
        drop(state);

        // Stable: ties keep discovery order.
        predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        predictions
    }

    /// Repeated patterns only, in discovery order.
    pub fn patterns(&self) -> Vec<Pattern> {
        lock_or_recover(&self.state).patterns.clone()
    }

    pub fn reset(&self) {
        *lock_or_recover(&self.state) = DetectorState::default();
    }
}

fn next_after<'a>(sequence: &'a [String], prefix: &[&str], next_index: usize) -> Option<&'a str> {
    if sequence.len() < prefix.len() {
        return None;
    }
    let matches = sequence
        .iter()
        .zip(prefix.iter())
        .all(|(label, wanted)| label == wanted);
    if !matches {
        return None;
    }
    sequence.get(next_index).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::{pattern_key, PatternDetector};
    use crate::config::PatternConfig;
    use crate::types::Action;
    use serde_json::json;

    fn actions(labels: &[&str]) -> Vec<Action> {
        labels
            .iter()
            .map(|label| Action::custom(*label, json!({})))
            .collect()
    }

    fn occurrences(detector: &PatternDetector, key: &str) -> Option<u32> {
        detector
            .patterns()
            .into_iter()
            .find(|pattern| pattern.key == key)
            .map(|pattern| pattern.occurrences)
    }

    #[test]
    fn alternating_pair_counts_each_instance() {
        let detector = PatternDetector::new(PatternConfig::default());
        let patterns = detector.detect(&actions(&["click", "type", "click", "type"]));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].key, "click->type");
        assert_eq!(patterns[0].occurrences, 2);
        assert_eq!(patterns[0].potential_time_saving_ms, 1_900);
    }

    #[test]
    fn three_repetitions_count_three_times() {
        let detector = PatternDetector::new(PatternConfig::default());
        detector.detect(&actions(&["c", "t", "c", "t", "c", "t"]));
        assert_eq!(occurrences(&detector, "c->t"), Some(3));
        assert_eq!(occurrences(&detector, "t->c"), Some(2));
        assert_eq!(occurrences(&detector, "c->t->c"), None);
    }

    #[test]
    fn registry_compounds_across_calls() {
        let detector = PatternDetector::new(PatternConfig::default());
        let input = actions(&["a", "b", "a", "b"]);
        detector.detect(&input);
        let patterns = detector.detect(&input);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].occurrences, 4);
    }

    #[test]
    fn short_or_unique_inputs_find_nothing() {
        let detector = PatternDetector::new(PatternConfig::default());
        assert!(detector.detect::<Action>(&[]).is_empty());
        assert!(detector.detect(&actions(&["only"])).is_empty());
        assert!(detector.detect(&actions(&["a", "b", "c"])).is_empty());
    }

    #[test]
    fn prediction_learns_from_a_single_run() {
        let detector = PatternDetector::new(PatternConfig::default());
        detector.detect(&actions(&["click", "type", "submit"]));
        assert!(detector.patterns().is_empty());

        let predictions = detector.predict_next_action(&["click", "type"]);
        assert_eq!(predictions[0].predicted_action, "submit");
        assert_eq!(predictions[0].matched_pattern_key, "click->type->submit");
        assert!((predictions[0].confidence - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn repeated_patterns_outrank_single_observations() {
        let detector = PatternDetector::new(PatternConfig::default());
        detector.detect(&actions(&["open", "read", "open", "read", "open", "save"]));
        let predictions = detector.predict_next_action(&["open"]);
        assert_eq!(predictions[0].predicted_action, "read");
        assert!(predictions[0].confidence > predictions[predictions.len() - 1].confidence);
    }

    #[test]
    fn prefix_matching_is_label_wise() {
        let detector = PatternDetector::new(PatternConfig::default());
        detector.detect(&actions(&["typewriter", "print"]));
        assert!(detector.predict_next_action(&["type"]).is_empty());
    }

    #[test]
    fn keys_join_labels_with_arrows() {
        assert_eq!(pattern_key(&["a", "b", "c"]), "a->b->c");
    }
}
