use serde_json::json;
use std::sync::Arc;
use stepwise::analysis::{SuggestionKind, WorkflowSample};
use stepwise::config::AppConfig;
use stepwise::playback::ScriptedExecutor;
use stepwise::priority::Priority;
use stepwise::runtime::FakeClock;
use stepwise::service::AutomationService;
use stepwise::types::{Action, Step};

fn service() -> AutomationService {
    AutomationService::new(
        &AppConfig::default(),
        Arc::new(FakeClock::at_millis(0)),
        Arc::new(ScriptedExecutor::always_succeeds()),
        None,
    )
}

fn actions(labels: &[&str]) -> Vec<Action> {
    labels
        .iter()
        .enumerate()
        .map(|(index, label)| Action::custom(*label, json!({ "n": index })))
        .collect()
}

fn steps(labels: &[&str], gap_ms: u64) -> Vec<Step> {
    actions(labels)
        .into_iter()
        .enumerate()
        .map(|(index, action)| Step {
            step_number: index as u32 + 1,
            timestamp_ms: index as u64 * gap_ms,
            action,
            metadata: Default::default(),
        })
        .collect()
}

#[test]
fn alternating_actions_form_a_repeated_pattern() {
    let service = service();
    let patterns = service.detect_patterns(&actions(&["click", "type", "click", "type"]));
    assert!(patterns
        .iter()
        .any(|pattern| pattern.sequence.len() >= 2 && pattern.occurrences >= 2));
    assert_eq!(service.patterns(), patterns);
}

#[test]
fn payload_data_does_not_split_patterns() {
    let service = service();
    let input = vec![
        Action::custom("fetch", json!({ "url": "/a" })),
        Action::custom("parse", json!({ "bytes": 10 })),
        Action::custom("fetch", json!({ "url": "/b" })),
        Action::custom("parse", json!({ "bytes": 99 })),
    ];
    let patterns = service.detect_patterns(&input);
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].key, "fetch->parse");
    assert_eq!(patterns[0].potential_time_saving_ms, 2 * 1000 - 100);
}

#[test]
fn one_run_is_enough_to_predict_its_continuation() {
    let service = service();
    service.detect_patterns(&actions(&["click", "type", "submit"]));
    let predictions = service.predict(&["click", "type"]);
    assert_eq!(predictions[0].predicted_action, "submit");
    assert!(service.patterns().is_empty());
}

#[test]
fn predictions_are_ranked_by_confidence() {
    let service = service();
    service.detect_patterns(&actions(&[
        "login", "search", "login", "search", "login", "logout",
    ]));
    let predictions = service.predict(&["login"]);
    assert_eq!(predictions[0].predicted_action, "search");
    assert!(predictions
        .windows(2)
        .all(|pair| pair[0].confidence >= pair[1].confidence));
    assert!(service.predict(&["never-seen"]).is_empty());
}

#[test]
fn occurrences_compound_across_detections() {
    let service = service();
    let input = actions(&["a", "b", "a", "b"]);
    service.detect_patterns(&input);
    service.detect_patterns(&input);
    let patterns = service.patterns();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].occurrences, 4);
}

#[test]
fn suggestion_snapshot_is_replaced_on_each_generation() {
    let service = service();
    let repeated = WorkflowSample {
        steps: steps(&["copy", "paste", "copy", "paste", "copy", "paste"], 100),
        duration_ms: Some(600),
    };
    let first = service.generate_suggestions(&repeated);
    assert!(first
        .iter()
        .any(|s| s.kind == SuggestionKind::PatternAutomation && s.priority == Priority::High));
    assert!(first.iter().all(|s| s.kind != SuggestionKind::Performance));
    assert_eq!(service.suggestions(), first);

    let slow = WorkflowSample {
        steps: steps(&["upload"], 0),
        duration_ms: Some(12_000),
    };
    let second = service.generate_suggestions(&slow);
    assert_eq!(
        second
            .iter()
            .filter(|s| s.kind == SuggestionKind::Performance)
            .count(),
        1
    );
    assert_eq!(service.suggestions(), second);
    assert_ne!(service.suggestions(), first);
}

#[test]
fn long_recorded_sessions_get_a_structure_suggestion() {
    let service = service();
    let id = service.start_session(Some("long")).expect("start");
    for index in 0..12 {
        service
            .append_step(
                &id,
                Action::custom(format!("step{index}"), json!({})),
                Default::default(),
            )
            .expect("append");
    }
    service.stop_session(&id).expect("stop");

    let suggestions = service.suggest_for_session(&id).expect("suggest");
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].kind, SuggestionKind::WorkflowOptimization);
    assert_eq!(suggestions[0].priority, Priority::Medium);
    assert!(suggestions[0].pattern.is_none());
}

#[test]
fn analyzing_an_unknown_session_fails() {
    let service = service();
    assert!(service.analyze_session("missing").is_err());
    assert!(service.suggest_for_session("missing").is_err());
}
