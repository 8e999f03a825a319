use crate::session::recording::Recording;
use crate::types::RecordingStatus;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_PREVIEW_STEPS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingSummary {
    pub session_id: String,
    pub status: RecordingStatus,
    pub step_count: usize,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub duration_label: String,
    pub action_counts: BTreeMap<String, usize>,
    pub preview: Vec<String>,
}

pub fn summarize(recording: &Recording, preview_steps: usize) -> RecordingSummary {
    let mut action_counts = BTreeMap::new();
    for step in &recording.steps {
        *action_counts.entry(step.label().to_string()).or_insert(0) += 1;
    }

    RecordingSummary {
        session_id: recording.session_id.clone(),
        status: recording.status,
        step_count: recording.steps.len(),
        started_at_ms: recording.started_at_ms,
        ended_at_ms: recording.ended_at_ms,
        duration_label: duration_label(recording.duration_ms),
        action_counts,
        preview: recording
            .steps
            .iter()
            .take(preview_steps)
            .map(|step| format!("{}. {}", step.step_number, step.action.summary()))
            .collect(),
    }
}

pub fn duration_label(duration_ms: Option<u64>) -> String {
    let Some(duration_ms) = duration_ms else {
        return "n/a".to_string();
    };
    let total_secs = duration_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
