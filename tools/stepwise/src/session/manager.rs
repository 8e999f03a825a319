use crate::archive::RecordingArchive;
use crate::errors::StepwiseError;
use crate::logging::append_run_log;
use crate::runtime::Clock;
use crate::session::recording::Recording;
use crate::session::store::SessionStore;
use crate::session::summary::{summarize, RecordingSummary};
use crate::types::{Action, Step, StepMetadata};
use serde_json::json;
use std::sync::Arc;

/// Owns the lifecycle of recording sessions: start, append, stop, and the
/// read paths over them. Optionally backed by a durable archive.
pub struct RecordingManager {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    archive: Option<Arc<dyn RecordingArchive>>,
    persist_on_stop: bool,
}

impl RecordingManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: SessionStore::new(),
            clock,
            archive: None,
            persist_on_stop: false,
        }
    }

    pub fn with_archive(mut self, archive: Arc<dyn RecordingArchive>, persist_on_stop: bool) -> Self {
        self.archive = Some(archive);
        self.persist_on_stop = persist_on_stop;
        self
    }

    pub fn archive(&self) -> Option<&Arc<dyn RecordingArchive>> {
        self.archive.as_ref()
    }

    pub fn start(&self, session_id: Option<&str>) -> Result<String, StepwiseError> {
        let session_id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let started_at_ms = self.clock.now_ms();
        let result = self
            .store
            .insert_new(Recording::new(session_id.clone(), started_at_ms));
        if let Err(err) = result {
            append_run_log(
                "warn",
                "recording.start.rejected",
                json!({ "session_id": session_id, "error": err.to_string() }),
            );
            return Err(err);
        }
        append_run_log(
            "info",
            "recording.started",
            json!({ "session_id": session_id, "started_at_ms": started_at_ms }),
        );
        Ok(session_id)
    }

    pub fn append_step(
        &self,
        session_id: &str,
        action: Action,
        metadata: StepMetadata,
    ) -> Result<Step, StepwiseError> {
        let step = self.store.with_recording(session_id, |recording| {
            recording.append(action, metadata, self.clock.now_ms())
        })?;
        append_run_log(
            "debug",
            "recording.step.appended",
            json!({
                "session_id": session_id,
                "step_number": step.step_number,
                "action": step.label(),
            }),
        );
        Ok(step)
    }

    pub fn stop(&self, session_id: &str) -> Result<Recording, StepwiseError> {
        let recording = self.store.with_recording(session_id, |recording| {
            recording.complete(self.clock.now_ms())?;
            Ok(recording.clone())
        })?;
        append_run_log(
            "info",
            "recording.stopped",
            json!({
                "session_id": session_id,
                "step_count": recording.steps.len(),
                "duration_ms": recording.duration_ms,
            }),
        );

        if self.persist_on_stop {
            if let Some(archive) = &self.archive {
                // The session is already closed in memory; a failed save stays a log line.
                if let Err(err) = archive.save(session_id, &recording) {
                    append_run_log(
                        "error",
                        "recording.archive.failed",
                        json!({ "session_id": session_id, "error": err.to_string() }),
                    );
                }
            }
        }
        Ok(recording)
    }

    /// Adds an already completed recording, e.g. one read from a file.
    pub fn import(&self, recording: Recording) -> Result<String, StepwiseError> {
        recording.validate()?;
        if !recording.is_completed() {
            return Err(StepwiseError::InvalidState(format!(
                "cannot import {}: recording is still open",
                recording.session_id
            )));
        }
        let session_id = recording.session_id.clone();
        let step_count = recording.steps.len();
        self.store.insert_new(recording)?;
        append_run_log(
            "info",
            "recording.imported",
            json!({ "session_id": session_id, "step_count": step_count }),
        );
        Ok(session_id)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Recording>, StepwiseError> {
        if let Some(recording) = self.store.snapshot(session_id) {
            return Ok(Some(recording));
        }
        let Some(archive) = &self.archive else {
            return Ok(None);
        };
        match archive.load(session_id) {
            Ok(recording) => Ok(Some(recording)),
            Err(StepwiseError::RecordingNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The completed recording behind `session_id`, ready for replay or analysis.
    pub fn completed(&self, session_id: &str) -> Result<Recording, StepwiseError> {
        let recording = self
            .get(session_id)?
            .ok_or_else(|| StepwiseError::RecordingNotFound(session_id.to_string()))?;
        if !recording.is_completed() {
            return Err(StepwiseError::InvalidState(format!(
                "recording {session_id} is still recording"
            )));
        }
        Ok(recording)
    }

    /// In-memory sessions ordered by start time, then id.
    pub fn list(&self) -> Vec<Recording> {
        let mut recordings = self.store.snapshots();
        recordings.sort_by(|a, b| {
            a.started_at_ms
                .cmp(&b.started_at_ms)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        recordings
    }

    pub fn delete(&self, session_id: &str) -> Result<bool, StepwiseError> {
        let mut removed = self.store.remove(session_id);
        if let Some(archive) = &self.archive {
            removed |= archive.delete(session_id)?;
        }
        append_run_log(
            "info",
            "recording.deleted",
            json!({ "session_id": session_id, "removed": removed }),
        );
        Ok(removed)
    }

    pub fn summary(
        &self,
        session_id: &str,
        preview_steps: usize,
    ) -> Result<RecordingSummary, StepwiseError> {
        let recording = self
            .get(session_id)?
            .ok_or_else(|| StepwiseError::SessionNotFound(session_id.to_string()))?;
        Ok(summarize(&recording, preview_steps))
    }
}
