use crate::errors::StepwiseError;
use crate::runtime::lock_or_recover;
use crate::session::recording::Recording;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type RecordingSlot = Arc<Mutex<Recording>>;

/// In-memory session map. Each recording sits behind its own lock so appends
/// to one session never contend with another. Lock order is map, then slot.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, RecordingSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `recording` under its id. Only a session that is still
    /// recording blocks the id; a completed entry is replaced.
    pub fn insert_new(&self, recording: Recording) -> Result<RecordingSlot, StepwiseError> {
        let mut sessions = lock_or_recover(&self.sessions);
        let active = sessions
            .get(&recording.session_id)
            .is_some_and(|slot| lock_or_recover(slot).is_recording());
        if active {
            return Err(StepwiseError::IdConflict(recording.session_id));
        }
        let session_id = recording.session_id.clone();
        let slot = Arc::new(Mutex::new(recording));
        sessions.insert(session_id, Arc::clone(&slot));
        Ok(slot)
    }

    pub fn slot(&self, session_id: &str) -> Option<RecordingSlot> {
        lock_or_recover(&self.sessions).get(session_id).cloned()
    }

    /// Runs `f` with the session locked. The map lock is released before `f`.
    pub fn with_recording<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Recording) -> Result<T, StepwiseError>,
    ) -> Result<T, StepwiseError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| StepwiseError::SessionNotFound(session_id.to_string()))?;
        let mut recording = lock_or_recover(&slot);
        f(&mut recording)
    }

    pub fn snapshot(&self, session_id: &str) -> Option<Recording> {
        self.slot(session_id)
            .map(|slot| lock_or_recover(&slot).clone())
    }

    pub fn snapshots(&self) -> Vec<Recording> {
        let slots = lock_or_recover(&self.sessions)
            .values()
            .cloned()
            .collect::<Vec<_>>();
        slots
            .iter()
            .map(|slot| lock_or_recover(slot).clone())
            .collect()
    }

    pub fn remove(&self, session_id: &str) -> bool {
        lock_or_recover(&self.sessions).remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::SessionStore;
    use crate::errors::StepwiseError;
    use crate::session::recording::Recording;

    #[test]
    fn duplicate_ids_conflict() {
        let store = SessionStore::new();
        store.insert_new(Recording::new("dup", 0)).expect("first");
        let err = store
            .insert_new(Recording::new("dup", 5))
            .expect_err("second");
        assert!(matches!(err, StepwiseError::IdConflict(id) if id == "dup"));
        assert_eq!(store.snapshot("dup").expect("kept").started_at_ms, 0);
    }

    #[test]
    fn completed_entries_are_replaced() {
        let store = SessionStore::new();
        store.insert_new(Recording::new("again", 0)).expect("first");
        store
            .with_recording("again", |recording| recording.complete(3))
            .expect("complete");
        store
            .insert_new(Recording::new("again", 7))
            .expect("reuse completed id");
        let current = store.snapshot("again").expect("present");
        assert!(current.is_recording());
        assert_eq!(current.started_at_ms, 7);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn with_recording_reports_missing_sessions() {
        let store = SessionStore::new();
        let err = store
            .with_recording("ghost", |_| Ok(()))
            .expect_err("missing");
        assert!(matches!(err, StepwiseError::SessionNotFound(id) if id == "ghost"));
    }

    #[test]
    fn remove_reports_whether_anything_was_dropped() {
        let store = SessionStore::new();
        store.insert_new(Recording::new("a", 0)).expect("insert");
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }
}
