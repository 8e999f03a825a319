use crate::analysis::{
    optimize, OptimizationResult, Pattern, PatternDetector, Prediction, Suggestion,
    SuggestionGenerator, Workflow, WorkflowSample,
};
use crate::archive::RecordingArchive;
use crate::config::AppConfig;
use crate::errors::StepwiseError;
use crate::playback::{
    ActionExecutor, Playback, PlaybackEngine, PlaybackHandle, PlaybackOptions,
    PlaybackStatusView, ReplayOptions,
};
use crate::runtime::Clock;
use crate::session::{Recording, RecordingManager, RecordingSummary, DEFAULT_PREVIEW_STEPS};
use crate::types::{Action, Step, StepMetadata};
use std::sync::Arc;
use std::thread::JoinHandle;

/// The request-facing surface: sessions, playback, patterns, optimization
/// and suggestions, each backed by an instance-owned registry.
pub struct AutomationService {
    recordings: Arc<RecordingManager>,
    playback: Arc<PlaybackEngine>,
    detector: Arc<PatternDetector>,
    suggestions: SuggestionGenerator,
}

impl AutomationService {
    pub fn new(
        cfg: &AppConfig,
        clock: Arc<dyn Clock>,
        executor: Arc<dyn ActionExecutor>,
        archive: Option<Arc<dyn RecordingArchive>>,
    ) -> Self {
        let mut recordings = RecordingManager::new(Arc::clone(&clock));
        if let Some(archive) = archive {
            recordings = recordings.with_archive(archive, cfg.archive.persist_on_stop);
        }
        let recordings = Arc::new(recordings);
        let playback = Arc::new(PlaybackEngine::new(
            Arc::clone(&recordings),
            executor,
            clock,
            PlaybackOptions::from(&cfg.playback),
        ));
        let detector = Arc::new(PatternDetector::new(cfg.patterns.clone()));
        let suggestions = SuggestionGenerator::new(Arc::clone(&detector), cfg.suggestions.clone());
        Self {
            recordings,
            playback,
            detector,
            suggestions,
        }
    }

    pub fn recordings(&self) -> &Arc<RecordingManager> {
        &self.recordings
    }

    pub fn playback_engine(&self) -> &Arc<PlaybackEngine> {
        &self.playback
    }

    // ── sessions ──────────────────────────────────────────────────────────────

    pub fn start_session(&self, session_id: Option<&str>) -> Result<String, StepwiseError> {
        self.recordings.start(session_id)
    }

    pub fn append_step(
        &self,
        session_id: &str,
        action: Action,
        metadata: StepMetadata,
    ) -> Result<Step, StepwiseError> {
        self.recordings.append_step(session_id, action, metadata)
    }

    pub fn stop_session(&self, session_id: &str) -> Result<Recording, StepwiseError> {
        self.recordings.stop(session_id)
    }

    pub fn import_session(&self, recording: Recording) -> Result<String, StepwiseError> {
        self.recordings.import(recording)
    }

    pub fn list_sessions(&self) -> Vec<Recording> {
        self.recordings.list()
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Recording>, StepwiseError> {
        self.recordings.get(session_id)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool, StepwiseError> {
        self.recordings.delete(session_id)
    }

    pub fn session_summary(&self, session_id: &str) -> Result<RecordingSummary, StepwiseError> {
        self.recordings.summary(session_id, DEFAULT_PREVIEW_STEPS)
    }

    // ── playback ──────────────────────────────────────────────────────────────

    pub fn replay(
        &self,
        session_id: &str,
        options: &ReplayOptions,
    ) -> Result<Playback, StepwiseError> {
        self.playback.replay(session_id, options)
    }

    pub fn spawn_replay(
        &self,
        session_id: &str,
        options: &ReplayOptions,
    ) -> Result<(PlaybackHandle, JoinHandle<Result<Playback, StepwiseError>>), StepwiseError> {
        self.playback.spawn_replay(session_id, options)
    }

    pub fn get_playback(&self, playback_id: &str) -> Option<Playback> {
        self.playback.get_playback(playback_id)
    }

    pub fn list_playbacks(&self) -> Vec<Playback> {
        self.playback.list_playbacks()
    }

    pub fn pause_playback(&self, playback_id: &str) -> bool {
        self.playback.pause(playback_id)
    }

    pub fn resume_playback(&self, playback_id: &str) -> bool {
        self.playback.resume(playback_id)
    }

    pub fn stop_playback(&self, playback_id: &str) -> bool {
        self.playback.stop(playback_id)
    }

    pub fn playback_status(&self, playback_id: &str) -> Option<PlaybackStatusView> {
        self.playback.status(playback_id)
    }

    // ── patterns ──────────────────────────────────────────────────────────────

    pub fn detect_patterns<A: AsRef<Action>>(&self, actions: &[A]) -> Vec<Pattern> {
        self.detector.detect(actions)
    }

    /// Runs detection over the steps of a completed session.
    pub fn analyze_session(&self, session_id: &str) -> Result<Vec<Pattern>, StepwiseError> {
        let recording = self.recordings.completed(session_id)?;
        Ok(self.detector.detect(recording.steps.as_slice()))
    }

    pub fn predict<S: AsRef<str>>(&self, current: &[S]) -> Vec<Prediction> {
        self.detector.predict_next_action(current)
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.detector.patterns()
    }

    // ── optimization & suggestions ────────────────────────────────────────────

    pub fn optimize(&self, workflow: &Workflow) -> OptimizationResult {
        optimize(&workflow.steps)
    }

    pub fn generate_suggestions(&self, sample: &WorkflowSample) -> Vec<Suggestion> {
        self.suggestions.generate(sample)
    }

    pub fn suggest_for_session(&self, session_id: &str) -> Result<Vec<Suggestion>, StepwiseError> {
        let recording = self.recordings.completed(session_id)?;
        Ok(self.suggestions.generate(&WorkflowSample::from(&recording)))
    }

    pub fn suggestions(&self) -> Vec<Suggestion> {
        self.suggestions.latest()
    }
}
