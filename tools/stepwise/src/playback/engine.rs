use crate::errors::StepwiseError;
use crate::logging::append_run_log;
use crate::playback::control::{Checkpoint, PlaybackHandle};
use crate::playback::executor::ActionExecutor;
use crate::playback::model::{
    ExecutedStep, ExecutionResult, Playback, PlaybackOptions, PlaybackStatusView, ReplayOptions,
};
use crate::runtime::{lock_or_recover, Clock};
use crate::session::RecordingManager;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Replays completed recordings through an executor and keeps every
/// playback it started, in creation order.
pub struct PlaybackEngine {
    recordings: Arc<RecordingManager>,
    executor: Arc<dyn ActionExecutor>,
    clock: Arc<dyn Clock>,
    defaults: PlaybackOptions,
    playbacks: Mutex<PlaybackRegistry>,
}

/// Handles keyed by playback id, plus their creation order for listing.
#[derive(Default)]
struct PlaybackRegistry {
    order: Vec<String>,
    by_id: HashMap<String, PlaybackHandle>,
}

impl PlaybackRegistry {
    fn insert(&mut self, handle: PlaybackHandle) {
        let playback_id = handle.playback_id();
        self.order.push(playback_id.clone());
        self.by_id.insert(playback_id, handle);
    }

    fn in_order(&self) -> Vec<PlaybackHandle> {
        self.order
            .iter()
            .filter_map(|playback_id| self.by_id.get(playback_id).cloned())
            .collect()
    }
}

impl PlaybackEngine {
    pub fn new(
        recordings: Arc<RecordingManager>,
        executor: Arc<dyn ActionExecutor>,
        clock: Arc<dyn Clock>,
        defaults: PlaybackOptions,
    ) -> Self {
        Self {
            recordings,
            executor,
            clock,
            defaults,
            playbacks: Mutex::new(PlaybackRegistry::default()),
        }
    }

    pub fn defaults(&self) -> PlaybackOptions {
        self.defaults
    }

    /// Validates the request and registers a new playback in `playing`
    /// without executing anything yet.
    pub fn begin(
        &self,
        session_id: &str,
        options: &ReplayOptions,
    ) -> Result<PlaybackHandle, StepwiseError> {
        let source = self.recordings.completed(session_id)?;
        let options = options.resolve(&self.defaults)?;
        let playback_id = uuid::Uuid::new_v4().to_string();
        append_run_log(
            "info",
            "playback.begin",
            json!({
                "playback_id": playback_id,
                "source_session_id": session_id,
                "steps": source.steps.len(),
                "speed": options.speed,
                "skip_errors": options.skip_errors,
                "pause_on_error": options.pause_on_error,
            }),
        );
        let handle = PlaybackHandle::new(playback_id, source, options, Arc::clone(&self.clock));
        lock_or_recover(&self.playbacks).insert(handle.clone());
        Ok(handle)
    }

    /// Runs the playback loop to a terminal state on the calling thread.
    /// A handle is driven by at most one loop.
    pub(crate) fn run(&self, handle: &PlaybackHandle) -> Result<Playback, StepwiseError> {
        if !handle.claim_loop() {
            return Err(StepwiseError::InvalidState(format!(
                "playback {} is already running",
                handle.playback_id()
            )));
        }
        let options = handle.options();
        let steps = handle.source_steps();

        for (index, step) in steps.iter().enumerate() {
            if let Checkpoint::Halted(playback) = handle.checkpoint() {
                return Ok(playback);
            }

            let started = Instant::now();
            let outcome = self.executor.execute(step);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let (success, output) = match outcome {
                Ok(outcome) => (outcome.success, outcome.output),
                Err(err) => (false, err.to_string()),
            };

            handle.record(ExecutedStep {
                step: step.clone(),
                result: ExecutionResult {
                    success,
                    output: output.clone(),
                    executed_at_ms: self.clock.now_ms(),
                },
                elapsed_ms,
            })?;
            append_run_log(
                if success { "debug" } else { "warn" },
                "playback.step",
                json!({
                    "playback_id": handle.playback_id(),
                    "step_number": step.step_number,
                    "action": step.label(),
                    "success": success,
                    "elapsed_ms": elapsed_ms,
                }),
            );

            if !success {
                if options.skip_errors {
                    append_run_log(
                        "info",
                        "playback.step.skipped",
                        json!({ "playback_id": handle.playback_id(), "step_number": step.step_number }),
                    );
                } else if options.pause_on_error {
                    handle.pause_for_error();
                } else {
                    let playback = handle.fail(output)?;
                    return Err(StepwiseError::PlaybackFailure {
                        step_number: step.step_number,
                        playback: Box::new(playback),
                    });
                }
            }

            if let Some(next) = steps.get(index + 1) {
                handle.pace(pacing_delay(step.timestamp_ms, next.timestamp_ms, options.speed));
            }
        }

        handle.complete()
    }

    pub fn replay(
        &self,
        session_id: &str,
        options: &ReplayOptions,
    ) -> Result<Playback, StepwiseError> {
        let handle = self.begin(session_id, options)?;
        self.run(&handle)
    }

    /// Starts the loop on a background thread. Control the run through the
    /// returned handle or by playback id.
    pub fn spawn_replay(
        self: &Arc<Self>,
        session_id: &str,
        options: &ReplayOptions,
    ) -> Result<(PlaybackHandle, JoinHandle<Result<Playback, StepwiseError>>), StepwiseError> {
        let handle = self.begin(session_id, options)?;
        let engine = Arc::clone(self);
        let worker_handle = handle.clone();
        let join = thread::Builder::new()
            .name(format!("playback-{}", handle.playback_id()))
            .spawn(move || engine.run(&worker_handle))
            .map_err(|e| StepwiseError::Io(e.to_string()))?;
        Ok((handle, join))
    }

    pub fn handle(&self, playback_id: &str) -> Option<PlaybackHandle> {
        lock_or_recover(&self.playbacks)
            .by_id
            .get(playback_id)
            .cloned()
    }

    pub fn get_playback(&self, playback_id: &str) -> Option<Playback> {
        self.handle(playback_id).map(|handle| handle.snapshot())
    }

    pub fn list_playbacks(&self) -> Vec<Playback> {
        let handles = lock_or_recover(&self.playbacks).in_order();
        handles.iter().map(PlaybackHandle::snapshot).collect()
    }

    pub fn pause(&self, playback_id: &str) -> bool {
        self.handle(playback_id)
            .is_some_and(|handle| handle.pause())
    }

    pub fn resume(&self, playback_id: &str) -> bool {
        self.handle(playback_id)
            .is_some_and(|handle| handle.resume())
    }

    pub fn stop(&self, playback_id: &str) -> bool {
        self.handle(playback_id)
            .is_some_and(|handle| handle.stop())
    }

    pub fn status(&self, playback_id: &str) -> Option<PlaybackStatusView> {
        self.handle(playback_id).map(|handle| handle.status())
    }
}

/// Gap between two recorded steps, scaled by `speed`.
pub fn pacing_delay(current_ms: u64, next_ms: u64, speed: f64) -> Duration {
    let gap_ms = next_ms.saturating_sub(current_ms) as f64;
    if gap_ms == 0.0 || !speed.is_finite() || speed <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(gap_ms / speed / 1000.0).unwrap_or(Duration::MAX)
}
