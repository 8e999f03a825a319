use crate::errors::StepwiseError;
use crate::fsm::validate_playback_transition;
use crate::logging::append_run_log;
use crate::playback::model::{ExecutedStep, Playback, PlaybackOptions, PlaybackStatusView};
use crate::runtime::{lock_or_recover, Clock};
use crate::session::Recording;
use crate::types::{PlaybackStatus, Step};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct ControlState {
    playback: Playback,
    stop_requested: bool,
}

struct Shared {
    playback_id: String,
    loop_claimed: AtomicBool,
    state: Mutex<ControlState>,
    signal: Condvar,
    source: Recording,
    clock: Arc<dyn Clock>,
}

/// What the playback loop should do after a checkpoint.
#[derive(Debug)]
pub(crate) enum Checkpoint {
    Proceed,
    Halted(Playback),
}

/// Shared control surface of one playback. Clones refer to the same run.
///
/// `pause`, `resume` and `stop` only record a signal and wake the loop; the
/// loop applies it at its next checkpoint. Calls that do not fit the current
/// state are ignored.
#[derive(Clone)]
pub struct PlaybackHandle {
    shared: Arc<Shared>,
}

impl PlaybackHandle {
    pub(crate) fn new(
        playback_id: String,
        source: Recording,
        options: PlaybackOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let playback = Playback {
            playback_id: playback_id.clone(),
            source_session_id: source.session_id.clone(),
            status: PlaybackStatus::Playing,
            options,
            executed_steps: Vec::new(),
            started_at_ms: clock.now_ms(),
            ended_at_ms: None,
            failure: None,
        };
        Self {
            shared: Arc::new(Shared {
                playback_id,
                loop_claimed: AtomicBool::new(false),
                state: Mutex::new(ControlState {
                    playback,
                    stop_requested: false,
                }),
                signal: Condvar::new(),
                source,
                clock,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        lock_or_recover(&self.shared.state)
    }

    pub fn playback_id(&self) -> String {
        self.shared.playback_id.clone()
    }

    /// True for exactly one caller; only that caller may drive the loop.
    pub(crate) fn claim_loop(&self) -> bool {
        !self.shared.loop_claimed.swap(true, Ordering::AcqRel)
    }

    pub fn source_steps(&self) -> &[Step] {
        &self.shared.source.steps
    }

    pub fn options(&self) -> PlaybackOptions {
        self.lock().playback.options
    }

    pub fn snapshot(&self) -> Playback {
        self.lock().playback.clone()
    }

    pub fn status(&self) -> PlaybackStatusView {
        let state = self.lock();
        PlaybackStatusView {
            status: state.playback.status,
            paused: state.playback.status == PlaybackStatus::Paused,
            source_session_id: state.playback.source_session_id.clone(),
        }
    }

    pub fn pause(&self) -> bool {
        self.signal(PlaybackStatus::Playing, PlaybackStatus::Paused, "playback.paused")
    }

    pub fn resume(&self) -> bool {
        self.signal(PlaybackStatus::Paused, PlaybackStatus::Playing, "playback.resumed")
    }

    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        if !state.playback.status.is_active() || state.stop_requested {
            return false;
        }
        state.stop_requested = true;
        append_run_log(
            "info",
            "playback.stop_requested",
            json!({
                "playback_id": state.playback.playback_id,
                "status": state.playback.status.as_str(),
            }),
        );
        drop(state);
        self.shared.signal.notify_all();
        true
    }

    fn signal(&self, from: PlaybackStatus, to: PlaybackStatus, event_type: &str) -> bool {
        let mut state = self.lock();
        if state.playback.status != from || state.stop_requested {
            return false;
        }
        if validate_playback_transition(from, to).is_err() {
            return false;
        }
        state.playback.status = to;
        append_run_log(
            "info",
            event_type,
            json!({
                "playback_id": state.playback.playback_id,
                "executed": state.playback.executed_steps.len(),
            }),
        );
        drop(state);
        self.shared.signal.notify_all();
        true
    }

    /// Blocks until the playback reaches a terminal state or `timeout` passes.
    pub fn wait_until_finished(&self, timeout: Duration) -> PlaybackStatus {
        let guard = self.lock();
        let (state, _) = self
            .shared
            .signal
            .wait_timeout_while(guard, timeout, |state| {
                !state.playback.status.is_terminal()
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.playback.status
    }

    /// Blocks until at least `count` steps were executed, the playback ended,
    /// or `timeout` passed. Returns the executed step count.
    pub fn wait_for_executed(&self, count: usize, timeout: Duration) -> usize {
        let guard = self.lock();
        let (state, _) = self
            .shared
            .signal
            .wait_timeout_while(guard, timeout, |state| {
                state.playback.executed_steps.len() < count
                    && !state.playback.status.is_terminal()
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.playback.executed_steps.len()
    }

    /// Parks while paused and applies a pending stop.
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        let guard = self.lock();
        let (state, halted) = self.settle(guard);
        match halted {
            Some(playback) => Checkpoint::Halted(playback),
            None => {
                drop(state);
                Checkpoint::Proceed
            }
        }
    }

    /// Final checkpoint plus the `completed` transition, under one lock.
    pub(crate) fn complete(&self) -> Result<Playback, StepwiseError> {
        let guard = self.lock();
        let (mut state, halted) = self.settle(guard);
        if let Some(playback) = halted {
            return Ok(playback);
        }
        self.finish_locked(&mut state, PlaybackStatus::Completed, None)
    }

    fn settle<'a>(
        &'a self,
        mut state: MutexGuard<'a, ControlState>,
    ) -> (MutexGuard<'a, ControlState>, Option<Playback>) {
        loop {
            if state.playback.status.is_terminal() {
                let playback = state.playback.clone();
                return (state, Some(playback));
            }
            if state.stop_requested {
                let stopped = self.finish_locked(&mut state, PlaybackStatus::Stopped, None);
                let playback = stopped.unwrap_or_else(|_| state.playback.clone());
                return (state, Some(playback));
            }
            if state.playback.status == PlaybackStatus::Playing {
                return (state, None);
            }
            state = self
                .shared
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Waits out a pacing gap. Returns early once a stop is requested.
    pub(crate) fn pace(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let deadline = Instant::now().checked_add(delay);
        let mut state = self.lock();
        while !state.stop_requested {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => delay,
            };
            if remaining.is_zero() {
                break;
            }
            let (next, timeout) = self
                .shared
                .signal
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
            if timeout.timed_out() {
                break;
            }
        }
    }

    pub(crate) fn record(&self, executed: ExecutedStep) -> Result<(), StepwiseError> {
        let mut state = self.lock();
        if state.playback.status.is_terminal() {
            return Err(StepwiseError::InvalidState(format!(
                "playback {} is {}; no further steps are recorded",
                state.playback.playback_id,
                state.playback.status.as_str()
            )));
        }
        let expected = state.playback.executed_steps.len() + 1;
        if executed.step.step_number as usize != expected {
            return Err(StepwiseError::InvalidState(format!(
                "playback {} expected step {expected}, got {}",
                state.playback.playback_id, executed.step.step_number
            )));
        }
        state.playback.executed_steps.push(executed);
        drop(state);
        self.shared.signal.notify_all();
        Ok(())
    }

    pub(crate) fn pause_for_error(&self) {
        self.signal(
            PlaybackStatus::Playing,
            PlaybackStatus::Paused,
            "playback.paused_on_error",
        );
    }

    /// Moves to `failed`. A pause that arrived while the step was executing is
    /// lifted first, since `paused -> failed` is not an edge.
    pub(crate) fn fail(&self, failure: String) -> Result<Playback, StepwiseError> {
        let mut state = self.lock();
        if state.playback.status == PlaybackStatus::Paused {
            validate_playback_transition(PlaybackStatus::Paused, PlaybackStatus::Playing)?;
            state.playback.status = PlaybackStatus::Playing;
        }
        self.finish_locked(&mut state, PlaybackStatus::Failed, Some(failure))
    }

    fn finish_locked(
        &self,
        state: &mut MutexGuard<'_, ControlState>,
        to: PlaybackStatus,
        failure: Option<String>,
    ) -> Result<Playback, StepwiseError> {
        validate_playback_transition(state.playback.status, to)?;
        state.playback.status = to;
        state.playback.ended_at_ms = Some(self.shared.clock.now_ms());
        state.playback.failure = failure;
        append_run_log(
            if to == PlaybackStatus::Failed {
                "warn"
            } else {
                "info"
            },
            "playback.finished",
            json!({
                "playback_id": state.playback.playback_id,
                "source_session_id": state.playback.source_session_id,
                "status": to.as_str(),
                "executed": state.playback.executed_steps.len(),
                "failure": state.playback.failure,
            }),
        );
        self.shared.signal.notify_all();
        Ok(state.playback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{Checkpoint, PlaybackHandle};
    use crate::playback::model::PlaybackOptions;
    use crate::runtime::FakeClock;
    use crate::session::Recording;
    use crate::types::PlaybackStatus;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn handle() -> PlaybackHandle {
        let mut source = Recording::new("src", 0);
        source.complete(1).expect("complete");
        PlaybackHandle::new(
            "pb".to_string(),
            source,
            PlaybackOptions::default(),
            Arc::new(FakeClock::at_millis(0)),
        )
    }

    #[test]
    fn illegal_controls_are_ignored() {
        let handle = handle();
        assert!(!handle.resume());
        assert!(handle.pause());
        assert!(!handle.pause());
        assert!(handle.status().paused);
        assert!(handle.resume());
        assert_eq!(handle.status().status, PlaybackStatus::Playing);
        assert_eq!(handle.status().source_session_id, "src");
    }

    #[test]
    fn stop_applies_at_the_next_checkpoint() {
        let handle = handle();
        assert!(handle.stop());
        assert_eq!(handle.status().status, PlaybackStatus::Playing);
        match handle.checkpoint() {
            Checkpoint::Halted(playback) => assert_eq!(playback.status, PlaybackStatus::Stopped),
            Checkpoint::Proceed => panic!("stop was not applied"),
        }
        assert!(!handle.stop());
        assert!(!handle.pause());
    }

    #[test]
    fn paused_checkpoint_waits_for_resume() {
        let handle = handle();
        handle.pause();
        let waiter = handle.clone();
        let join = thread::spawn(move || matches!(waiter.checkpoint(), Checkpoint::Proceed));
        thread::sleep(Duration::from_millis(30));
        assert!(!join.is_finished());
        handle.resume();
        assert!(join.join().expect("join"));
    }

    #[test]
    fn pacing_wakes_early_on_stop() {
        let handle = handle();
        let pacer = handle.clone();
        let join = thread::spawn(move || {
            let started = std::time::Instant::now();
            pacer.pace(Duration::from_secs(30));
            started.elapsed()
        });
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        let waited = join.join().expect("join");
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn fail_lifts_a_pending_pause() {
        let handle = handle();
        handle.pause();
        let playback = handle.fail("boom".to_string()).expect("fail");
        assert_eq!(playback.status, PlaybackStatus::Failed);
        assert_eq!(playback.failure.as_deref(), Some("boom"));
    }
}
