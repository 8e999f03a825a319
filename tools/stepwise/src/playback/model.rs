use crate::config::PlaybackConfig;
use crate::errors::StepwiseError;
use crate::types::{PlaybackStatus, Step};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackOptions {
    pub speed: f64,
    pub skip_errors: bool,
    pub pause_on_error: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            skip_errors: false,
            pause_on_error: false,
        }
    }
}

impl From<&PlaybackConfig> for PlaybackOptions {
    fn from(cfg: &PlaybackConfig) -> Self {
        Self {
            speed: cfg.default_speed,
            skip_errors: cfg.skip_errors,
            pause_on_error: cfg.pause_on_error,
        }
    }
}

/// Caller-supplied options; unset fields fall back to the engine defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayOptions {
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub skip_errors: Option<bool>,
    #[serde(default)]
    pub pause_on_error: Option<bool>,
}

impl ReplayOptions {
    pub fn resolve(&self, defaults: &PlaybackOptions) -> Result<PlaybackOptions, StepwiseError> {
        let speed = self.speed.unwrap_or(defaults.speed);
        if !speed.is_finite() || speed <= 0.0 {
            return Err(StepwiseError::InvalidOption(format!(
                "speed must be a positive number, got {speed}"
            )));
        }
        Ok(PlaybackOptions {
            speed,
            skip_errors: self.skip_errors.unwrap_or(defaults.skip_errors),
            pause_on_error: self.pause_on_error.unwrap_or(defaults.pause_on_error),
        })
    }
}

/// What an executor reports for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: String,
}

impl ExecutionOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub executed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub step: Step,
    pub result: ExecutionResult,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playback {
    pub playback_id: String,
    pub source_session_id: String,
    pub status: PlaybackStatus,
    pub options: PlaybackOptions,
    pub executed_steps: Vec<ExecutedStep>,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub failure: Option<String>,
}

impl Playback {
    pub fn failed_steps(&self) -> impl Iterator<Item = &ExecutedStep> {
        self.executed_steps
            .iter()
            .filter(|executed| !executed.result.success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackStatusView {
    pub status: PlaybackStatus,
    pub paused: bool,
    pub source_session_id: String,
}
