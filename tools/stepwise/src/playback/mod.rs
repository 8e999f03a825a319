//! Replaying completed recordings against an action executor.

pub mod control;
pub mod engine;
pub mod executor;
pub mod model;

pub use control::PlaybackHandle;
pub use engine::{pacing_delay, PlaybackEngine};
pub use executor::{ActionExecutor, DryRunExecutor, ScriptedExecutor};
pub use model::{
    ExecutedStep, ExecutionOutcome, ExecutionResult, Playback, PlaybackOptions,
    PlaybackStatusView, ReplayOptions,
};
