use crate::playback::Playback;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepwiseError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("recording not found: {0}")]
    RecordingNotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("session id already active: {0}")]
    IdConflict(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("playback {} failed at step {step_number}", playback.playback_id)]
    PlaybackFailure {
        step_number: u32,
        playback: Box<Playback>,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("database error: {0}")]
    Database(String),
}
