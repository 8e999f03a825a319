use crate::errors::StepwiseError;
use crate::types::{PlaybackStatus, RecordingStatus};

pub fn validate_recording_transition(
    from: RecordingStatus,
    to: RecordingStatus,
) -> Result<(), StepwiseError> {
    use RecordingStatus as S;

    let allowed = match from {
        S::Recording => matches!(to, S::Completed),
        S::Completed => false,
    };

    if !allowed {
        return Err(StepwiseError::InvalidState(format!(
            "illegal recording transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

/// `playing ⇄ paused` is the only reversible edge; every terminal state is final.
pub fn validate_playback_transition(
    from: PlaybackStatus,
    to: PlaybackStatus,
) -> Result<(), StepwiseError> {
    use PlaybackStatus as S;

    let allowed = match from {
        S::Playing => matches!(to, S::Paused | S::Completed | S::Failed | S::Stopped),
        S::Paused => matches!(to, S::Playing | S::Stopped),
        S::Completed | S::Failed | S::Stopped => false,
    };

    if !allowed {
        return Err(StepwiseError::InvalidState(format!(
            "illegal playback transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}
