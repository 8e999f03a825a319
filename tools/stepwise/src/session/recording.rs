use crate::errors::StepwiseError;
use crate::fsm::validate_recording_transition;
use crate::types::{Action, RecordingStatus, Step, StepMetadata};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub session_id: String,
    pub status: RecordingStatus,
    #[serde(default)]
    pub steps: Vec<Step>,
    pub started_at_ms: u64,
    #[serde(default)]
    pub ended_at_ms: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl Recording {
    pub fn new(session_id: impl Into<String>, started_at_ms: u64) -> Self {
        Self {
            session_id: session_id.into(),
            status: RecordingStatus::Recording,
            steps: Vec::new(),
            started_at_ms,
            ended_at_ms: None,
            duration_ms: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.status == RecordingStatus::Recording
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordingStatus::Completed
    }

    /// Appends the next step. Timestamps never run backwards, so a clock that
    /// steps back still yields `timestamp` order equal to `step_number` order.
    pub fn append(
        &mut self,
        action: Action,
        metadata: StepMetadata,
        now_ms: u64,
    ) -> Result<Step, StepwiseError> {
        if !self.is_recording() {
            return Err(StepwiseError::InvalidState(format!(
                "session {} is {}, not recording",
                self.session_id,
                self.status.as_str()
            )));
        }

        let (step_number, timestamp_ms) = match self.steps.last() {
            Some(last) => (last.step_number + 1, now_ms.max(last.timestamp_ms)),
            None => (1, now_ms.max(self.started_at_ms)),
        };
        let step = Step {
            step_number,
            timestamp_ms,
            action,
            metadata,
        };
        self.steps.push(step.clone());
        Ok(step)
    }

    pub fn complete(&mut self, now_ms: u64) -> Result<(), StepwiseError> {
        validate_recording_transition(self.status, RecordingStatus::Completed)?;
        let ended_at_ms = self
            .steps
            .last()
            .map_or(now_ms, |last| now_ms.max(last.timestamp_ms))
            .max(self.started_at_ms);
        self.status = RecordingStatus::Completed;
        self.ended_at_ms = Some(ended_at_ms);
        self.duration_ms = Some(ended_at_ms - self.started_at_ms);
        Ok(())
    }

    /// Checks the step invariants of a recording that did not come from
    /// `append`, such as one loaded from a file.
    pub fn validate(&self) -> Result<(), StepwiseError> {
        if self.session_id.trim().is_empty() {
            return Err(StepwiseError::InvalidState(
                "recording has a blank session id".to_string(),
            ));
        }

        let mut previous_ts = self.started_at_ms;
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.step_number != expected {
                return Err(StepwiseError::InvalidState(format!(
                    "step {} of {} is numbered {}",
                    expected, self.session_id, step.step_number
                )));
            }
            if step.timestamp_ms < previous_ts {
                return Err(StepwiseError::InvalidState(format!(
                    "step {} of {} goes back in time",
                    step.step_number, self.session_id
                )));
            }
            previous_ts = step.timestamp_ms;
        }

        match (self.status, self.ended_at_ms) {
            (RecordingStatus::Completed, None) => Err(StepwiseError::InvalidState(format!(
                "completed recording {} has no end timestamp",
                self.session_id
            ))),
            (RecordingStatus::Recording, Some(_)) => Err(StepwiseError::InvalidState(format!(
                "recording {} is still open but has an end timestamp",
                self.session_id
            ))),
            _ => Ok(()),
        }
    }
}
