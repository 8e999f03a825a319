use crate::errors::StepwiseError;
use crate::playback::model::ExecutionOutcome;
use crate::runtime::{lock_or_recover, Terminal};
use crate::types::Step;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Backend that performs one recorded step. An `Err` and an outcome with
/// `success == false` are both treated as a failed step.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, step: &Step) -> Result<ExecutionOutcome, StepwiseError>;
}

/// Prints what each step would do and always succeeds.
pub struct DryRunExecutor {
    terminal: Arc<dyn Terminal>,
}

impl DryRunExecutor {
    pub fn new(terminal: Arc<dyn Terminal>) -> Self {
        Self { terminal }
    }
}

impl ActionExecutor for DryRunExecutor {
    fn execute(&self, step: &Step) -> Result<ExecutionOutcome, StepwiseError> {
        let line = if step.action.is_sensitive() {
            format!("step {}: skipped sensitive key press", step.step_number)
        } else {
            format!("step {}: {}", step.step_number, step.action.summary())
        };
        self.terminal.write_line(&line)?;
        Ok(ExecutionOutcome::ok(line))
    }
}

/// Fails on a fixed set of step numbers and records every call.
#[derive(Default)]
pub struct ScriptedExecutor {
    failing_steps: BTreeSet<u32>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedExecutor {
    pub fn always_succeeds() -> Self {
        Self::default()
    }

    pub fn failing_on(step_numbers: &[u32]) -> Self {
        Self {
            failing_steps: step_numbers.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<u32> {
        lock_or_recover(&self.calls).clone()
    }
}

impl ActionExecutor for ScriptedExecutor {
    fn execute(&self, step: &Step) -> Result<ExecutionOutcome, StepwiseError> {
        lock_or_recover(&self.calls).push(step.step_number);
        if self.failing_steps.contains(&step.step_number) {
            return Err(StepwiseError::Execution(format!(
                "scripted failure at step {}",
                step.step_number
            )));
        }
        Ok(ExecutionOutcome::ok(format!("executed {}", step.label())))
    }
}
