use crate::logging::append_run_log;
use crate::step_identity::fingerprint;
use crate::types::Step;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

const PARALLEL_LABEL_HINT: &str = "read";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Optimization {
    RedundancyRemoved { step: u32, reason: String },
    ParallelExecution { group: Vec<u32>, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub original_step_count: usize,
    pub optimized_step_count: usize,
    pub optimizations: Vec<Optimization>,
    pub optimized_steps: Vec<Step>,
}

impl OptimizationResult {
    pub fn removed_steps(&self) -> Vec<u32> {
        self.optimizations
            .iter()
            .filter_map(|optimization| match optimization {
                Optimization::RedundancyRemoved { step, .. } => Some(*step),
                Optimization::ParallelExecution { .. } => None,
            })
            .collect()
    }

    pub fn parallel_groups(&self) -> Vec<Vec<u32>> {
        self.optimizations
            .iter()
            .filter_map(|optimization| match optimization {
                Optimization::ParallelExecution { group, .. } => Some(group.clone()),
                Optimization::RedundancyRemoved { .. } => None,
            })
            .collect()
    }
}

/// Drops later duplicates of an identical action, then groups runs of
/// read-like steps that could execute together. Step numbers are kept as
/// recorded; the input is never modified.
pub fn optimize(steps: &[Step]) -> OptimizationResult {
    let mut optimizations = Vec::new();
    let mut seen = HashSet::new();
    let mut optimized_steps = Vec::with_capacity(steps.len());

    for step in steps {
        if seen.insert(fingerprint(&step.action)) {
            optimized_steps.push(step.clone());
        } else {
            optimizations.push(Optimization::RedundancyRemoved {
                step: step.step_number,
                reason: "Duplicate action detected".to_string(),
            });
        }
    }

    for group in parallel_groups(&optimized_steps) {
        optimizations.push(Optimization::ParallelExecution {
            group,
            reason: "These steps can be executed in parallel".to_string(),
        });
    }

    let result = OptimizationResult {
        original_step_count: steps.len(),
        optimized_step_count: optimized_steps.len(),
        optimizations,
        optimized_steps,
    };
    append_run_log(
        "info",
        "workflow.optimized",
        json!({
            "original_step_count": result.original_step_count,
            "optimized_step_count": result.optimized_step_count,
            "optimizations": result.optimizations.len(),
        }),
    );
    result
}

fn is_parallelizable(step: &Step) -> bool {
    step.label().to_lowercase().contains(PARALLEL_LABEL_HINT)
}

fn parallel_groups(steps: &[Step]) -> Vec<Vec<u32>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for step in steps {
        if is_parallelizable(step) {
            current.push(step.step_number);
            continue;
        }
        if current.len() > 1 {
            groups.push(std::mem::take(&mut current));
        } else {
            current.clear();
        }
    }
    if current.len() > 1 {
        groups.push(current);
    }
    groups
}
