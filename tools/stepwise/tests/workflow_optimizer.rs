use std::sync::Arc;
use stepwise::analysis::{Optimization, Workflow};
use stepwise::config::AppConfig;
use stepwise::playback::ScriptedExecutor;
use stepwise::runtime::FakeClock;
use stepwise::service::AutomationService;

fn fixture(path: &str) -> String {
    format!("{}/tests/fixtures/{path}", env!("CARGO_MANIFEST_DIR"))
}

fn load_workflow(path: &str) -> Workflow {
    let raw = std::fs::read_to_string(fixture(path)).expect("fixture");
    serde_json::from_str(&raw).expect("workflow json")
}

fn service() -> AutomationService {
    AutomationService::new(
        &AppConfig::default(),
        Arc::new(FakeClock::at_millis(0)),
        Arc::new(ScriptedExecutor::always_succeeds()),
        None,
    )
}

#[test]
fn file_sync_workflow_loses_duplicates_and_groups_reads() {
    let workflow = load_workflow("workflows/file-sync.json");
    let result = service().optimize(&workflow);

    assert_eq!(result.original_step_count, 6);
    assert_eq!(result.optimized_step_count, 4);
    assert_eq!(result.removed_steps(), vec![5, 6]);
    assert_eq!(result.parallel_groups(), vec![vec![1, 2, 3]]);
    assert_eq!(
        result
            .optimized_steps
            .iter()
            .map(|step| step.step_number)
            .collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(workflow.steps.len(), 6);
}

#[test]
fn every_parallel_group_is_a_run_of_reads() {
    let workflow = load_workflow("workflows/file-sync.json");
    let result = service().optimize(&workflow);
    for optimization in &result.optimizations {
        let Optimization::ParallelExecution { group, .. } = optimization else {
            continue;
        };
        assert!(group.len() >= 2);
        for step_number in group {
            let step = result
                .optimized_steps
                .iter()
                .find(|step| step.step_number == *step_number)
                .expect("grouped step is kept");
            assert!(step.label().to_lowercase().contains("read"));
        }
    }
}

#[test]
fn optimizing_an_optimized_workflow_is_stable() {
    let workflow = load_workflow("workflows/file-sync.json");
    let service = service();
    let first = service.optimize(&workflow);
    let second = service.optimize(&Workflow {
        name: workflow.name.clone(),
        steps: first.optimized_steps.clone(),
    });
    assert!(second.removed_steps().is_empty());
    assert_eq!(second.optimized_steps, first.optimized_steps);
    assert_eq!(second.parallel_groups(), first.parallel_groups());
}

#[test]
fn empty_workflows_optimize_to_nothing() {
    let result = service().optimize(&Workflow {
        name: None,
        steps: Vec::new(),
    });
    assert_eq!(result.original_step_count, 0);
    assert!(result.optimizations.is_empty());
}
