use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stepwise::archive::{RecordingArchive, SqliteArchive};
use stepwise::errors::StepwiseError;
use stepwise::runtime::FakeClock;
use stepwise::session::RecordingManager;
use stepwise::types::{Action, RecordingStatus};

fn manager_over(path: &std::path::Path, clock: &FakeClock) -> RecordingManager {
    let archive = SqliteArchive::open(path).expect("open archive");
    RecordingManager::new(Arc::new(clock.clone())).with_archive(Arc::new(archive), true)
}

#[test]
fn stopped_sessions_survive_a_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested/recordings.sqlite");
    let clock = FakeClock::at_millis(5_000);

    {
        let manager = manager_over(&path, &clock);
        let id = manager.start(Some("persisted")).expect("start");
        for label in ["open", "edit", "save"] {
            clock.advance(Duration::from_millis(10));
            manager
                .append_step(&id, Action::custom(label, json!({ "doc": 1 })), Default::default())
                .expect("append");
        }
        manager.stop(&id).expect("stop");
    }

    let manager = manager_over(&path, &clock);
    let recording = manager
        .get("persisted")
        .expect("get")
        .expect("loaded from archive");
    assert_eq!(recording.status, RecordingStatus::Completed);
    assert_eq!(recording.steps.len(), 3);
    assert_eq!(recording.steps[2].label(), "save");
    assert_eq!(recording.duration_ms, Some(30));

    let replayable = manager.completed("persisted").expect("completed");
    assert_eq!(replayable, recording);
    assert!(manager.list().is_empty(), "archive entries are not live sessions");
}

#[test]
fn open_sessions_are_not_archived() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("recordings.sqlite");
    let clock = FakeClock::at_millis(0);
    let manager = manager_over(&path, &clock);

    manager.start(Some("open")).expect("start");
    let archive = manager.archive().expect("archive");
    assert!(archive.list_ids().expect("list").is_empty());
    let err = archive.load("open").expect_err("not stored");
    assert!(matches!(err, StepwiseError::RecordingNotFound(_)));
}

#[test]
fn delete_removes_the_archived_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("recordings.sqlite");
    let clock = FakeClock::at_millis(0);
    let manager = manager_over(&path, &clock);

    for id in ["b-second", "a-first"] {
        manager.start(Some(id)).expect("start");
        manager.stop(id).expect("stop");
        clock.advance(Duration::from_millis(1));
    }
    let archive = Arc::clone(manager.archive().expect("archive"));
    assert_eq!(
        archive.list_ids().expect("list"),
        vec!["b-second".to_string(), "a-first".to_string()]
    );

    assert!(manager.delete("b-second").expect("delete"));
    assert!(!manager.delete("b-second").expect("second delete"));
    assert!(manager.get("b-second").expect("get").is_none());
    assert_eq!(archive.list_ids().expect("list"), vec!["a-first".to_string()]);
}

#[test]
fn zero_byte_archive_files_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("empty.sqlite");
    std::fs::write(&path, b"").expect("touch");
    let err = SqliteArchive::open(&path).err().expect("corrupt archive");
    assert!(matches!(err, StepwiseError::Database(_)));
}
