//! Task state machine, optimistic concurrency, and poll filtering.

mod support;

use foreman_core::CoreError;
use foreman_core::tasks::{StatusUpdate, TaskFilter};
use foreman_model::{TaskStatus, TaskType, TaskVersion};
use std::sync::Arc;
use support::{harness, new_task, node_id};

fn update(new_status: TaskStatus, version: TaskVersion) -> StatusUpdate {
    StatusUpdate {
        new_status,
        result_message: None,
        expected_version: version,
        reporter: None,
    }
}

#[tokio::test]
async fn create_starts_pending_with_initial_version() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("build packages", TaskType::PackageTask, &["n1"]))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.version, TaskVersion::INITIAL);
    assert_eq!(task.assigned_node_id, Some(node_id("n1")));
    assert!(task.started_at.is_none());
    assert!(task.completed_at.is_none());
}

#[tokio::test]
async fn versions_increase_strictly_across_updates() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("capture", TaskType::RealityCapture, &["n1"]))
        .await
        .unwrap();

    let running = h
        .tasks
        .update_status(task.id, update(TaskStatus::Running, task.version))
        .await
        .unwrap();
    assert!(running.version > task.version);
    assert!(running.started_at.is_some());

    let done = h
        .tasks
        .update_status(task.id, update(TaskStatus::Completed, running.version))
        .await
        .unwrap();
    assert!(done.version > running.version);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn stale_version_gets_conflict_with_current_state() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("compress", TaskType::FileProcessing, &["n1"]))
        .await
        .unwrap();

    // Two admins read at the same version (scenario S3); the first write wins.
    let winner = h
        .tasks
        .update_status(task.id, update(TaskStatus::Running, task.version))
        .await
        .unwrap();

    let loser = h
        .tasks
        .update_status(task.id, update(TaskStatus::Cancelled, task.version))
        .await;
    match loser {
        Err(CoreError::VersionConflict { current }) => {
            assert_eq!(current.version, winner.version);
            assert_eq!(current.status, TaskStatus::Running);
        }
        other => panic!("expected version conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_updates_with_same_version_have_one_winner() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("thumbs", TaskType::RenderThumbnails, &["n1"]))
        .await
        .unwrap();

    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let mut handles = Vec::new();
    for new_status in [TaskStatus::Running, TaskStatus::Cancelled] {
        let tasks = h.tasks.clone();
        let barrier = barrier.clone();
        let version = task.version;
        let id = task.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            tasks.update_status(id, update(new_status, version)).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(CoreError::VersionConflict { current }) => {
                conflicts += 1;
                // The loser observes the winner's committed state.
                assert_eq!(current.version, task.version.next());
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!((wins, conflicts), (1, 1));
}

#[tokio::test]
async fn terminal_tasks_are_immutable() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("one-shot", TaskType::TestMessage, &["n1"]))
        .await
        .unwrap();

    let running = h
        .tasks
        .update_status(task.id, update(TaskStatus::Running, task.version))
        .await
        .unwrap();
    let done = h
        .tasks
        .update_status(running.id, update(TaskStatus::Completed, running.version))
        .await
        .unwrap();

    // Scenario S5: any further transition is rejected and nothing changes.
    let result = h
        .tasks
        .update_status(done.id, update(TaskStatus::Running, done.version))
        .await;
    assert!(matches!(
        result,
        Err(CoreError::InvalidTransition {
            from: TaskStatus::Completed,
            to: TaskStatus::Running,
        })
    ));
    let after = h.tasks.get(done.id).await.unwrap();
    assert_eq!(after, done);
}

#[tokio::test]
async fn pending_cannot_jump_straight_to_completed() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("skip-ahead", TaskType::TestMessage, &["n1"]))
        .await
        .unwrap();

    let result = h
        .tasks
        .update_status(task.id, update(TaskStatus::Completed, task.version))
        .await;
    assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
}

#[tokio::test]
async fn non_assigned_reporter_is_forbidden() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("private", TaskType::FileProcessing, &["n1"]))
        .await
        .unwrap();

    let result = h
        .tasks
        .update_status(
            task.id,
            StatusUpdate {
                new_status: TaskStatus::Running,
                result_message: None,
                expected_version: task.version,
                reporter: Some(node_id("intruder")),
            },
        )
        .await;
    assert!(matches!(result, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn assign_is_idempotent_and_backfills_primary() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("fanout", TaskType::VolumeCompression, &[]))
        .await
        .unwrap();
    assert_eq!(task.assigned_node_id, None);

    let once = h.tasks.assign(task.id, &node_id("n1")).await.unwrap();
    assert_eq!(once.assigned_node_id, Some(node_id("n1")));
    assert_eq!(once.assigned_node_ids, vec![node_id("n1")]);
    assert_eq!(once.status, TaskStatus::Pending);

    let twice = h.tasks.assign(task.id, &node_id("n1")).await.unwrap();
    assert_eq!(twice.assigned_node_ids, vec![node_id("n1")]);
    assert_eq!(twice.version, once.version);

    let more = h.tasks.assign(task.id, &node_id("n2")).await.unwrap();
    assert_eq!(more.assigned_node_ids, vec![node_id("n1"), node_id("n2")]);
    assert_eq!(more.assigned_node_id, Some(node_id("n1")));
}

#[tokio::test]
async fn poll_returns_pending_and_running_fan_out_only() {
    let h = harness();
    let n = node_id("n");

    // Scenario S6: T1 pending single, T2 running non-fan-out, T3 running
    // fan-out, T4 completed.
    let t1 = h
        .tasks
        .create(new_task("t1", TaskType::FileProcessing, &["n"]))
        .await
        .unwrap();
    let t2 = h
        .tasks
        .create(new_task("t2", TaskType::TestMessage, &["n"]))
        .await
        .unwrap();
    h.tasks
        .update_status(t2.id, update(TaskStatus::Running, t2.version))
        .await
        .unwrap();
    let t3 = h
        .tasks
        .create(new_task("t3", TaskType::VolumeCompression, &["n", "m"]))
        .await
        .unwrap();
    h.tasks
        .update_status(t3.id, update(TaskStatus::Running, t3.version))
        .await
        .unwrap();
    let t4 = h
        .tasks
        .create(new_task("t4", TaskType::TestMessage, &["n"]))
        .await
        .unwrap();
    let t4 = h
        .tasks
        .update_status(t4.id, update(TaskStatus::Running, t4.version))
        .await
        .unwrap();
    h.tasks
        .update_status(t4.id, update(TaskStatus::Completed, t4.version))
        .await
        .unwrap();

    let polled = h.tasks.poll_for_node(&n).await.unwrap();
    let ids: Vec<_> = polled.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![t1.id, t3.id]);

    // An unassigned node sees nothing.
    assert!(h.tasks.poll_for_node(&node_id("other")).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_filters_by_status() {
    let h = harness();
    let t1 = h
        .tasks
        .create(new_task("a", TaskType::TestMessage, &["n"]))
        .await
        .unwrap();
    let t2 = h
        .tasks
        .create(new_task("b", TaskType::TestMessage, &["n"]))
        .await
        .unwrap();
    h.tasks
        .update_status(t2.id, update(TaskStatus::Running, t2.version))
        .await
        .unwrap();

    let pending = h
        .tasks
        .list(TaskFilter {
            status: Some(TaskStatus::Pending),
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, t1.id);

    let all = h.tasks.list(TaskFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn delete_cascades_folder_items() {
    let h = harness();
    let task = h
        .tasks
        .create(new_task("fanout", TaskType::VolumeCompression, &["n1"]))
        .await
        .unwrap();
    h.folders
        .create_or_replace(task.id, vec!["/v/a".into(), "/v/b".into()])
        .await
        .unwrap();

    h.tasks.delete(task.id).await.unwrap();
    assert!(matches!(
        h.tasks.get(task.id).await,
        Err(CoreError::NotFound(_))
    ));
    assert!(matches!(
        h.folders.list(task.id).await,
        Err(CoreError::NotFound(_))
    ));
}
