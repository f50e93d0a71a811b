use std::collections::HashSet;

use super::*;
use crate::ffpipe_core::domain::{
    MediaFile, Operation, OperationKind, TaskSpec, TaskStatus, VideoFormat,
};

async fn store_with_file(id: &str) -> WorkStore {
    let store = WorkStore::in_memory().await.expect("in-memory store");
    store
        .insert_file(&MediaFile {
            id: id.to_string(),
            file_name: format!("{id}.mp4"),
            file_path: format!("{id}.mp4"),
            mime_type: "video/mp4".to_string(),
            metadata: None,
        })
        .await
        .expect("insert file");
    store
}

fn transcode_task(code: &str, file_id: &str) -> NewTask {
    NewTask {
        code: code.to_string(),
        file_id: file_id.to_string(),
        operation: OperationKind::Transcode,
        spec: TaskSpec::new(Operation::Transcode {
            format: VideoFormat::Mp4,
            video_codec: None,
            audio_codec: None,
        }),
    }
}

#[tokio::test]
async fn tasks_start_queued_with_ascending_ids() {
    let store = store_with_file("vid1").await;
    let first = store.create_task(&transcode_task("aaaa0001", "vid1")).await.unwrap();
    let second = store.create_task(&transcode_task("aaaa0002", "vid1")).await.unwrap();

    assert!(second.id > first.id);
    assert_eq!(first.status, TaskStatus::Queued);
    assert_eq!(second.status, TaskStatus::Queued);
}

#[tokio::test]
async fn next_queued_respects_fifo_exclusion_and_limit() {
    let store = store_with_file("vid1").await;
    store
        .insert_file(&MediaFile {
            id: "vid2".to_string(),
            file_name: "vid2.mp4".to_string(),
            file_path: "vid2.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            metadata: None,
        })
        .await
        .unwrap();

    let t1 = store.create_task(&transcode_task("c1", "vid1")).await.unwrap();
    let t2 = store.create_task(&transcode_task("c2", "vid2")).await.unwrap();
    let t3 = store.create_task(&transcode_task("c3", "vid1")).await.unwrap();

    let all = store.next_queued_tasks(&HashSet::new(), 10).await.unwrap();
    assert_eq!(
        all.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![t1.id, t2.id, t3.id],
        "queued tasks must come back in ascending id order"
    );

    // With vid1 busy, only vid2's task is eligible.
    let exclude: HashSet<String> = ["vid1".to_string()].into_iter().collect();
    let eligible = store.next_queued_tasks(&exclude, 10).await.unwrap();
    assert_eq!(eligible.iter().map(|t| t.id).collect::<Vec<_>>(), vec![t2.id]);

    let limited = store.next_queued_tasks(&HashSet::new(), 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, t1.id);
}

#[tokio::test]
async fn cascade_only_touches_queued_siblings() {
    let store = store_with_file("vid1").await;
    let done = store.create_task(&transcode_task("c1", "vid1")).await.unwrap();
    let running = store.create_task(&transcode_task("c2", "vid1")).await.unwrap();
    let queued = store.create_task(&transcode_task("c3", "vid1")).await.unwrap();

    store.set_task_processing(done.id).await.unwrap();
    store.set_task_completed(done.id).await.unwrap();
    store.set_task_processing(running.id).await.unwrap();

    let flipped = store.mark_queued_as_unreachable("vid1").await.unwrap();
    assert_eq!(flipped, 1);

    let tasks = store.tasks_for_file("vid1").await.unwrap();
    let by_id = |id: i64| tasks.iter().find(|t| t.id == id).unwrap().status;
    assert_eq!(by_id(done.id), TaskStatus::Completed);
    assert_eq!(by_id(running.id), TaskStatus::Processing);
    assert_eq!(by_id(queued.id), TaskStatus::Unreachable);

    // The file row itself must survive a cascade.
    assert!(store.get_file("vid1").await.unwrap().is_some());
}

#[tokio::test]
async fn restore_requeues_mid_flight_tasks_and_clears_pids() {
    let store = store_with_file("vid1").await;
    let task = store.create_task(&transcode_task("c1", "vid1")).await.unwrap();
    store.set_task_processing(task.id).await.unwrap();
    store.set_task_pid(task.id, Some(4242)).await.unwrap();

    let restored = store.restore_processing_to_queued().await.unwrap();
    assert_eq!(restored, 1);

    let task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.pid, None);

    // A second restore is a no-op.
    assert_eq!(store.restore_processing_to_queued().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_tasks_keep_their_error_and_drop_their_pid() {
    let store = store_with_file("vid1").await;
    let task = store.create_task(&transcode_task("c1", "vid1")).await.unwrap();
    store.set_task_processing(task.id).await.unwrap();
    store.set_task_pid(task.id, Some(77)).await.unwrap();
    store
        .set_task_failed(task.id, "process failed: ffmpeg exited with code 1")
        .await
        .unwrap();

    let task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.pid, None);
    assert!(task.error.as_deref().unwrap_or("").contains("exited with code 1"));
}

#[tokio::test]
async fn deleting_a_file_takes_its_tasks_with_it() {
    let store = store_with_file("vid1").await;
    store.create_task(&transcode_task("c1", "vid1")).await.unwrap();
    store.create_task(&transcode_task("c2", "vid1")).await.unwrap();

    assert_eq!(store.delete_tasks_for_file("vid1").await.unwrap(), 2);
    assert!(store.delete_file("vid1").await.unwrap());
    assert!(store.get_file("vid1").await.unwrap().is_none());
    assert!(store.tasks_for_file("vid1").await.unwrap().is_empty());
}

#[tokio::test]
async fn chain_batches_insert_atomically_in_order() {
    let store = store_with_file("vid1").await;
    let batch = vec![
        transcode_task("c1", "vid1"),
        transcode_task("c2", "vid1"),
        transcode_task("c3", "vid1"),
    ];
    let created = store.create_tasks(&batch).await.unwrap();
    assert_eq!(created.len(), 3);
    assert!(created.windows(2).all(|w| w[0].id < w[1].id));

    let spec: TaskSpec = serde_json::from_value(created[0].args.clone()).unwrap();
    assert_eq!(spec.op.kind(), OperationKind::Transcode);
}
