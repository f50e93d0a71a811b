use std::time::Duration;

use super::common::{test_config, video_metadata};
use crate::ffpipe_core::domain::{MediaFile, Operation, OperationKind, TaskSpec, TaskStatus, VideoFormat};
use crate::ffpipe_core::engine::Engine;
use crate::ffpipe_core::store::{NewTask, WorkStore};

/// Simulated crash: a `processing` row is preloaded into the database before
/// the engine boots. Startup must restore it to `queued`, and the scheduler
/// must then drive it to a terminal state exactly once (here: failed, since
/// its object was never uploaded).
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupted_tasks_are_requeued_and_finish_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), 2);
    let db_path = dir.path().join("work.db");
    config.database_url = format!("sqlite://{}", db_path.display());

    let task_id = {
        let store = WorkStore::connect(&config.database_url).await.unwrap();
        store
            .insert_file(&MediaFile {
                id: "vid1".to_string(),
                file_name: "vid1.mp4".to_string(),
                file_path: "vid1.mp4".to_string(),
                mime_type: "video/mp4".to_string(),
                metadata: Some(video_metadata(true)),
            })
            .await
            .unwrap();
        let task = store
            .create_task(&NewTask {
                code: "crashed1".to_string(),
                file_id: "vid1".to_string(),
                operation: OperationKind::Transcode,
                spec: TaskSpec::new(Operation::Transcode {
                    format: VideoFormat::Mp4,
                    video_codec: None,
                    audio_codec: None,
                }),
            })
            .await
            .unwrap();
        store.set_task_processing(task.id).await.unwrap();
        store.set_task_pid(task.id, Some(99999)).await.unwrap();
        task.id
    };

    let engine = Engine::start(config).await.unwrap();

    // Immediately after init, nothing may still claim to be processing from
    // the previous life.
    let row = engine.store().get_task(task_id).await.unwrap().unwrap();
    assert_ne!(row.pid, Some(99999), "stale pid must be cleared on restore");

    // The scheduler now re-runs the task; its blob object never existed, so
    // it lands in `failed` (download error) and stays there.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let final_status = loop {
        let row = engine.store().get_task(task_id).await.unwrap().unwrap();
        if row.status.is_terminal() {
            break row.status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task never reached a terminal state (status {:?})",
            row.status
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert_eq!(final_status, TaskStatus::Failed);

    let row = engine.store().get_task(task_id).await.unwrap().unwrap();
    assert!(row.error.unwrap_or_default().contains("download failed"));
    assert_eq!(row.pid, None);

    // Settled means settled: the status does not flip again.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let row = engine.store().get_task(task_id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Failed);

    engine.stop();
}
