use super::common::{test_engine, video_metadata};
use crate::ffpipe_core::domain::{Operation, TaskSpec, TaskStatus, VideoFormat};
use crate::ffpipe_core::engine::scheduler::{claim_next_tasks, finish_task};
use crate::ffpipe_core::error::PipelineError;
use crate::ffpipe_core::store::NewTask;

fn transcode(code: &str, file_id: &str) -> NewTask {
    NewTask {
        code: code.to_string(),
        file_id: file_id.to_string(),
        operation: crate::ffpipe_core::domain::OperationKind::Transcode,
        spec: TaskSpec::new(Operation::Transcode {
            format: VideoFormat::Mp4,
            video_codec: None,
            audio_codec: None,
        }),
    }
}

#[tokio::test]
async fn claims_stay_under_the_global_cap() {
    let engine = test_engine(2).await;
    for id in ["vid1", "vid2", "vid3"] {
        engine.insert_file(id, Some(video_metadata(true))).await;
    }
    for (code, file) in [("c1", "vid1"), ("c2", "vid2"), ("c3", "vid3")] {
        engine.inner.store.create_task(&transcode(code, file)).await.unwrap();
    }

    let claimed = claim_next_tasks(&engine.inner).await.unwrap();
    assert_eq!(claimed.len(), 2, "only two slots exist");
    for task in &claimed {
        let row = engine.inner.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Processing);
    }

    // All slots taken: nothing further may start.
    assert!(claim_next_tasks(&engine.inner).await.unwrap().is_empty());

    // Releasing one slot admits the third file's task.
    finish_task(&engine.inner, &claimed[0], Ok(())).await;
    let next = claim_next_tasks(&engine.inner).await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].file_id, "vid3");
}

#[tokio::test]
async fn one_in_flight_task_per_file() {
    let engine = test_engine(4).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;
    let first = engine.inner.store.create_task(&transcode("c1", "vid1")).await.unwrap();
    let second = engine.inner.store.create_task(&transcode("c2", "vid1")).await.unwrap();

    // Both tasks share a file, so a single claim round takes only the older.
    let claimed = claim_next_tasks(&engine.inner).await.unwrap();
    assert_eq!(claimed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![first.id]);
    assert!(claim_next_tasks(&engine.inner).await.unwrap().is_empty());

    let row = engine.inner.store.get_task(second.id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Queued);

    finish_task(&engine.inner, &claimed[0], Ok(())).await;
    let claimed = claim_next_tasks(&engine.inner).await.unwrap();
    assert_eq!(claimed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![second.id]);
}

#[tokio::test]
async fn same_file_tasks_start_in_ascending_id_order() {
    let engine = test_engine(1).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;
    let mut ids = Vec::new();
    for code in ["c1", "c2", "c3"] {
        ids.push(engine.inner.store.create_task(&transcode(code, "vid1")).await.unwrap().id);
    }

    let mut started = Vec::new();
    for _ in 0..3 {
        let claimed = claim_next_tasks(&engine.inner).await.unwrap();
        assert_eq!(claimed.len(), 1);
        started.push(claimed[0].id);
        finish_task(&engine.inner, &claimed[0], Ok(())).await;
    }
    assert_eq!(started, ids);
}

#[tokio::test]
async fn failure_cascades_to_queued_siblings_before_release() {
    let engine = test_engine(2).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;
    let t1 = engine.inner.store.create_task(&transcode("c1", "vid1")).await.unwrap();
    let t2 = engine.inner.store.create_task(&transcode("c2", "vid1")).await.unwrap();
    let t3 = engine.inner.store.create_task(&transcode("c3", "vid1")).await.unwrap();

    let claimed = claim_next_tasks(&engine.inner).await.unwrap();
    assert_eq!(claimed[0].id, t1.id);
    finish_task(&engine.inner, &claimed[0], Ok(())).await;

    let claimed = claim_next_tasks(&engine.inner).await.unwrap();
    assert_eq!(claimed[0].id, t2.id);
    finish_task(
        &engine.inner,
        &claimed[0],
        Err(PipelineError::ProcessFailed("ffmpeg exited with non-zero status".into())),
    )
    .await;

    let inner = &engine.inner;
    let by_id = |id| async move { inner.store.get_task(id).await.unwrap().unwrap() };
    assert_eq!(by_id(t1.id).await.status, TaskStatus::Completed);
    let failed = by_id(t2.id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.unwrap().contains("non-zero"));
    assert_eq!(by_id(t3.id).await.status, TaskStatus::Unreachable);

    // The cascade drained the queue: nothing left to claim, but the file
    // row survives.
    assert!(claim_next_tasks(&engine.inner).await.unwrap().is_empty());
    assert!(engine.inner.store.get_file("vid1").await.unwrap().is_some());
}

#[tokio::test]
async fn terminal_states_do_not_change_on_later_cascades() {
    let engine = test_engine(2).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;
    let t1 = engine.inner.store.create_task(&transcode("c1", "vid1")).await.unwrap();
    let t2 = engine.inner.store.create_task(&transcode("c2", "vid1")).await.unwrap();

    let claimed = claim_next_tasks(&engine.inner).await.unwrap();
    finish_task(&engine.inner, &claimed[0], Ok(())).await;
    let claimed = claim_next_tasks(&engine.inner).await.unwrap();
    finish_task(
        &engine.inner,
        &claimed[0],
        Err(PipelineError::DownloadFailed("object vanished".into())),
    )
    .await;

    // A second cascade for the same file is a no-op.
    assert_eq!(engine.inner.store.mark_queued_as_unreachable("vid1").await.unwrap(), 0);
    assert_eq!(
        engine.inner.store.get_task(t1.id).await.unwrap().unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(
        engine.inner.store.get_task(t2.id).await.unwrap().unwrap().status,
        TaskStatus::Failed
    );
}
