use super::common::{test_engine, video_metadata};
use crate::ffpipe_core::domain::{
    AudioFormat, Operation, TaskMode, TaskSpec, VideoCodec, VideoFormat,
};
use crate::ffpipe_core::engine::planner::{plan_bulk, plan_chain, plan_single};
use crate::ffpipe_core::error::PipelineError;

fn extract_audio(mode: Option<TaskMode>) -> TaskSpec {
    TaskSpec {
        op: Operation::ExtractAudio {
            audio_format: AudioFormat::Mp3,
        },
        mode,
        parent: None,
    }
}

fn transcode(mode: Option<TaskMode>) -> TaskSpec {
    TaskSpec {
        op: Operation::Transcode {
            format: VideoFormat::Mp4,
            video_codec: None,
            audio_codec: None,
        },
        mode,
        parent: None,
    }
}

fn spec_of(task: &crate::ffpipe_core::domain::Task) -> TaskSpec {
    serde_json::from_value(task.args.clone()).expect("stored args parse")
}

#[tokio::test]
async fn single_op_pins_the_resolved_mode() {
    let engine = test_engine(2).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;

    let task = plan_single(&engine.inner, "vid1", extract_audio(None)).await.unwrap();
    let spec = spec_of(&task);
    assert_eq!(spec.mode, Some(TaskMode::Replace));
    assert_eq!(spec.parent, None);
    assert_eq!(task.code.len(), 8);
}

#[tokio::test]
async fn append_steps_link_the_next_append_to_their_output() {
    let engine = test_engine(2).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;

    let tasks = plan_chain(
        &engine.inner,
        "vid1",
        vec![
            extract_audio(Some(TaskMode::Append)),
            TaskSpec {
                op: Operation::Transcode {
                    format: VideoFormat::Mp4,
                    video_codec: Some(VideoCodec::H264),
                    audio_codec: None,
                },
                mode: Some(TaskMode::Append),
                parent: None,
            },
        ],
    )
    .await
    .unwrap();

    assert_eq!(tasks.len(), 2);
    let first = spec_of(&tasks[0]);
    let second = spec_of(&tasks[1]);
    assert_eq!(first.parent, None, "first append reads the root file");
    assert_eq!(
        second.parent.as_deref(),
        Some(tasks[0].code.as_str()),
        "second append reads the file the first will fork"
    );
    // Both rows still belong to the root file for scheduling purposes.
    assert!(tasks.iter().all(|t| t.file_id == "vid1"));
}

#[tokio::test]
async fn replace_steps_always_target_the_root_file() {
    let engine = test_engine(2).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;

    // append then replace: the replace step rewrites the original file, so
    // the chain ends with a forked mp3 plus a transcoded root.
    let tasks = plan_chain(
        &engine.inner,
        "vid1",
        vec![extract_audio(Some(TaskMode::Append)), transcode(Some(TaskMode::Replace))],
    )
    .await
    .unwrap();

    let replace_spec = spec_of(&tasks[1]);
    assert_eq!(replace_spec.mode, Some(TaskMode::Replace));
    assert_eq!(replace_spec.parent, None);

    // replace then append: the append consumes the rewritten root, which
    // needs no parent link either.
    let tasks = plan_chain(
        &engine.inner,
        "vid1",
        vec![transcode(Some(TaskMode::Replace)), extract_audio(Some(TaskMode::Append))],
    )
    .await
    .unwrap();
    assert_eq!(spec_of(&tasks[1]).parent, None);
}

#[tokio::test]
async fn bulk_requests_fan_out_one_task_per_file() {
    let engine = test_engine(2).await;
    for id in ["vid1", "vid2", "vid3"] {
        engine.insert_file(id, Some(video_metadata(true))).await;
    }
    let ids: Vec<String> = ["vid1", "vid2", "vid3"].iter().map(|s| s.to_string()).collect();

    let tasks = plan_bulk(&engine.inner, &ids, extract_audio(None)).await.unwrap();
    assert_eq!(tasks.len(), 3);
    let mut seen: Vec<&str> = tasks.iter().map(|t| t.file_id.as_str()).collect();
    seen.sort();
    assert_eq!(seen, vec!["vid1", "vid2", "vid3"]);
    // Codes are per-task, not shared across the fan-out.
    assert_ne!(tasks[0].code, tasks[1].code);
}

#[tokio::test]
async fn planning_rejects_bad_requests_without_creating_rows() {
    let engine = test_engine(2).await;
    engine.insert_file("vid1", Some(video_metadata(true))).await;

    let missing = plan_single(&engine.inner, "ghost", extract_audio(None)).await;
    assert_eq!(missing.unwrap_err().kind(), "not-found");

    let incompatible = plan_single(
        &engine.inner,
        "vid1",
        TaskSpec::new(Operation::Transcode {
            format: VideoFormat::Mp4,
            video_codec: Some(VideoCodec::Vp9),
            audio_codec: None,
        }),
    )
    .await;
    assert_eq!(incompatible.unwrap_err().kind(), "invalid-argument");

    let one_input_merge = plan_single(
        &engine.inner,
        "vid1",
        TaskSpec::new(Operation::MergeMedia {
            file_ids: vec!["vid1".to_string()],
            output_format: VideoFormat::Mp4,
        }),
    )
    .await;
    assert_eq!(one_input_merge.unwrap_err().kind(), "invalid-argument");

    let missing_audio = plan_single(
        &engine.inner,
        "vid1",
        TaskSpec::new(Operation::AddAudio {
            audio_file_id: "ghost".to_string(),
        }),
    )
    .await;
    assert_eq!(missing_audio.unwrap_err().kind(), "not-found");

    let zero_trim = plan_single(
        &engine.inner,
        "vid1",
        TaskSpec::new(Operation::Trim {
            start: 0.0,
            duration: 0.0,
            output_format: None,
            exact: false,
        }),
    )
    .await;
    assert_eq!(zero_trim.unwrap_err().kind(), "invalid-argument");

    assert!(engine.inner.store.list_tasks().await.unwrap().is_empty());
}
