use super::*;
use serde_json::json;

fn task(id: i64, status: TaskStatus) -> Task {
    Task {
        id,
        code: format!("code{id}"),
        file_id: "file-1".to_string(),
        operation: OperationKind::Transcode,
        args: json!({}),
        status,
        pid: None,
        error: None,
        created_at: chrono::Utc::now(),
    }
}

#[test]
fn operation_tags_round_trip_kebab_case() {
    let spec: TaskSpec = serde_json::from_value(json!({
        "operation": "extract-audio",
        "audio_format": "mp3",
        "mode": "append",
    }))
    .expect("extract-audio args should deserialize");
    assert_eq!(spec.op.kind(), OperationKind::ExtractAudio);
    assert_eq!(spec.resolved_mode(), TaskMode::Append);

    let value = serde_json::to_value(&spec).expect("serialize");
    assert_eq!(value["operation"], "extract-audio");
    assert_eq!(value["audio_format"], "mp3");
}

#[test]
fn trim_defaults_to_inexact_replace() {
    let spec: TaskSpec = serde_json::from_value(json!({
        "operation": "trim",
        "start": 5.0,
        "duration": 10,
        "output_format": "mp4",
    }))
    .expect("trim args should deserialize");
    let Operation::Trim {
        start,
        duration,
        exact,
        ..
    } = &spec.op
    else {
        panic!("expected trim variant");
    };
    assert_eq!(*start, 5.0);
    assert_eq!(*duration, 10.0);
    assert!(!exact);
    assert_eq!(spec.resolved_mode(), TaskMode::Replace);
}

#[test]
fn combining_operations_default_to_append() {
    assert_eq!(OperationKind::AddAudio.default_mode(), TaskMode::Append);
    assert_eq!(OperationKind::MergeMedia.default_mode(), TaskMode::Append);
    assert_eq!(OperationKind::Transcode.default_mode(), TaskMode::Replace);
    assert_eq!(OperationKind::Trim.default_mode(), TaskMode::Replace);
}

#[test]
fn bundle_operations_never_touch_file_identity() {
    for kind in [
        OperationKind::Dash,
        OperationKind::AsrNormalize,
        OperationKind::AsrAnalyze,
        OperationKind::AsrSegment,
        OperationKind::VisionAnalyze,
        OperationKind::VisionSegment,
    ] {
        assert!(kind.is_bundle(), "{} should be a bundle op", kind.as_str());
    }
    assert!(!OperationKind::Transcode.is_bundle());
    assert!(!OperationKind::AddAudio.is_bundle());
}

#[test]
fn status_folds_to_pending_while_any_task_is_live() {
    let tasks = vec![
        task(1, TaskStatus::Completed),
        task(2, TaskStatus::Processing),
        task(3, TaskStatus::Queued),
    ];
    assert_eq!(fold_status(&tasks), FileStatus::Pending);
}

#[test]
fn status_folds_terminal_states_by_newest_task() {
    let tasks = vec![
        task(1, TaskStatus::Completed),
        task(2, TaskStatus::Failed),
        task(3, TaskStatus::Unreachable),
    ];
    assert_eq!(fold_status(&tasks), FileStatus::Failed);

    // A later successful task supersedes an old failure.
    let tasks = vec![task(1, TaskStatus::Failed), task(2, TaskStatus::Completed)];
    assert_eq!(fold_status(&tasks), FileStatus::Completed);

    assert_eq!(fold_status(&[]), FileStatus::Completed);
}

#[test]
fn media_metadata_stream_flags() {
    let video = MediaMetadata::Video {
        duration_seconds: Some(12.5),
        width: Some(1920),
        height: Some(1080),
        frame_rate: Some(30.0),
        video_codec: Some("h264".into()),
        audio_codec: None,
        has_audio: false,
        size_bytes: Some(1024),
    };
    assert!(video.has_video());
    assert!(!video.has_audio());
    assert_eq!(video.dimensions(), Some((1920, 1080)));

    let audio = MediaMetadata::Audio {
        duration_seconds: Some(3.0),
        codec: Some("mp3".into()),
        sample_rate: Some(44100),
        channels: Some(2),
        size_bytes: None,
    };
    assert!(audio.has_audio());
    assert!(!audio.has_video());
    assert_eq!(audio.audio_codec(), Some("mp3"));
}
