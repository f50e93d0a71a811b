//! Task execution, end to end: materialize inputs from the blob store,
//! build the argument vector, run ffmpeg, upload results, and commit the
//! file-identity mutation. Local scratch files are always handed to the
//! background queue for deletion, success or failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::segmenting::{
    self, ChunkAnalysis, SceneAnalysis, SegmentManifest, SegmentManifestEntry,
};
use super::{Inner, cleanup, process};
use crate::ffpipe_core::blob::{BlobAcl, BlobStore};
use crate::ffpipe_core::domain::formats::{ext_of, mime_for_ext, stem_of};
use crate::ffpipe_core::domain::{
    ImageFormat, MediaFile, MediaMetadata, Operation, Task, TaskMode, TaskSpec, VideoFormat,
};
use crate::ffpipe_core::error::{PipelineError, Result};
use crate::ffpipe_core::ffmpeg_args::builder;
use crate::ffpipe_core::probe;

const DEFAULT_THUMBNAIL_TIMESTAMP: &str = "00:00:01";
const DEFAULT_SILENCE_THRESHOLD: &str = "-30dB";
const DEFAULT_MIN_SILENCE_SECS: f64 = 0.5;
const DEFAULT_MAX_CHUNK_SECS: f64 = 300.0;
const DEFAULT_MIN_CHUNK_SECS: f64 = 30.0;
const DEFAULT_SCENE_THRESHOLD: f64 = 0.4;

/// Run one claimed task to completion. The caller records the terminal
/// status and the failure cascade.
pub(crate) async fn run_task(inner: &Arc<Inner>, task: &Task) -> Result<()> {
    let spec: TaskSpec = serde_json::from_value(task.args.clone())?;
    debug!(
        task_id = task.id,
        operation = task.operation.as_str(),
        file_id = %task.file_id,
        "executing task"
    );
    match &spec.op {
        Operation::Dash {} => run_dash(inner, task, &spec).await,
        Operation::AsrNormalize {} => run_asr_normalize(inner, task, &spec).await,
        Operation::AsrAnalyze { .. } => run_asr_analyze(inner, task, &spec).await,
        Operation::AsrSegment {} => run_asr_segment(inner, task, &spec).await,
        Operation::VisionAnalyze { .. } => run_vision_analyze(inner, task, &spec).await,
        Operation::VisionSegment {} => run_vision_segment(inner, task, &spec).await,
        _ => {
            let mut scratch = Vec::new();
            let result = run_single_output(inner, task, &spec, &mut scratch).await;
            cleanup::remove_local_files(&inner.background, scratch);
            result
        }
    }
}

/// Primary input resolution: a chain's append step reads the file forked by
/// the previous step (`parent`); everything else reads the task's own file.
async fn resolve_primary(inner: &Inner, task: &Task, spec: &TaskSpec) -> Result<MediaFile> {
    let id = spec.parent.as_deref().unwrap_or(&task.file_id);
    inner
        .store
        .get_file(id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("file {id}")))
}

async fn resolve_file(inner: &Inner, id: &str) -> Result<MediaFile> {
    inner
        .store
        .get_file(id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("file {id}")))
}

/// Download a file's current object next to its key name under TEMP_DIR.
async fn fetch_input(inner: &Inner, file: &MediaFile, scratch: &mut Vec<PathBuf>) -> Result<PathBuf> {
    let dest = inner.config.temp_dir.join(&file.file_path);
    scratch.push(dest.clone());
    inner.blob.get_to_disk(&file.file_path, &dest).await?;
    Ok(dest)
}

/// Fetch an arbitrary key (analysis documents, normalized audio) under its
/// own name in TEMP_DIR.
async fn fetch_key(inner: &Inner, key: &str, scratch: &mut Vec<PathBuf>) -> Result<PathBuf> {
    let dest = inner.config.temp_dir.join(key);
    scratch.push(dest.clone());
    inner.blob.get_to_disk(key, &dest).await?;
    Ok(dest)
}

/// Last observed metadata, probing the downloaded copy when the row carries
/// none. `None` means the streams could not be determined; stream checks are
/// then skipped and ffmpeg gets the final word.
async fn effective_metadata(
    inner: &Inner,
    file: &MediaFile,
    local: &Path,
) -> Option<MediaMetadata> {
    if let Some(metadata) = &file.metadata {
        return Some(metadata.clone());
    }
    match probe::probe_media(&inner.config.ffprobe_path, local).await {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            warn!(file_id = %file.id, error = %err, "input probe failed; skipping stream checks");
            None
        }
    }
}

fn require_video(metadata: &Option<MediaMetadata>, what: &str) -> Result<()> {
    match metadata {
        Some(m) if !m.has_video() => Err(PipelineError::PreconditionFailed(format!(
            "{what} has no video stream"
        ))),
        _ => Ok(()),
    }
}

fn require_audio(metadata: &Option<MediaMetadata>, what: &str) -> Result<()> {
    match metadata {
        Some(m) if !m.has_audio() => Err(PipelineError::PreconditionFailed(format!(
            "{what} has no audio stream"
        ))),
        _ => Ok(()),
    }
}

fn input_ext(file: &MediaFile) -> String {
    ext_of(&file.file_path).unwrap_or_else(|| "mp4".to_string())
}

async fn media_duration(inner: &Inner, local: &Path) -> Result<f64> {
    probe::probe_duration(&inner.config.ffprobe_path, local)
        .await
        .map_err(|err| {
            PipelineError::PreconditionFailed(format!("could not determine duration: {err}"))
        })
}

/// Operations whose single output either replaces the file identity or
/// forks a new one.
async fn run_single_output(
    inner: &Arc<Inner>,
    task: &Task,
    spec: &TaskSpec,
    scratch: &mut Vec<PathBuf>,
) -> Result<()> {
    let primary = resolve_primary(inner, task, spec).await?;
    let input = fetch_input(inner, &primary, scratch).await?;

    let output_ext = match &spec.op {
        Operation::Transcode { format, .. } => format.ext().to_string(),
        Operation::Trim { output_format, .. } => output_format
            .map(|f| f.ext().to_string())
            .unwrap_or_else(|| input_ext(&primary)),
        Operation::ExtractAudio { audio_format } => audio_format.ext().to_string(),
        Operation::MergeMedia { output_format, .. } => output_format.ext().to_string(),
        Operation::ExtractThumbnail { image_format, .. } => {
            image_format.unwrap_or(ImageFormat::Jpg).ext().to_string()
        }
        _ => input_ext(&primary),
    };
    let output_file = format!("{}.{}", task.code, output_ext);
    let output_path = inner.config.temp_dir.join(&output_file);
    scratch.push(output_path.clone());

    let args = match &spec.op {
        Operation::Transcode {
            format,
            video_codec,
            audio_codec,
        } => {
            let metadata = effective_metadata(inner, &primary, &input).await;
            require_video(&metadata, "transcode input")?;
            builder::transcode(&input, &output_path, *format, *video_codec, *audio_codec)?
        }
        Operation::ResizeVideo { width, height } => {
            let metadata = effective_metadata(inner, &primary, &input).await;
            require_video(&metadata, "resize input")?;
            builder::resize_video(&input, &output_path, *width, *height)
        }
        Operation::Trim {
            start,
            duration,
            exact,
            ..
        } => builder::trim(&input, &output_path, *start, *duration, *exact),
        Operation::TrimEnd { duration } => {
            let total = media_duration(inner, &input).await?;
            let keep = total - duration;
            if keep <= 0.0 {
                return Err(PipelineError::PreconditionFailed(format!(
                    "cutting {duration}s leaves nothing of a {total}s file"
                )));
            }
            builder::trim_end(&input, &output_path, keep)
        }
        Operation::ExtractAudio { audio_format } => {
            let metadata = effective_metadata(inner, &primary, &input).await;
            require_audio(&metadata, "extract-audio input")?;
            builder::extract_audio(&input, &output_path, *audio_format)
        }
        Operation::RemoveAudio {} => {
            let metadata = effective_metadata(inner, &primary, &input).await;
            require_audio(&metadata, "remove-audio input")?;
            builder::remove_audio(&input, &output_path)
        }
        Operation::AddAudio { audio_file_id } => {
            let audio_file = resolve_file(inner, audio_file_id).await?;
            let audio_input = fetch_input(inner, &audio_file, scratch).await?;
            let audio_meta = effective_metadata(inner, &audio_file, &audio_input).await;
            require_audio(&audio_meta, "added audio track")?;
            let container =
                VideoFormat::from_ext(&output_ext).unwrap_or(VideoFormat::Mp4);
            let source_codec = audio_meta
                .as_ref()
                .and_then(|m| m.audio_codec())
                .map(str::to_string);
            builder::add_audio(
                &input,
                &audio_input,
                &output_path,
                container,
                source_codec.as_deref(),
            )
        }
        Operation::MergeMedia { file_ids, .. } => {
            let mut inputs = vec![input.clone()];
            for id in file_ids.iter().skip(1) {
                let file = resolve_file(inner, id).await?;
                inputs.push(fetch_input(inner, &file, scratch).await?);
            }
            let metadata = effective_metadata(inner, &primary, &input).await;
            let (width, height) = metadata.as_ref().and_then(|m| m.dimensions()).ok_or_else(
                || {
                    PipelineError::PreconditionFailed(
                        "first merge input has no video stream".to_string(),
                    )
                },
            )?;
            builder::merge_media(&inputs, &output_path, width, height)
        }
        Operation::ExtractThumbnail { timestamp, .. } => {
            let metadata = effective_metadata(inner, &primary, &input).await;
            require_video(&metadata, "thumbnail input")?;
            let timestamp = timestamp.as_deref().unwrap_or(DEFAULT_THUMBNAIL_TIMESTAMP);
            builder::extract_thumbnail(&input, &output_path, timestamp)
        }
        other => {
            return Err(PipelineError::InvalidArgument(format!(
                "operation {} has no single-output execution path",
                other.kind().as_str()
            )));
        }
    };

    process::run_ffmpeg(inner, task.id, &args).await?;

    inner
        .blob
        .put_from_disk(&output_file, &output_path, BlobAcl::Private)
        .await?;

    match spec.resolved_mode() {
        TaskMode::Replace => {
            commit_replace(inner, &primary, &output_file, &output_path).await
        }
        TaskMode::Append => commit_append(inner, task, &primary, &output_file, &output_path).await,
    }
}

/// Advisory probe of a freshly produced output. Failure keeps the row's
/// previous mime/metadata.
async fn probe_output(inner: &Inner, output_path: &Path) -> Option<MediaMetadata> {
    match probe::probe_media(&inner.config.ffprobe_path, output_path).await {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            warn!(output = %output_path.display(), error = %err, "output probe failed; keeping previous metadata");
            None
        }
    }
}

/// Replace commit: the file keeps its id but moves to the new object key,
/// name, and (when probing succeeded) mime/metadata. The superseded object
/// is deleted off the critical path.
pub(in crate::ffpipe_core::engine) async fn commit_replace(
    inner: &Inner,
    primary: &MediaFile,
    output_file: &str,
    output_path: &Path,
) -> Result<()> {
    let probed = probe_output(inner, output_path).await;
    let ext = ext_of(output_file).unwrap_or_default();
    let new_name = format!("{}.{ext}", stem_of(&primary.file_name));
    let mime = mime_for_ext(&ext);

    inner
        .store
        .swap_file_identity(
            &primary.id,
            &new_name,
            output_file,
            probed.as_ref().map(|metadata| (mime, metadata)),
        )
        .await?;

    if primary.file_path != output_file {
        cleanup::delete_remote(
            &inner.background,
            Arc::clone(&inner.blob),
            primary.file_path.clone(),
        );
    }
    Ok(())
}

/// Append commit: a new file row is created for the output; the source file
/// and its object are left untouched.
pub(in crate::ffpipe_core::engine) async fn commit_append(
    inner: &Inner,
    task: &Task,
    primary: &MediaFile,
    output_file: &str,
    output_path: &Path,
) -> Result<()> {
    let probed = probe_output(inner, output_path).await;
    let ext = ext_of(output_file).unwrap_or_default();
    let file = MediaFile {
        id: task.code.clone(),
        file_name: format!("{}.{ext}", stem_of(&primary.file_name)),
        file_path: output_file.to_string(),
        mime_type: mime_for_ext(&ext).to_string(),
        metadata: probed,
    };
    inner.store.insert_file(&file).await?;
    Ok(())
}

/// DASH packaging: segments plus manifest land under `{file_id}/dash/`,
/// world-readable. The file row is untouched.
async fn run_dash(inner: &Arc<Inner>, task: &Task, spec: &TaskSpec) -> Result<()> {
    let mut scratch = Vec::new();
    let workdir = inner.config.temp_dir.join(format!("{}_dash", task.code));
    let result = dash_inner(inner, task, spec, &mut scratch, &workdir).await;
    cleanup::remove_local_files(&inner.background, scratch);
    cleanup::remove_local_dir(&inner.background, workdir);
    result
}

async fn dash_inner(
    inner: &Arc<Inner>,
    task: &Task,
    spec: &TaskSpec,
    scratch: &mut Vec<PathBuf>,
    workdir: &Path,
) -> Result<()> {
    let primary = resolve_primary(inner, task, spec).await?;
    let input = fetch_input(inner, &primary, scratch).await?;
    let metadata = effective_metadata(inner, &primary, &input).await;
    require_video(&metadata, "dash input")?;

    tokio::fs::create_dir_all(workdir).await?;
    let manifest = workdir.join("manifest.mpd");
    let args = builder::dash(&input, &manifest);
    process::run_ffmpeg(inner, task.id, &args).await?;

    let mut entries = tokio::fs::read_dir(workdir).await?;
    let mut uploaded = 0usize;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let key = format!("{}/dash/{name}", primary.id);
        inner
            .blob
            .put_from_disk(&key, &entry.path(), BlobAcl::PublicRead)
            .await?;
        uploaded += 1;
    }
    if uploaded == 0 {
        return Err(PipelineError::ProcessFailed(
            "dash packaging produced no segments".to_string(),
        ));
    }
    debug!(task_id = task.id, segments = uploaded, "dash bundle uploaded");
    Ok(())
}

async fn run_asr_normalize(inner: &Arc<Inner>, task: &Task, spec: &TaskSpec) -> Result<()> {
    let mut scratch = Vec::new();
    let result = asr_normalize_inner(inner, task, spec, &mut scratch).await;
    cleanup::remove_local_files(&inner.background, scratch);
    result
}

async fn asr_normalize_inner(
    inner: &Arc<Inner>,
    task: &Task,
    spec: &TaskSpec,
    scratch: &mut Vec<PathBuf>,
) -> Result<()> {
    let primary = resolve_primary(inner, task, spec).await?;
    let input = fetch_input(inner, &primary, scratch).await?;
    let metadata = effective_metadata(inner, &primary, &input).await;
    require_audio(&metadata, "asr-normalize input")?;

    let output_path = inner.config.temp_dir.join(format!("{}.wav", task.code));
    scratch.push(output_path.clone());
    let args = builder::asr_normalize(&input, &output_path);
    process::run_ffmpeg(inner, task.id, &args).await?;

    let key = format!("{}/asr/normalized.wav", primary.id);
    inner
        .blob
        .put_from_disk(&key, &output_path, BlobAcl::PublicRead)
        .await?;
    Ok(())
}

async fn run_asr_analyze(inner: &Arc<Inner>, task: &Task, spec: &TaskSpec) -> Result<()> {
    let mut scratch = Vec::new();
    let result = asr_analyze_inner(inner, task, spec, &mut scratch).await;
    cleanup::remove_local_files(&inner.background, scratch);
    result
}

async fn asr_analyze_inner(
    inner: &Arc<Inner>,
    task: &Task,
    spec: &TaskSpec,
    scratch: &mut Vec<PathBuf>,
) -> Result<()> {
    let Operation::AsrAnalyze {
        silence_threshold,
        min_silence_duration,
        max_chunk,
        min_chunk,
    } = &spec.op
    else {
        return Err(PipelineError::InvalidArgument(
            "asr-analyze executor invoked with wrong args".to_string(),
        ));
    };

    let primary = resolve_primary(inner, task, spec).await?;
    // The scan runs against the normalized track, not the original media;
    // running the chain without asr-normalize first fails here.
    let normalized_key = format!("{}/asr/normalized.wav", primary.id);
    let normalized = fetch_key(inner, &normalized_key, scratch).await?;

    let duration = media_duration(inner, &normalized).await?;
    let threshold = silence_threshold.as_deref().unwrap_or(DEFAULT_SILENCE_THRESHOLD);
    let min_silence = min_silence_duration.unwrap_or(DEFAULT_MIN_SILENCE_SECS);
    let max_chunk = max_chunk.unwrap_or(DEFAULT_MAX_CHUNK_SECS);
    let min_chunk = min_chunk.unwrap_or(DEFAULT_MIN_CHUNK_SECS);

    let args = builder::silence_detect(&normalized, threshold, min_silence);
    let stderr = process::run_ffmpeg(inner, task.id, &args).await?;
    let silence_starts = segmenting::parse_silence_starts(&stderr);
    let segments = segmenting::plan_chunks(duration, max_chunk, min_chunk, &silence_starts);

    let analysis = ChunkAnalysis {
        duration,
        max_chunk,
        min_chunk,
        silence_starts,
        segments,
    };
    let local = inner
        .config
        .temp_dir
        .join(format!("{}_analysis.json", task.code));
    scratch.push(local.clone());
    tokio::fs::write(&local, serde_json::to_vec_pretty(&analysis)?).await?;
    inner
        .blob
        .put_from_disk(
            &format!("{}/asr/analysis.json", primary.id),
            &local,
            BlobAcl::PublicRead,
        )
        .await?;
    Ok(())
}

async fn run_asr_segment(inner: &Arc<Inner>, task: &Task, spec: &TaskSpec) -> Result<()> {
    let mut scratch = Vec::new();
    let result = asr_segment_inner(inner, task, spec, &mut scratch).await;
    cleanup::remove_local_files(&inner.background, scratch);
    result
}

async fn asr_segment_inner(
    inner: &Arc<Inner>,
    task: &Task,
    spec: &TaskSpec,
    scratch: &mut Vec<PathBuf>,
) -> Result<()> {
    let primary = resolve_primary(inner, task, spec).await?;
    let analysis_local =
        fetch_key(inner, &format!("{}/asr/analysis.json", primary.id), scratch).await?;
    let analysis: ChunkAnalysis =
        serde_json::from_slice(&tokio::fs::read(&analysis_local).await?)?;

    let normalized =
        fetch_key(inner, &format!("{}/asr/normalized.wav", primary.id), scratch).await?;

    let mut manifest_entries = Vec::with_capacity(analysis.segments.len());
    for segment in &analysis.segments {
        let seg_name = format!("seg_{:03}.wav", segment.index);
        let local = inner
            .config
            .temp_dir
            .join(format!("{}_{}", task.code, seg_name));
        scratch.push(local.clone());
        let args = builder::copy_segment(&normalized, &local, segment.start, segment.duration);
        process::run_ffmpeg(inner, task.id, &args).await?;

        let key = format!("{}/asr/{seg_name}", primary.id);
        inner
            .blob
            .put_from_disk(&key, &local, BlobAcl::PublicRead)
            .await?;
        manifest_entries.push(SegmentManifestEntry {
            index: segment.index,
            key,
            start: segment.start,
            duration: segment.duration,
        });
    }

    upload_manifest(
        inner,
        task,
        scratch,
        &format!("{}/asr/manifest.json", primary.id),
        SegmentManifest {
            segments: manifest_entries,
        },
    )
    .await
}

async fn run_vision_analyze(inner: &Arc<Inner>, task: &Task, spec: &TaskSpec) -> Result<()> {
    let mut scratch = Vec::new();
    let result = vision_analyze_inner(inner, task, spec, &mut scratch).await;
    cleanup::remove_local_files(&inner.background, scratch);
    result
}

async fn vision_analyze_inner(
    inner: &Arc<Inner>,
    task: &Task,
    spec: &TaskSpec,
    scratch: &mut Vec<PathBuf>,
) -> Result<()> {
    let Operation::VisionAnalyze { scene_threshold } = &spec.op else {
        return Err(PipelineError::InvalidArgument(
            "vision-analyze executor invoked with wrong args".to_string(),
        ));
    };

    let primary = resolve_primary(inner, task, spec).await?;
    let input = fetch_input(inner, &primary, scratch).await?;
    let metadata = effective_metadata(inner, &primary, &input).await;
    require_video(&metadata, "vision-analyze input")?;

    let duration = media_duration(inner, &input).await?;
    let threshold = scene_threshold.unwrap_or(DEFAULT_SCENE_THRESHOLD);
    let args = builder::scene_detect(&input, threshold);
    let stderr = process::run_ffmpeg(inner, task.id, &args).await?;
    let scene_times = segmenting::parse_scene_times(&stderr);
    let scene_scores = segmenting::parse_scene_scores(&stderr);
    let segments = segmenting::plan_scene_spans(duration, &scene_times)?;

    let analysis = SceneAnalysis {
        duration,
        threshold,
        scene_times,
        scene_scores,
        segments,
    };
    let local = inner
        .config
        .temp_dir
        .join(format!("{}_scenes.json", task.code));
    scratch.push(local.clone());
    tokio::fs::write(&local, serde_json::to_vec_pretty(&analysis)?).await?;
    inner
        .blob
        .put_from_disk(
            &format!("{}/vision/analysis.json", primary.id),
            &local,
            BlobAcl::PublicRead,
        )
        .await?;
    Ok(())
}

async fn run_vision_segment(inner: &Arc<Inner>, task: &Task, spec: &TaskSpec) -> Result<()> {
    let mut scratch = Vec::new();
    let result = vision_segment_inner(inner, task, spec, &mut scratch).await;
    cleanup::remove_local_files(&inner.background, scratch);
    result
}

async fn vision_segment_inner(
    inner: &Arc<Inner>,
    task: &Task,
    spec: &TaskSpec,
    scratch: &mut Vec<PathBuf>,
) -> Result<()> {
    let primary = resolve_primary(inner, task, spec).await?;
    let analysis_local =
        fetch_key(inner, &format!("{}/vision/analysis.json", primary.id), scratch).await?;
    let analysis: SceneAnalysis =
        serde_json::from_slice(&tokio::fs::read(&analysis_local).await?)?;

    let input = fetch_input(inner, &primary, scratch).await?;
    let ext = input_ext(&primary);

    let mut manifest_entries = Vec::with_capacity(analysis.segments.len());
    for segment in &analysis.segments {
        let seg_name = format!("seg_{:03}.{ext}", segment.index);
        let local = inner
            .config
            .temp_dir
            .join(format!("{}_{}", task.code, seg_name));
        scratch.push(local.clone());
        let args = builder::copy_segment(&input, &local, segment.start, segment.duration);
        process::run_ffmpeg(inner, task.id, &args).await?;

        let key = format!("{}/vision/{seg_name}", primary.id);
        inner
            .blob
            .put_from_disk(&key, &local, BlobAcl::PublicRead)
            .await?;
        manifest_entries.push(SegmentManifestEntry {
            index: segment.index,
            key,
            start: segment.start,
            duration: segment.duration,
        });
    }

    upload_manifest(
        inner,
        task,
        scratch,
        &format!("{}/vision/manifest.json", primary.id),
        SegmentManifest {
            segments: manifest_entries,
        },
    )
    .await
}

async fn upload_manifest(
    inner: &Inner,
    task: &Task,
    scratch: &mut Vec<PathBuf>,
    key: &str,
    manifest: SegmentManifest,
) -> Result<()> {
    let local = inner
        .config
        .temp_dir
        .join(format!("{}_manifest.json", task.code));
    scratch.push(local.clone());
    tokio::fs::write(&local, serde_json::to_vec_pretty(&manifest)?).await?;
    inner.blob.put_from_disk(key, &local, BlobAcl::PublicRead).await?;
    Ok(())
}
