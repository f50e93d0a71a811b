//! Request planning: turn operation requests into queued task rows.
//!
//! Chains are persisted up front, before any task runs. Append-mode steps
//! get their output basename (the task code) decided here, so the next
//! append step can already point at the file the earlier one will create.
//! Replace-mode steps always act on the chain's root file.

use rand::Rng;

use super::Inner;
use crate::ffpipe_core::domain::{Operation, Task, TaskMode, TaskSpec};
use crate::ffpipe_core::error::{PipelineError, Result};
use crate::ffpipe_core::ffmpeg_args::compat::validate_mux;
use crate::ffpipe_core::store::NewTask;

/// Task codes double as output basenames and forked file ids.
pub(crate) fn generate_code() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Schema-level validation, run before any row is written. Media-dependent
/// preconditions (stream presence, durations) are checked by the executor.
async fn validate(inner: &Inner, spec: &TaskSpec) -> Result<()> {
    match &spec.op {
        Operation::Transcode {
            format,
            video_codec,
            audio_codec,
        } => validate_mux(*format, *video_codec, *audio_codec),
        Operation::ResizeVideo { width, height } => {
            if *width == 0 || *height == 0 {
                return Err(PipelineError::InvalidArgument(
                    "resize dimensions must be positive".to_string(),
                ));
            }
            Ok(())
        }
        Operation::Trim {
            start, duration, ..
        } => {
            if *start < 0.0 || !start.is_finite() {
                return Err(PipelineError::InvalidArgument(
                    "trim start must be non-negative".to_string(),
                ));
            }
            if *duration <= 0.0 || !duration.is_finite() {
                return Err(PipelineError::InvalidArgument(
                    "trim duration must be positive".to_string(),
                ));
            }
            Ok(())
        }
        Operation::TrimEnd { duration } => {
            if *duration <= 0.0 || !duration.is_finite() {
                return Err(PipelineError::InvalidArgument(
                    "trim-end duration must be positive".to_string(),
                ));
            }
            Ok(())
        }
        Operation::AddAudio { audio_file_id } => {
            if inner.store.get_file(audio_file_id).await?.is_none() {
                return Err(PipelineError::NotFound(format!(
                    "audio file {audio_file_id}"
                )));
            }
            Ok(())
        }
        Operation::MergeMedia { file_ids, .. } => {
            if file_ids.len() < 2 {
                return Err(PipelineError::InvalidArgument(
                    "merge-media needs at least two inputs".to_string(),
                ));
            }
            for id in file_ids {
                if inner.store.get_file(id).await?.is_none() {
                    return Err(PipelineError::NotFound(format!("file {id}")));
                }
            }
            Ok(())
        }
        Operation::AsrAnalyze {
            max_chunk,
            min_chunk,
            ..
        } => {
            if let (Some(max), Some(min)) = (max_chunk, min_chunk)
                && max < min
            {
                return Err(PipelineError::InvalidArgument(
                    "max_chunk must be at least min_chunk".to_string(),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn require_file(inner: &Inner, file_id: &str) -> Result<()> {
    if inner.store.get_file(file_id).await?.is_none() {
        return Err(PipelineError::NotFound(format!("file {file_id}")));
    }
    Ok(())
}

/// One operation against one file. The resolved mode is pinned into the
/// stored args so later default changes cannot re-interpret old rows.
pub(crate) async fn plan_single(inner: &Inner, file_id: &str, mut spec: TaskSpec) -> Result<Task> {
    require_file(inner, file_id).await?;
    validate(inner, &spec).await?;
    spec.mode = Some(spec.resolved_mode());
    let new = NewTask {
        code: generate_code(),
        file_id: file_id.to_string(),
        operation: spec.op.kind(),
        spec,
    };
    inner.store.create_task(&new).await
}

/// An ordered chain against one root file. Append steps fork the working
/// file and link the next append step to the fork via `parent`; replace
/// steps always rewrite the root. Per-file serialization guarantees each
/// parent exists by the time its consumer runs.
pub(crate) async fn plan_chain(
    inner: &Inner,
    file_id: &str,
    specs: Vec<TaskSpec>,
) -> Result<Vec<Task>> {
    if specs.is_empty() {
        return Err(PipelineError::InvalidArgument(
            "chain needs at least one operation".to_string(),
        ));
    }
    require_file(inner, file_id).await?;

    let mut batch = Vec::with_capacity(specs.len());
    let mut lineage: Option<String> = None;
    for mut spec in specs {
        validate(inner, &spec).await?;
        let mode = spec.resolved_mode();
        spec.mode = Some(mode);
        let code = generate_code();
        match mode {
            TaskMode::Append => {
                spec.parent = lineage.clone();
                lineage = Some(code.clone());
            }
            TaskMode::Replace => {
                spec.parent = None;
            }
        }
        batch.push(NewTask {
            code,
            file_id: file_id.to_string(),
            operation: spec.op.kind(),
            spec,
        });
    }
    inner.store.create_tasks(&batch).await
}

/// The same operation fanned out over many files, one task per file.
pub(crate) async fn plan_bulk(
    inner: &Inner,
    file_ids: &[String],
    spec: TaskSpec,
) -> Result<Vec<Task>> {
    if file_ids.is_empty() {
        return Err(PipelineError::InvalidArgument(
            "bulk request needs at least one file id".to_string(),
        ));
    }

    let mut batch = Vec::with_capacity(file_ids.len());
    for file_id in file_ids {
        require_file(inner, file_id).await?;
        let mut spec = spec.clone();
        validate(inner, &spec).await?;
        spec.mode = Some(spec.resolved_mode());
        batch.push(NewTask {
            code: generate_code(),
            file_id: file_id.clone(),
            operation: spec.op.kind(),
            spec,
        });
    }
    inner.store.create_tasks(&batch).await
}
