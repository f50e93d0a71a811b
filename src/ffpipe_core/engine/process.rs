//! Child-process execution for ffmpeg invocations.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use super::Inner;
use crate::ffpipe_core::config::TASK_TIMEOUT_SECS;
use crate::ffpipe_core::error::{PipelineError, Result};

/// Flags prepended to every invocation: overwrite outputs (re-runs after
/// crash recovery hit the same keys), auto thread count, and a deeper input
/// queue for multi-input muxes.
const PREFIX_ARGS: &[&str] = &["-y", "-threads", "0", "-thread_queue_size", "256"];

/// Stop collecting stderr past this point; analysis parsers only ever see
/// event lines well under it.
const STDERR_CAP: usize = 8 * 1024 * 1024;

/// Tail kept when stderr becomes a task error message.
const ERROR_TAIL: usize = 16 * 1024;

/// Run ffmpeg to completion. Stdout is inherited, stderr is captured and
/// returned (silence/scene analysis parses it). The child pid is recorded on
/// the task row for the duration of the run, and the process is killed after
/// 15 minutes wall clock.
pub(crate) async fn run_ffmpeg(inner: &Inner, task_id: i64, args: &[String]) -> Result<String> {
    let mut cmd = Command::new(&inner.config.ffmpeg_path);
    cmd.args(PREFIX_ARGS)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(task_id, ffmpeg = %inner.config.ffmpeg_path.display(), args = %args.join(" "), "spawning ffmpeg");

    let mut child = cmd.spawn().map_err(|err| {
        PipelineError::ProcessFailed(format!(
            "failed to spawn {}: {err}",
            inner.config.ffmpeg_path.display()
        ))
    })?;

    if let Some(pid) = child.id() {
        inner.store.set_task_pid(task_id, Some(pid)).await?;
    }

    let Some(mut stderr) = child.stderr.take() else {
        let _ = child.start_kill();
        let _ = child.wait().await;
        return Err(PipelineError::ProcessFailed(
            "ffmpeg stderr pipe unavailable".to_string(),
        ));
    };
    let reader = tokio::spawn(async move {
        let mut collected: Vec<u8> = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if collected.len() < STDERR_CAP {
                        let take = n.min(STDERR_CAP - collected.len());
                        collected.extend_from_slice(&buf[..take]);
                    }
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    });

    let timeout = Duration::from_secs(TASK_TIMEOUT_SECS);
    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(waited) => waited.map_err(|err| {
            PipelineError::ProcessFailed(format!("failed to wait on ffmpeg: {err}"))
        })?,
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            reader.abort();
            return Err(PipelineError::ProcessFailed(format!(
                "ffmpeg timed out after {TASK_TIMEOUT_SECS}s and was killed"
            )));
        }
    };

    let captured = reader.await.unwrap_or_default();

    if !status.success() {
        let code_desc = status
            .code()
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
        return Err(PipelineError::ProcessFailed(format!(
            "ffmpeg exited with non-zero status ({code_desc}): {}",
            tail(&captured, ERROR_TAIL)
        )));
    }

    Ok(captured)
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text.trim();
    }
    let cut = text.len() - max;
    let boundary = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= cut)
        .unwrap_or(cut);
    text[boundary..].trim()
}
