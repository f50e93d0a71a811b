//! Foreground scheduler: turns the durable queue into in-flight executor
//! tasks under two gates. The global gate caps concurrent executors at
//! `MAX_CONCURRENT_TASKS`; the per-file gate admits at most one in-flight
//! task per file, which is what gives chains their ordering and keeps the
//! blob key namespace race-free.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::{Inner, executor};
use crate::ffpipe_core::domain::Task;
use crate::ffpipe_core::error::{PipelineError, Result};

const IDLE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    pub(crate) active_tasks: HashSet<i64>,
    pub(crate) active_files: HashSet<String>,
}

pub(crate) async fn run(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    info!(
        max_concurrent = inner.config.max_concurrent_tasks,
        "task scheduler started"
    );
    loop {
        if *shutdown.borrow() {
            break;
        }

        let claimed = match claim_next_tasks(&inner).await {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(error = %err, "scheduler claim failed; backing off");
                Vec::new()
            }
        };

        if claimed.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(IDLE_POLL) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        }

        for task in claimed {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let result = executor::run_task(&inner, &task).await;
                finish_task(&inner, &task, result).await;
            });
        }
    }
    info!("task scheduler stopped");
}

/// Claim as many queued tasks as free slots allow, skipping files that are
/// already active (including earlier claims from the same batch). Claimed
/// rows are marked `processing` before this returns.
pub(crate) async fn claim_next_tasks(inner: &Inner) -> Result<Vec<Task>> {
    let mut state = inner.sched.lock().await;

    let slots = inner
        .config
        .max_concurrent_tasks
        .saturating_sub(state.active_tasks.len());
    if slots == 0 {
        return Ok(Vec::new());
    }

    let candidates = inner
        .store
        .next_queued_tasks(&state.active_files, slots)
        .await?;

    let mut claimed = Vec::new();
    for task in candidates {
        // Two queued tasks for one file can land in the same fetch; only the
        // older one may start now.
        if state.active_files.contains(&task.file_id) {
            continue;
        }
        inner.store.set_task_processing(task.id).await?;
        state.active_tasks.insert(task.id);
        state.active_files.insert(task.file_id.clone());
        claimed.push(task);
    }
    Ok(claimed)
}

/// Commit a finished executor run and release both gates. On failure the
/// file's remaining queued tasks are cascaded to `unreachable` before the
/// file becomes eligible again.
pub(crate) async fn finish_task(inner: &Inner, task: &Task, result: Result<()>) {
    match &result {
        Ok(()) => {
            if let Err(err) = inner.store.set_task_completed(task.id).await {
                warn!(task_id = task.id, error = %err, "failed to mark task completed");
            }
            info!(
                task_id = task.id,
                file_id = %task.file_id,
                operation = task.operation.as_str(),
                "task completed"
            );
        }
        Err(err) => {
            record_failure(inner, task, err).await;
        }
    }

    let mut state = inner.sched.lock().await;
    state.active_tasks.remove(&task.id);
    state.active_files.remove(&task.file_id);
}

async fn record_failure(inner: &Inner, task: &Task, err: &PipelineError) {
    warn!(
        task_id = task.id,
        file_id = %task.file_id,
        operation = task.operation.as_str(),
        kind = err.kind(),
        error = %err,
        "task failed"
    );
    if let Err(store_err) = inner.store.set_task_failed(task.id, &err.to_string()).await {
        warn!(task_id = task.id, error = %store_err, "failed to record task failure");
    }
    match inner.store.mark_queued_as_unreachable(&task.file_id).await {
        Ok(0) => {}
        Ok(flipped) => info!(
            file_id = %task.file_id,
            count = flipped,
            "cascaded failure to queued sibling tasks"
        ),
        Err(store_err) => {
            warn!(file_id = %task.file_id, error = %store_err, "failed to cascade failure");
        }
    }
}
