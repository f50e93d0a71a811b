//! Deferred-work queue.
//!
//! Cleanup and remote deletions are pushed here as ready-made futures so the
//! executor can report completion without waiting on best-effort I/O. Jobs
//! run FIFO under their own concurrency cap; a failed job is logged and
//! dropped, never retried.

use std::pin::Pin;
use std::sync::Arc;

use futures::Future;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, warn};

use crate::ffpipe_core::error::Result;

pub(crate) type BackgroundJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Clone)]
pub(crate) struct BackgroundQueue {
    tx: mpsc::UnboundedSender<BackgroundJob>,
}

impl BackgroundQueue {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<BackgroundJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue one unit of deferred work. Errors from the future are logged
    /// under `label` and swallowed.
    pub(crate) fn push<F>(&self, label: &'static str, job: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let wrapped: BackgroundJob = Box::pin(async move {
            if let Err(err) = job.await {
                warn!(job = label, error = %err, "background job failed");
            }
        });
        // A closed receiver means the service is shutting down; pending
        // cleanups are best-effort and may be dropped.
        if self.tx.send(wrapped).is_err() {
            debug!(job = label, "background queue stopped; job dropped");
        }
    }
}

/// Dispatcher loop: pull jobs in arrival order and run each on its own task
/// once a slot frees up.
pub(crate) async fn run(
    mut rx: mpsc::UnboundedReceiver<BackgroundJob>,
    max_concurrent: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let slots = Arc::new(Semaphore::new(max_concurrent.max(1)));
    loop {
        let job = tokio::select! {
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };
        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        tokio::spawn(async move {
            job.await;
            drop(permit);
        });
    }
    debug!("background dispatcher stopped");
}
