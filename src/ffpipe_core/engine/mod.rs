//! Engine: owns the work store, the blob adapter, and both schedulers.
//!
//! Startup order matters: scratch directories are wiped before the queue is
//! restored, so a crashed run's residue is gone before any task re-executes.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::info;

use crate::ffpipe_core::blob::{BlobStore, LocalBlobStore, S3BlobStore};
use crate::ffpipe_core::config::{BlobBackend, Config};
use crate::ffpipe_core::domain::{MediaFile, MediaMetadata, Task, TaskSpec};
use crate::ffpipe_core::error::{PipelineError, Result};
use crate::ffpipe_core::probe;
use crate::ffpipe_core::store::WorkStore;

pub(crate) mod background;
pub(crate) mod cleanup;
pub(crate) mod executor;
pub(crate) mod planner;
pub(crate) mod process;
pub(crate) mod scheduler;
pub mod segmenting;
pub(crate) mod workdirs;

#[cfg(test)]
mod tests;

use background::BackgroundQueue;
use scheduler::SchedulerState;

pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) store: WorkStore,
    pub(crate) blob: Arc<dyn BlobStore>,
    pub(crate) sched: Mutex<SchedulerState>,
    pub(crate) background: BackgroundQueue,
    shutdown: watch::Sender<bool>,
}

/// Service facade handed to the HTTP adapter. Cloning is cheap.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Bring the whole pipeline up: scratch wipe, schema, crash restore,
    /// then both schedulers.
    pub async fn start(config: Config) -> Result<Engine> {
        workdirs::reset(&config).await?;

        let store = WorkStore::connect(&config.database_url).await?;
        let restored = store.restore_processing_to_queued().await?;
        if restored > 0 {
            info!(count = restored, "re-enqueued tasks interrupted by shutdown");
        }

        let blob: Arc<dyn BlobStore> = match config.blob_backend {
            BlobBackend::S3 => {
                let s3 = config.s3.as_ref().ok_or_else(|| {
                    PipelineError::InvalidArgument("s3 backend selected without S3 config".into())
                })?;
                Arc::new(S3BlobStore::new(s3).await)
            }
            BlobBackend::Local => {
                let root = config.blob_local_root.clone().ok_or_else(|| {
                    PipelineError::InvalidArgument(
                        "local backend selected without BLOB_LOCAL_ROOT".into(),
                    )
                })?;
                tokio::fs::create_dir_all(&root).await?;
                Arc::new(LocalBlobStore::new(root))
            }
        };

        let (background, bg_rx) = BackgroundQueue::channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            config,
            store,
            blob,
            sched: Mutex::new(SchedulerState::default()),
            background,
            shutdown,
        });

        tokio::spawn(background::run(
            bg_rx,
            inner.config.max_concurrent_tasks,
            shutdown_rx.clone(),
        ));
        tokio::spawn(scheduler::run(Arc::clone(&inner), shutdown_rx));

        Ok(Engine { inner })
    }

    /// Signal both schedulers to stop after their current iteration. Pending
    /// background closures are dropped; durable state is already committed.
    pub fn stop(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    pub fn store(&self) -> &WorkStore {
        &self.inner.store
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn blob(&self) -> &Arc<dyn BlobStore> {
        &self.inner.blob
    }

    pub async fn plan_single(&self, file_id: &str, spec: TaskSpec) -> Result<Task> {
        planner::plan_single(&self.inner, file_id, spec).await
    }

    pub async fn plan_chain(&self, file_id: &str, specs: Vec<TaskSpec>) -> Result<Vec<Task>> {
        planner::plan_chain(&self.inner, file_id, specs).await
    }

    pub async fn plan_bulk(&self, file_ids: &[String], spec: TaskSpec) -> Result<Vec<Task>> {
        planner::plan_bulk(&self.inner, file_ids, spec).await
    }

    /// Fresh code suitable for a new file id.
    pub fn new_file_id(&self) -> String {
        planner::generate_code()
    }

    /// Probe a stored object on demand (`/meta`). The download lands in
    /// META_DIR so it can never collide with executor scratch files, and is
    /// cleaned up off the critical path.
    pub async fn probe_stored_file(&self, file: &MediaFile) -> Result<MediaMetadata> {
        let local = self.inner.config.meta_dir.join(&file.file_path);
        self.inner.blob.get_to_disk(&file.file_path, &local).await?;
        let result = probe::probe_media(&self.inner.config.ffprobe_path, &local).await;
        cleanup::remove_local_files(&self.inner.background, vec![local]);
        let metadata = result?;
        // Keep the row's advisory copy fresh for later stream checks.
        let mime = file.mime_type.clone();
        self.inner
            .store
            .update_file_metadata(&file.id, &mime, &metadata)
            .await?;
        Ok(metadata)
    }

    /// Download a file's current object into TEMP_DIR for streaming back to
    /// a client. The caller owns scheduling the cleanup.
    pub async fn materialize_for_response(&self, file: &MediaFile) -> Result<PathBuf> {
        let local = self
            .inner
            .config
            .temp_dir
            .join(format!("{}_{}", self.new_file_id(), sanitize_basename(&file.file_path)));
        self.inner.blob.get_to_disk(&file.file_path, &local).await?;
        Ok(local)
    }

    /// Schedule deletion of a local scratch file produced for a response.
    pub fn discard_local(&self, path: PathBuf) {
        cleanup::remove_local_files(&self.inner.background, vec![path]);
    }

    /// Remove a file's rows and every object it may own: the current key
    /// plus any published bundle prefixes. Remote deletions are deferred.
    pub async fn delete_file_completely(&self, file: &MediaFile) -> Result<()> {
        self.inner.store.delete_tasks_for_file(&file.id).await?;
        self.inner.store.delete_file(&file.id).await?;
        cleanup::delete_remote(
            &self.inner.background,
            Arc::clone(&self.inner.blob),
            file.file_path.clone(),
        );
        cleanup::delete_remote_prefix(
            &self.inner.background,
            Arc::clone(&self.inner.blob),
            format!("{}/", file.id),
        );
        Ok(())
    }
}

/// Flatten a key into something safe to join onto a scratch directory.
fn sanitize_basename(key: &str) -> String {
    key.replace('/', "_")
}
