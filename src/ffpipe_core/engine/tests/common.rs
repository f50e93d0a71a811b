use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{Mutex, mpsc, watch};

use crate::ffpipe_core::blob::{BlobAcl, BlobStore, LocalBlobStore};
use crate::ffpipe_core::config::{BlobBackend, Config};
use crate::ffpipe_core::domain::{MediaFile, MediaMetadata};
use crate::ffpipe_core::engine::background::{BackgroundJob, BackgroundQueue};
use crate::ffpipe_core::engine::scheduler::SchedulerState;
use crate::ffpipe_core::engine::Inner;
use crate::ffpipe_core::store::WorkStore;

pub(super) struct TestEngine {
    pub(super) inner: Arc<Inner>,
    pub(super) bg_rx: mpsc::UnboundedReceiver<BackgroundJob>,
    // Held for the lifetime of the test so scratch paths stay valid.
    #[allow(dead_code)]
    pub(super) dir: TempDir,
}

pub(super) fn test_config(root: &Path, max_concurrent_tasks: usize) -> Config {
    Config {
        max_concurrent_tasks,
        database_url: "sqlite::memory:".to_string(),
        blob_backend: BlobBackend::Local,
        s3: None,
        blob_local_root: Some(root.join("blobs")),
        temp_dir: root.join("tmp"),
        meta_dir: root.join("meta"),
        ffmpeg_path: "ffmpeg".into(),
        ffprobe_path: "ffprobe".into(),
        bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
    }
}

/// Engine internals wired to an in-memory store and a directory-backed blob
/// store, with no scheduler loops running. Tests drive claiming, finishing,
/// and background work by hand.
pub(super) async fn test_engine(max_concurrent_tasks: usize) -> TestEngine {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path(), max_concurrent_tasks);
    std::fs::create_dir_all(&config.temp_dir).unwrap();
    std::fs::create_dir_all(&config.meta_dir).unwrap();
    let blob_root = config.blob_local_root.clone().unwrap();
    std::fs::create_dir_all(&blob_root).unwrap();

    let store = WorkStore::in_memory().await.expect("store");
    let (background, bg_rx) = BackgroundQueue::channel();
    let (shutdown, _shutdown_rx) = watch::channel(false);

    let inner = Arc::new(Inner {
        config,
        store,
        blob: Arc::new(LocalBlobStore::new(blob_root)),
        sched: Mutex::new(SchedulerState::default()),
        background,
        shutdown,
    });

    TestEngine { inner, bg_rx, dir }
}

impl TestEngine {
    pub(super) async fn insert_file(&self, id: &str, metadata: Option<MediaMetadata>) -> MediaFile {
        let file = MediaFile {
            id: id.to_string(),
            file_name: format!("{id}.mp4"),
            file_path: format!("{id}.mp4"),
            mime_type: "video/mp4".to_string(),
            metadata,
        };
        self.inner.store.insert_file(&file).await.expect("insert file");
        file
    }

    /// Put a small object into the blob store under the file's key.
    pub(super) async fn seed_blob(&self, key: &str, content: &[u8]) {
        let staging = self.inner.config.temp_dir.join("seed.bin");
        tokio::fs::write(&staging, content).await.unwrap();
        self.inner
            .blob
            .put_from_disk(key, &staging, BlobAcl::Private)
            .await
            .unwrap();
        tokio::fs::remove_file(&staging).await.unwrap();
    }

    /// Run every queued background job to completion, in order.
    pub(super) async fn drain_background(&mut self) {
        while let Ok(job) = self.bg_rx.try_recv() {
            job.await;
        }
    }
}

pub(super) fn video_metadata(has_audio: bool) -> MediaMetadata {
    MediaMetadata::Video {
        duration_seconds: Some(30.0),
        width: Some(1280),
        height: Some(720),
        frame_rate: Some(30.0),
        video_codec: Some("h264".to_string()),
        audio_codec: has_audio.then(|| "aac".to_string()),
        has_audio,
        size_bytes: Some(1024),
    }
}
