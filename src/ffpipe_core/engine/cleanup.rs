//! Cleanup closures for the background queue. Everything here is
//! best-effort: disk residue is also reclaimed by the startup wipe, and
//! orphaned remote objects are harmless.

use std::path::PathBuf;
use std::sync::Arc;

use super::background::BackgroundQueue;
use crate::ffpipe_core::blob::BlobStore;

/// Remove scratch files left behind by an executor run.
pub(crate) fn remove_local_files(queue: &BackgroundQueue, paths: Vec<PathBuf>) {
    queue.push("remove-local-files", async move {
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    });
}

/// Remove a scratch directory tree (DASH bundles, segment workdirs).
pub(crate) fn remove_local_dir(queue: &BackgroundQueue, dir: PathBuf) {
    queue.push("remove-local-dir", async move {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    });
}

/// Delete a superseded object, e.g. the old key after a replace commit.
pub(crate) fn delete_remote(queue: &BackgroundQueue, blob: Arc<dyn BlobStore>, key: String) {
    queue.push("delete-remote", async move { blob.delete(&key).await });
}

/// Delete a whole artifact prefix (`{file_id}/dash/` and friends).
pub(crate) fn delete_remote_prefix(
    queue: &BackgroundQueue,
    blob: Arc<dyn BlobStore>,
    prefix: String,
) {
    queue.push("delete-remote-prefix", async move {
        blob.delete_prefix(&prefix).await
    });
}
