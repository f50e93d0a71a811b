//! Object-storage adapter.
//!
//! The engine only ever needs four verbs against the blob namespace, plus a
//! best-effort prefix sweep for bundle artifacts. Originals and intermediates
//! stay private; DASH/ASR/vision bundles are published world-readable.

use std::path::Path;

use async_trait::async_trait;

use crate::ffpipe_core::error::Result;

mod local;
mod s3;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

/// Access policy attached to an uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobAcl {
    Private,
    PublicRead,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download the object at `key` into `dest`, creating parent directories.
    async fn get_to_disk(&self, key: &str, dest: &Path) -> Result<()>;

    /// Upload `src` under `key`, overwriting any existing object. Overwrite
    /// semantics keep crash-recovery re-runs idempotent.
    async fn put_from_disk(&self, key: &str, src: &Path, acl: BlobAcl) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove every object under `prefix`. Used when a file and its bundle
    /// artifacts are deleted; failures are surfaced to the caller, which
    /// treats them as best-effort.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}
