use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{BlobAcl, BlobStore};
use crate::ffpipe_core::error::{PipelineError, Result};

/// Directory-backed blob store for local development and tests. Keys map
/// directly to relative paths under the root; ACLs are ignored.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(PipelineError::InvalidArgument(format!(
                "malformed blob key {key:?}"
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get_to_disk(&self, key: &str, dest: &Path) -> Result<()> {
        let src = self.resolve(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|err| PipelineError::DownloadFailed(format!("get {key}: {err}")))?;
        Ok(())
    }

    async fn put_from_disk(&self, key: &str, src: &Path, _acl: BlobAcl) -> Result<()> {
        let dest = self.resolve(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, &dest)
            .await
            .map_err(|err| PipelineError::UploadFailed(format!("put {key}: {err}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let trimmed = prefix.trim_end_matches('/');
        let path = self.resolve(trimmed)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
