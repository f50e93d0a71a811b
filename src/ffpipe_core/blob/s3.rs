use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tokio::io::AsyncWriteExt;

use super::{BlobAcl, BlobStore};
use crate::ffpipe_core::config::S3Config;
use crate::ffpipe_core::domain::formats::{ext_of, mime_for_ext};
use crate::ffpipe_core::error::{PipelineError, Result};

pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            // S3-compatible stores (MinIO etc.) need path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }
}

fn content_type_for(key: &str) -> &'static str {
    ext_of(key).map(|e| mime_for_ext(&e)).unwrap_or("application/octet-stream")
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get_to_disk(&self, key: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| PipelineError::DownloadFailed(format!("get {key}: {err}")))?;

        let mut body = output.body;
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| PipelineError::DownloadFailed(format!("read {key}: {err}")))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn put_from_disk(&self, key: &str, src: &Path, acl: BlobAcl) -> Result<()> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|err| PipelineError::UploadFailed(format!("open {}: {err}", src.display())))?;
        let acl = match acl {
            BlobAcl::Private => ObjectCannedAcl::Private,
            BlobAcl::PublicRead => ObjectCannedAcl::PublicRead,
        };
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(acl)
            .content_type(content_type_for(key))
            .body(body)
            .send()
            .await
            .map_err(|err| PipelineError::UploadFailed(format!("put {key}: {err}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                PipelineError::Io(std::io::Error::other(format!("delete {key}: {err}")))
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(PipelineError::Io(std::io::Error::other(format!(
                        "head {key}: {err}"
                    ))))
                }
            }
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| {
                PipelineError::Io(std::io::Error::other(format!("list {prefix}: {err}")))
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    self.delete(key).await?;
                }
            }
        }
        Ok(())
    }
}
