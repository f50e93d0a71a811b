use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ffpipe_core::error::{PipelineError, Result};

/// Hard cap on multipart uploads. Requests beyond this return 413.
pub const MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

/// Wall-clock limit for a single ffmpeg invocation.
pub const TASK_TIMEOUT_SECS: u64 = 15 * 60;

/// Which blob backend the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    S3,
    Local,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Custom endpoint for S3-compatible stores (MinIO etc.). None uses the
    /// region's default endpoint.
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub max_concurrent_tasks: usize,
    pub database_url: String,
    pub blob_backend: BlobBackend,
    pub s3: Option<S3Config>,
    pub blob_local_root: Option<PathBuf>,
    /// Scratch directory for executor inputs/outputs. Wiped on startup.
    pub temp_dir: PathBuf,
    /// Separate scratch directory for on-demand probing so `/meta` downloads
    /// never collide with executor basenames. Wiped on startup.
    pub meta_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Build from process env (after an optional `.env` load).
    pub fn from_env() -> Result<Self> {
        let max_concurrent_tasks = env_parse("MAX_CONCURRENT_TASKS", 2usize)?;
        if max_concurrent_tasks == 0 {
            return Err(PipelineError::InvalidArgument(
                "MAX_CONCURRENT_TASKS must be at least 1".into(),
            ));
        }

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://ffpipe.db".to_string());

        let blob_backend = match env::var("BLOB_BACKEND").as_deref() {
            Ok("local") => BlobBackend::Local,
            Ok("s3") | Err(_) => BlobBackend::S3,
            Ok(other) => {
                return Err(PipelineError::InvalidArgument(format!(
                    "unknown BLOB_BACKEND {other:?} (expected \"s3\" or \"local\")"
                )));
            }
        };

        let s3 = match blob_backend {
            BlobBackend::S3 => {
                let bucket = env::var("S3_BUCKET").map_err(|_| {
                    PipelineError::InvalidArgument("S3_BUCKET is required for the s3 backend".into())
                })?;
                Some(S3Config {
                    bucket,
                    endpoint: env::var("S3_ENDPOINT").ok(),
                    region: env::var("S3_REGION").ok(),
                })
            }
            BlobBackend::Local => None,
        };

        let blob_local_root = match blob_backend {
            BlobBackend::Local => Some(PathBuf::from(
                env::var("BLOB_LOCAL_ROOT").unwrap_or_else(|_| "./blobs".to_string()),
            )),
            BlobBackend::S3 => None,
        };

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_parse("PORT", 3000u16)?;
        let bind_addr: SocketAddr = format!("{host}:{port}").parse().map_err(|_| {
            PipelineError::InvalidArgument(format!("invalid HOST/PORT combination {host}:{port}"))
        })?;

        Ok(Self {
            max_concurrent_tasks,
            database_url,
            blob_backend,
            s3,
            blob_local_root,
            temp_dir: env_path("TEMP_DIR", "./tmp"),
            meta_dir: env_path("META_DIR", "./meta"),
            ffmpeg_path: env_path("FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: env_path("FFPROBE_PATH", "ffprobe"),
            bind_addr,
        })
    }
}

fn env_path(name: &str, default: &str) -> PathBuf {
    env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            PipelineError::InvalidArgument(format!("could not parse {name}={raw:?}"))
        }),
        Err(_) => Ok(default),
    }
}
