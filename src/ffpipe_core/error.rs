use thiserror::Error;

/// Error taxonomy shared by the store, blob adapter, and engine.
///
/// The HTTP adapter maps these onto status codes; the scheduler records the
/// rendered message into the failing task row before cascading.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Request-shape or codec/container validation failure. Tasks are never
    /// created for these.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Operation-specific requirement not met by the actual media (e.g.
    /// extracting audio from a file with no audio stream).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// ffmpeg exited non-zero or was killed on timeout. Carries the stderr
    /// tail verbatim so the task row keeps the actual diagnostic.
    #[error("process failed: {0}")]
    ProcessFailed(String),

    /// ffprobe failed on an output we just produced. Non-fatal inside the
    /// executor: the file row still moves to the new path/name.
    #[error("metadata probe failed: {0}")]
    MetadataProbe(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable tag, used in logs and task error prefixes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid-argument",
            Self::NotFound(_) => "not-found",
            Self::PreconditionFailed(_) => "precondition-failed",
            Self::DownloadFailed(_) => "download-failed",
            Self::UploadFailed(_) => "upload-failed",
            Self::ProcessFailed(_) => "process-failed",
            Self::MetadataProbe(_) => "metadata-probe-failed",
            Self::Store(_) => "store-error",
            Self::Serialization(_) => "serialization-error",
            Self::Io(_) => "io-error",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
