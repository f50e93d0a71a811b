use serde::{Deserialize, Serialize};

use super::formats::{AudioCodec, AudioFormat, ImageFormat, VideoCodec, VideoFormat};

/// What a completed operation does to the file identity: `replace` rewrites
/// the owning file in place, `append` forks a new file and leaves the source
/// untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Append,
    Replace,
}

/// One media operation with its typed parameters, tagged the way it appears
/// on the wire and in the task `args` column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    Transcode {
        format: VideoFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_codec: Option<VideoCodec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_codec: Option<AudioCodec>,
    },
    ResizeVideo {
        width: u32,
        height: u32,
    },
    Trim {
        start: f64,
        duration: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_format: Option<VideoFormat>,
        /// Frame-accurate trims re-encode; the default stream-copies on
        /// keyframe boundaries.
        #[serde(default)]
        exact: bool,
    },
    TrimEnd {
        /// Seconds cut from the end of the media.
        duration: f64,
    },
    ExtractAudio {
        audio_format: AudioFormat,
    },
    RemoveAudio {},
    AddAudio {
        audio_file_id: String,
    },
    MergeMedia {
        file_ids: Vec<String>,
        output_format: VideoFormat,
    },
    ExtractThumbnail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_format: Option<ImageFormat>,
    },
    Dash {},
    AsrNormalize {},
    AsrAnalyze {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        silence_threshold: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_silence_duration: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_chunk: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_chunk: Option<f64>,
    },
    AsrSegment {},
    VisionAnalyze {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scene_threshold: Option<f64>,
    },
    VisionSegment {},
}

/// Discriminant-only view of [`Operation`], stored in the `operation` column
/// and used for dispatch without deserializing the full args.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Transcode,
    ResizeVideo,
    Trim,
    TrimEnd,
    ExtractAudio,
    RemoveAudio,
    AddAudio,
    MergeMedia,
    ExtractThumbnail,
    Dash,
    AsrNormalize,
    AsrAnalyze,
    AsrSegment,
    VisionAnalyze,
    VisionSegment,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcode => "transcode",
            Self::ResizeVideo => "resize-video",
            Self::Trim => "trim",
            Self::TrimEnd => "trim-end",
            Self::ExtractAudio => "extract-audio",
            Self::RemoveAudio => "remove-audio",
            Self::AddAudio => "add-audio",
            Self::MergeMedia => "merge-media",
            Self::ExtractThumbnail => "extract-thumbnail",
            Self::Dash => "dash",
            Self::AsrNormalize => "asr-normalize",
            Self::AsrAnalyze => "asr-analyze",
            Self::AsrSegment => "asr-segment",
            Self::VisionAnalyze => "vision-analyze",
            Self::VisionSegment => "vision-segment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
    }

    /// Bundle operations publish artifacts under a `{file_id}/...` prefix and
    /// never rewrite or fork the file row.
    pub fn is_bundle(self) -> bool {
        matches!(
            self,
            Self::Dash
                | Self::AsrNormalize
                | Self::AsrAnalyze
                | Self::AsrSegment
                | Self::VisionAnalyze
                | Self::VisionSegment
        )
    }

    /// Mode applied when a request does not say. Operations that combine
    /// several sources fork by default; everything else rewrites in place.
    pub fn default_mode(self) -> TaskMode {
        match self {
            Self::AddAudio | Self::MergeMedia => TaskMode::Append,
            _ => TaskMode::Replace,
        }
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Transcode { .. } => OperationKind::Transcode,
            Self::ResizeVideo { .. } => OperationKind::ResizeVideo,
            Self::Trim { .. } => OperationKind::Trim,
            Self::TrimEnd { .. } => OperationKind::TrimEnd,
            Self::ExtractAudio { .. } => OperationKind::ExtractAudio,
            Self::RemoveAudio {} => OperationKind::RemoveAudio,
            Self::AddAudio { .. } => OperationKind::AddAudio,
            Self::MergeMedia { .. } => OperationKind::MergeMedia,
            Self::ExtractThumbnail { .. } => OperationKind::ExtractThumbnail,
            Self::Dash {} => OperationKind::Dash,
            Self::AsrNormalize {} => OperationKind::AsrNormalize,
            Self::AsrAnalyze { .. } => OperationKind::AsrAnalyze,
            Self::AsrSegment {} => OperationKind::AsrSegment,
            Self::VisionAnalyze { .. } => OperationKind::VisionAnalyze,
            Self::VisionSegment {} => OperationKind::VisionSegment,
        }
    }
}

/// Full serialized payload of a task's `args` column: the operation plus the
/// planner-managed mode and parent linkage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    #[serde(flatten)]
    pub op: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TaskMode>,
    /// Id of the file produced by the previous append-mode task in a chain.
    /// When set, the executor resolves the primary input from this id instead
    /// of the task's `file_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl TaskSpec {
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            mode: None,
            parent: None,
        }
    }

    pub fn resolved_mode(&self) -> TaskMode {
        self.mode.unwrap_or_else(|| self.op.kind().default_mode())
    }
}
