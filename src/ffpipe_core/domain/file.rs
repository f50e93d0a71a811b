use serde::{Deserialize, Serialize};

/// Structured probe result for a stored object. The variant decides the shape
/// `/meta/{id}` returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaMetadata {
    #[serde(rename_all = "camelCase")]
    Video {
        duration_seconds: Option<f64>,
        width: Option<u32>,
        height: Option<u32>,
        frame_rate: Option<f64>,
        video_codec: Option<String>,
        audio_codec: Option<String>,
        has_audio: bool,
        size_bytes: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        duration_seconds: Option<f64>,
        codec: Option<String>,
        sample_rate: Option<u32>,
        channels: Option<u32>,
        size_bytes: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        width: Option<u32>,
        height: Option<u32>,
        format: Option<String>,
        size_bytes: Option<u64>,
    },
}

impl MediaMetadata {
    pub fn has_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }

    pub fn has_audio(&self) -> bool {
        match self {
            Self::Video { has_audio, .. } => *has_audio,
            Self::Audio { .. } => true,
            Self::Image { .. } => false,
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match self {
            Self::Video {
                duration_seconds, ..
            }
            | Self::Audio {
                duration_seconds, ..
            } => *duration_seconds,
            Self::Image { .. } => None,
        }
    }

    /// Codec of the audio stream, when one exists.
    pub fn audio_codec(&self) -> Option<&str> {
        match self {
            Self::Video { audio_codec, .. } => audio_codec.as_deref(),
            Self::Audio { codec, .. } => codec.as_deref(),
            Self::Image { .. } => None,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Video { width, height, .. } | Self::Image { width, height, .. } => {
                width.zip(*height)
            }
            Self::Audio { .. } => None,
        }
    }
}

/// One user-visible media artifact. `file_path` is the current object key and
/// is rewritten when a replace-mode operation completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: String,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub metadata: Option<MediaMetadata>,
}
