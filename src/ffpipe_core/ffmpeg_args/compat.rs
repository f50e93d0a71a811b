use crate::ffpipe_core::domain::{AudioCodec, VideoCodec, VideoFormat};
use crate::ffpipe_core::error::{PipelineError, Result};

/// Video codecs each container can mux. Codec names match ffprobe output so
/// probed streams can be checked against the same table.
pub fn allowed_video_codecs(format: VideoFormat) -> &'static [&'static str] {
    match format {
        VideoFormat::Mp4 | VideoFormat::Mov => &["h264", "hevc", "mpeg4"],
        VideoFormat::Mkv => &["h264", "hevc", "vp9", "av1"],
        VideoFormat::Webm => &["vp8", "vp9", "av1"],
        VideoFormat::Avi => &["mpeg4", "msmpeg4", "libxvid"],
    }
}

pub fn allowed_audio_codecs(format: VideoFormat) -> &'static [&'static str] {
    match format {
        VideoFormat::Mp4 | VideoFormat::Mov => &["aac", "mp3"],
        VideoFormat::Mkv => &["aac", "mp3", "ac3", "opus", "flac"],
        VideoFormat::Webm => &["opus", "vorbis"],
        VideoFormat::Avi => &["mp3", "ac3"],
    }
}

/// Reject codec/container combinations ffmpeg would refuse to mux, before
/// any process is spawned. Matroska muxes nearly anything, so out-of-list
/// combinations there only log a warning.
pub fn validate_mux(
    format: VideoFormat,
    video_codec: Option<VideoCodec>,
    audio_codec: Option<AudioCodec>,
) -> Result<()> {
    let lenient = matches!(format, VideoFormat::Mkv);

    if let Some(codec) = video_codec
        && !allowed_video_codecs(format).contains(&codec.name())
    {
        if lenient {
            tracing::warn!(
                container = format.ext(),
                codec = codec.name(),
                "unusual video codec for container; muxing anyway"
            );
        } else {
            return Err(PipelineError::InvalidArgument(format!(
                "video codec {} cannot be muxed into {}",
                codec.name(),
                format.ext()
            )));
        }
    }

    if let Some(codec) = audio_codec
        && !allowed_audio_codecs(format).contains(&codec.name())
    {
        if lenient {
            tracing::warn!(
                container = format.ext(),
                codec = codec.name(),
                "unusual audio codec for container; muxing anyway"
            );
        } else {
            return Err(PipelineError::InvalidArgument(format!(
                "audio codec {} cannot be muxed into {}",
                codec.name(),
                format.ext()
            )));
        }
    }

    Ok(())
}

/// Audio codec arguments when muxing a separate audio track into a video
/// container: stream-copy when the source codec is already at home in the
/// container, otherwise re-encode to the container's default.
pub fn added_audio_codec_args(
    format: VideoFormat,
    source_audio_codec: Option<&str>,
) -> Vec<String> {
    let source = source_audio_codec.unwrap_or_default();
    let copy = match format {
        VideoFormat::Mp4 | VideoFormat::Mov => matches!(source, "aac" | "mp3"),
        VideoFormat::Webm => source == "opus",
        VideoFormat::Mkv => matches!(source, "aac" | "mp3" | "flac" | "opus"),
        // wav audio probes as pcm_*.
        VideoFormat::Avi => source == "mp3" || source.starts_with("pcm_"),
    };

    if copy {
        return vec!["-c:a".to_string(), "copy".to_string()];
    }
    match format {
        VideoFormat::Mp4 | VideoFormat::Mov | VideoFormat::Mkv => vec![
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
        ],
        VideoFormat::Webm => vec![
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ],
        VideoFormat::Avi => vec!["-c:a".to_string(), "mp3".to_string()],
    }
}
