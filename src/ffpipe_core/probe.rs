//! ffprobe wrapper.
//!
//! One JSON invocation per probe; the raw stream/format shapes are parsed
//! into [`MediaMetadata`] so the rest of the service never touches ffprobe
//! output directly.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;

use crate::ffpipe_core::domain::MediaMetadata;
use crate::ffpipe_core::error::{PipelineError, Result};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

const IMAGE_CODECS: &[&str] = &[
    "mjpeg", "png", "webp", "gif", "bmp", "tiff", "avif", "svg",
];

/// Probe a local file into structured metadata.
pub async fn probe_media(ffprobe_path: &Path, input: &Path) -> Result<MediaMetadata> {
    let output = Command::new(ffprobe_path)
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(input.as_os_str())
        .output()
        .await
        .map_err(|err| {
            PipelineError::MetadataProbe(format!(
                "failed to run ffprobe on {}: {err}",
                input.display()
            ))
        })?;

    if !output.status.success() {
        return Err(PipelineError::MetadataProbe(format!(
            "ffprobe failed for {}: {}",
            input.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout).map_err(|err| {
        PipelineError::MetadataProbe(format!("unparseable ffprobe output: {err}"))
    })?;
    Ok(metadata_from_probe(&parsed))
}

/// Container duration in seconds. Used where only the timeline length
/// matters (trim-end, chunk planning).
pub async fn probe_duration(ffprobe_path: &Path, input: &Path) -> Result<f64> {
    let output = Command::new(ffprobe_path)
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=nw=1:nk=1")
        .arg(input.as_os_str())
        .output()
        .await
        .map_err(|err| {
            PipelineError::MetadataProbe(format!(
                "failed to run ffprobe for duration on {}: {err}",
                input.display()
            ))
        })?;

    if !output.status.success() {
        return Err(PipelineError::MetadataProbe(format!(
            "ffprobe failed for {}: {}",
            input.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().unwrap_or_default().trim();
    first.parse().map_err(|_| {
        PipelineError::MetadataProbe(format!(
            "ffprobe returned no duration for {} ({first:?})",
            input.display()
        ))
    })
}

fn metadata_from_probe(parsed: &ProbeOutput) -> MediaMetadata {
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_seconds = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    let size_bytes = parsed
        .format
        .as_ref()
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok());
    let format_name = parsed
        .format
        .as_ref()
        .and_then(|f| f.format_name.clone())
        .unwrap_or_default();

    if let Some(video) = video {
        let codec = video.codec_name.clone().unwrap_or_default();
        let looks_like_image = audio.is_none()
            && (IMAGE_CODECS.contains(&codec.as_str())
                || format_name.contains("image2")
                || format_name.ends_with("_pipe"));
        if looks_like_image {
            return MediaMetadata::Image {
                width: video.width,
                height: video.height,
                format: video.codec_name.clone(),
                size_bytes,
            };
        }
        return MediaMetadata::Video {
            duration_seconds,
            width: video.width,
            height: video.height,
            frame_rate: video.r_frame_rate.as_deref().and_then(parse_frame_rate),
            video_codec: video.codec_name.clone(),
            audio_codec: audio.and_then(|a| a.codec_name.clone()),
            has_audio: audio.is_some(),
            size_bytes,
        };
    }

    if let Some(audio) = audio {
        return MediaMetadata::Audio {
            duration_seconds,
            codec: audio.codec_name.clone(),
            sample_rate: audio.sample_rate.as_deref().and_then(|s| s.parse().ok()),
            channels: audio.channels,
            size_bytes,
        };
    }

    // No recognizable stream at all. Report it as an opaque image-shaped
    // record so callers still get the container size.
    MediaMetadata::Image {
        width: None,
        height: None,
        format: if format_name.is_empty() {
            None
        } else {
            Some(format_name)
        },
        size_bytes,
    }
}

// ffprobe reports frame rates as rationals like "30000/1001" or "25/1".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 { None } else { Some(num / den) }
        }
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_probe_parses_streams_and_format() {
        let raw = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280,
                 "height": 720, "r_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac",
                 "sample_rate": "48000", "channels": 2}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                       "duration": "30.033333", "size": "1048576"}
        }"#;
        let parsed: ProbeOutput = serde_json::from_str(raw).unwrap();
        let meta = metadata_from_probe(&parsed);
        let MediaMetadata::Video {
            duration_seconds,
            width,
            height,
            frame_rate,
            video_codec,
            audio_codec,
            has_audio,
            size_bytes,
        } = meta
        else {
            panic!("expected video metadata");
        };
        assert_eq!(width, Some(1280));
        assert_eq!(height, Some(720));
        assert!((duration_seconds.unwrap() - 30.033333).abs() < 1e-6);
        assert!((frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(video_codec.as_deref(), Some("h264"));
        assert_eq!(audio_codec.as_deref(), Some("aac"));
        assert!(has_audio);
        assert_eq!(size_bytes, Some(1048576));
    }

    #[test]
    fn audio_only_probe_is_audio_metadata() {
        let raw = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "mp3",
                 "sample_rate": "44100", "channels": 2}
            ],
            "format": {"format_name": "mp3", "duration": "180.5", "size": "2000000"}
        }"#;
        let parsed: ProbeOutput = serde_json::from_str(raw).unwrap();
        let meta = metadata_from_probe(&parsed);
        assert!(matches!(meta, MediaMetadata::Audio { .. }));
        assert!(!meta.has_video());
        assert!(meta.has_audio());
    }

    #[test]
    fn still_image_is_not_mistaken_for_video() {
        let raw = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "mjpeg",
                 "width": 640, "height": 480}
            ],
            "format": {"format_name": "image2", "size": "52000"}
        }"#;
        let parsed: ProbeOutput = serde_json::from_str(raw).unwrap();
        let meta = metadata_from_probe(&parsed);
        let MediaMetadata::Image { width, height, .. } = meta else {
            panic!("expected image metadata");
        };
        assert_eq!(width, Some(640));
        assert_eq!(height, Some(480));
    }
}
