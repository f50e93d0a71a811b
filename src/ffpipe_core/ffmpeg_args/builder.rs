use std::path::Path;

use super::compat::{added_audio_codec_args, validate_mux};
use crate::ffpipe_core::domain::{AudioCodec, AudioFormat, VideoCodec, VideoFormat};
use crate::ffpipe_core::error::Result;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Container remux / re-encode. The codec pair is validated against the
/// target container before anything is spawned.
pub fn transcode(
    input: &Path,
    output: &Path,
    format: VideoFormat,
    video_codec: Option<VideoCodec>,
    audio_codec: Option<AudioCodec>,
) -> Result<Vec<String>> {
    validate_mux(format, video_codec, audio_codec)?;

    let mut args: Vec<String> = Vec::new();
    args.push("-i".to_string());
    args.push(path_arg(input));
    if let Some(codec) = video_codec {
        args.push("-c:v".to_string());
        args.push(codec.name().to_string());
    }
    if let Some(codec) = audio_codec {
        args.push("-c:a".to_string());
        args.push(codec.name().to_string());
    }
    args.push(path_arg(output));
    Ok(args)
}

pub fn resize_video(input: &Path, output: &Path, width: u32, height: u32) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-vf".to_string(),
        format!("scale={width}:{height}"),
        path_arg(output),
    ]
}

/// Keyframe-aligned trims stream-copy; `exact` pays for a re-encode to cut
/// on the requested frame.
pub fn trim(input: &Path, output: &Path, start: f64, duration: f64, exact: bool) -> Vec<String> {
    let mut args = vec![
        "-ss".to_string(),
        format!("{start}"),
        "-i".to_string(),
        path_arg(input),
        "-t".to_string(),
        format!("{duration}"),
    ];
    if exact {
        args.push("-c:v".to_string());
        args.push("libx264".to_string());
        args.push("-c:a".to_string());
        args.push("aac".to_string());
    } else {
        args.push("-c".to_string());
        args.push("copy".to_string());
    }
    args.push(path_arg(output));
    args
}

/// Drop the tail of the media, keeping the first `keep_duration` seconds.
pub fn trim_end(input: &Path, output: &Path, keep_duration: f64) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-t".to_string(),
        format!("{keep_duration}"),
        "-c".to_string(),
        "copy".to_string(),
        path_arg(output),
    ]
}

pub fn extract_audio(input: &Path, output: &Path, format: AudioFormat) -> Vec<String> {
    let mut args = vec!["-i".to_string(), path_arg(input), "-vn".to_string()];
    match format {
        AudioFormat::Mp3 => {
            args.extend(["-c:a", "libmp3lame", "-q:a", "2"].map(str::to_string));
        }
        AudioFormat::Aac | AudioFormat::M4a => {
            args.extend(["-c:a", "aac", "-b:a", "192k"].map(str::to_string));
        }
        AudioFormat::Wav => {
            args.extend(["-c:a", "pcm_s16le"].map(str::to_string));
        }
        AudioFormat::Flac => {
            args.extend(["-c:a", "flac"].map(str::to_string));
        }
        AudioFormat::Opus => {
            args.extend(["-c:a", "libopus", "-b:a", "128k"].map(str::to_string));
        }
    }
    args.push(path_arg(output));
    args
}

pub fn remove_audio(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-an".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        path_arg(output),
    ]
}

/// Mux a separate audio track into a video, replacing whatever audio the
/// video carried. `-shortest` keeps the output bounded by the shorter input.
pub fn add_audio(
    video: &Path,
    audio: &Path,
    output: &Path,
    container: VideoFormat,
    source_audio_codec: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        path_arg(video),
        "-i".to_string(),
        path_arg(audio),
        "-c:v".to_string(),
        "copy".to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-shortest".to_string(),
    ];
    args.extend(added_audio_codec_args(container, source_audio_codec));
    args.push(path_arg(output));
    args
}

/// Concatenate inputs, letterboxing everything to the first input's
/// resolution so the concat filter sees uniform frames.
pub fn merge_media(inputs: &[std::path::PathBuf], output: &Path, width: u32, height: u32) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    for input in inputs {
        args.push("-i".to_string());
        args.push(path_arg(input));
    }

    let mut filter = String::new();
    for index in 0..inputs.len() {
        filter.push_str(&format!(
            "[{index}:v:0]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{index}];"
        ));
    }
    for index in 0..inputs.len() {
        filter.push_str(&format!("[v{index}][{index}:a:0]"));
    }
    filter.push_str(&format!(
        "concat=n={}:v=1:a=1[outv][outa]",
        inputs.len()
    ));

    args.push("-filter_complex".to_string());
    args.push(filter);
    args.extend(
        [
            "-map", "[outv]", "-map", "[outa]", "-c:v", "libx264", "-preset", "fast", "-crf",
            "22", "-c:a", "aac", "-b:a", "192k",
        ]
        .map(str::to_string),
    );
    args.push(path_arg(output));
    args
}

pub fn extract_thumbnail(input: &Path, output: &Path, timestamp: &str) -> Vec<String> {
    vec![
        "-ss".to_string(),
        timestamp.to_string(),
        "-i".to_string(),
        path_arg(input),
        "-vframes".to_string(),
        "1".to_string(),
        "-update".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        path_arg(output),
    ]
}

/// DASH package into `manifest`'s directory: 4-second templated segments
/// with separate audio/video adaptation sets.
pub fn dash(input: &Path, manifest: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-f".to_string(),
        "dash".to_string(),
        "-seg_duration".to_string(),
        "4".to_string(),
        "-use_timeline".to_string(),
        "1".to_string(),
        "-use_template".to_string(),
        "1".to_string(),
        "-adaptation_sets".to_string(),
        "id=0,streams=v id=1,streams=a".to_string(),
        path_arg(manifest),
    ]
}

/// Loudness-normalized 16 kHz mono WAV, the shape speech models expect.
pub fn asr_normalize(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        "16000".to_string(),
        "-af".to_string(),
        "loudnorm=I=-16:TP=-1.5:LRA=11".to_string(),
        path_arg(output),
    ]
}

/// Silence scan. Decodes to the null muxer; the events land on stderr.
pub fn silence_detect(input: &Path, threshold: &str, min_silence: f64) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-af".to_string(),
        format!("silencedetect=n={threshold}:d={min_silence}"),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ]
}

/// Scene-change scan; `showinfo` prints a pts line per selected frame.
pub fn scene_detect(input: &Path, threshold: f64) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-vf".to_string(),
        format!("select='gt(scene,{threshold})',showinfo"),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ]
}

/// One stream-copied cut, shared by the ASR and scene segmenters.
pub fn copy_segment(input: &Path, output: &Path, start: f64, duration: f64) -> Vec<String> {
    vec![
        "-ss".to_string(),
        format!("{start}"),
        "-i".to_string(),
        path_arg(input),
        "-t".to_string(),
        format!("{duration}"),
        "-c".to_string(),
        "copy".to_string(),
        path_arg(output),
    ]
}
