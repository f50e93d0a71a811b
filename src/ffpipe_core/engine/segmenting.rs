//! Silence- and scene-aware segmentation.
//!
//! ffmpeg reports both silencedetect and showinfo events on stderr; the
//! parsers here pull the timestamps out and the planners turn them into
//! bounded cut lists. Analysis results are persisted as JSON bundles so a
//! later segmenting task can run without re-scanning.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ffpipe_core::error::{PipelineError, Result};

/// Silence cuts inside this margin of either media edge are ignored, and no
/// tail shorter than it is emitted.
const EDGE_MARGIN_SECS: f64 = 5.0;

static SILENCE_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"silence_start:\s*(-?[0-9]+(?:\.[0-9]+)?)").unwrap());
static SHOWINFO_PTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pts_time:\s*([0-9]+(?:\.[0-9]+)?)").unwrap());
static SCENE_SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"scene:\s*([0-9]+(?:\.[0-9]+)?)").unwrap());

/// One planned cut, in seconds from the start of the media.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlannedSegment {
    pub index: usize,
    pub start: f64,
    pub duration: f64,
}

/// Analysis document uploaded by `asr-analyze` and consumed by `asr-segment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAnalysis {
    pub duration: f64,
    pub max_chunk: f64,
    pub min_chunk: f64,
    pub silence_starts: Vec<f64>,
    pub segments: Vec<PlannedSegment>,
}

/// Analysis document uploaded by `vision-analyze` and consumed by
/// `vision-segment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneAnalysis {
    pub duration: f64,
    pub threshold: f64,
    pub scene_times: Vec<f64>,
    /// Change scores as reported alongside the detections, when the build
    /// prints them. May be shorter than `scene_times`.
    #[serde(default)]
    pub scene_scores: Vec<f64>,
    pub segments: Vec<PlannedSegment>,
}

/// Manifest listing the uploaded segment objects of one bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentManifest {
    pub segments: Vec<SegmentManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentManifestEntry {
    pub index: usize,
    pub key: String,
    pub start: f64,
    pub duration: f64,
}

pub fn parse_silence_starts(stderr: &str) -> Vec<f64> {
    SILENCE_START_RE
        .captures_iter(stderr)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .filter(|t: &f64| t.is_finite() && *t >= 0.0)
        .collect()
}

pub fn parse_scene_times(stderr: &str) -> Vec<f64> {
    SHOWINFO_PTS_RE
        .captures_iter(stderr)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .filter(|t: &f64| t.is_finite())
        .collect()
}

pub fn parse_scene_scores(stderr: &str) -> Vec<f64> {
    SCENE_SCORE_RE
        .captures_iter(stderr)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .filter(|s: &f64| s.is_finite())
        .collect()
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Plan transcription chunks along silence boundaries.
///
/// Cut candidates are silence starts away from the media edges; the walk
/// emits a chunk whenever at least `min_chunk` seconds accumulated, capped at
/// `max_chunk`. Any remainder longer than the edge margin is emitted in
/// `max_chunk`-sized pieces, so only the final tail may run under
/// `min_chunk`.
pub fn plan_chunks(
    duration: f64,
    max_chunk: f64,
    min_chunk: f64,
    silence_starts: &[f64],
) -> Vec<PlannedSegment> {
    let mut cuts: Vec<f64> = silence_starts
        .iter()
        .copied()
        .filter(|&t| t > EDGE_MARGIN_SECS && t < duration - EDGE_MARGIN_SECS)
        .collect();
    cuts.push(0.0);
    cuts.push(duration);
    cuts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut segments = Vec::new();
    let mut start = 0.0;
    for &cut in &cuts {
        if cut - start >= min_chunk {
            let end = (start + max_chunk).min(cut);
            segments.push(PlannedSegment {
                index: segments.len(),
                start: round3(start),
                duration: round3(end - start),
            });
            start = end;
        }
    }
    while duration - start > EDGE_MARGIN_SECS {
        let end = (start + max_chunk).min(duration);
        segments.push(PlannedSegment {
            index: segments.len(),
            start: round3(start),
            duration: round3(end - start),
        });
        start = end;
    }
    segments
}

/// Turn detected scene-change times into contiguous spans bookended by the
/// media edges. Zero detections (nothing to segment) and runaway detection
/// counts are both rejected before any segmenting work is scheduled.
pub fn plan_scene_spans(duration: f64, scene_times: &[f64]) -> Result<Vec<PlannedSegment>> {
    let mut inner: Vec<f64> = scene_times
        .iter()
        .copied()
        .filter(|&t| t > 0.0 && t < duration)
        .collect();
    inner.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    inner.dedup_by(|a, b| (*a - *b).abs() < 1e-3);

    if inner.is_empty() {
        return Err(PipelineError::PreconditionFailed(
            "no scene changes detected".to_string(),
        ));
    }
    if inner.len() > 200 {
        return Err(PipelineError::PreconditionFailed(format!(
            "{} scene changes detected; refusing to segment more than 200",
            inner.len()
        )));
    }

    let mut bounds = Vec::with_capacity(inner.len() + 2);
    bounds.push(0.0);
    bounds.extend(inner);
    bounds.push(duration);

    let segments = bounds
        .windows(2)
        .filter(|w| w[1] - w[0] > 1e-3)
        .enumerate()
        .map(|(index, w)| PlannedSegment {
            index,
            start: round3(w[0]),
            duration: round3(w[1] - w[0]),
        })
        .collect();
    Ok(segments)
}
