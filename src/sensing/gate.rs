use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use image::{imageops::FilterType, GrayImage};
use serde::Deserialize;

use super::frames::Frame;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Tunables for the local change detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Trailing window of frames considered per cycle.
    pub window_minutes: i64,
    /// Mean absolute grayscale difference (0-255) that counts as change.
    pub diff_threshold: f64,
    pub compare_width: u32,
    pub compare_height: u32,
    /// Maximum staleness before an inference is forced without visual change.
    pub force_refresh_minutes: i64,
    /// Camera sources compared by the gate.
    pub sources: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            window_minutes: 12,
            diff_threshold: 8.0,
            compare_width: 160,
            compare_height: 120,
            force_refresh_minutes: 30,
            sources: vec!["bedroom".into(), "living".into(), "door".into()],
        }
    }
}

/// Result of comparing the first and last frame of one source.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameDiff {
    Score(f64),
    DecodeError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    VisualChange,
    PeriodicForced,
    NoChange,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::VisualChange => "visual change",
            GateReason::PeriodicForced => "periodic forced",
            GateReason::NoChange => "no change",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub trigger: bool,
    pub reason: GateReason,
    /// Highest per-source score among sources that decoded.
    pub score: f64,
    pub decode_failed: bool,
    /// Minutes since the last inference, `None` if there never was one.
    pub minutes_since_inference: Option<f64>,
}

pub struct ChangeGate {
    config: GateConfig,
}

impl ChangeGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Compares oldest and newest frame of every source with at least two frames.
    pub fn measure(&self, frames: &BTreeMap<String, Vec<Frame>>) -> Vec<(String, FrameDiff)> {
        frames
            .iter()
            .filter(|(_, list)| list.len() >= 2)
            .map(|(source, list)| {
                let first = &list[0];
                let last = &list[list.len() - 1];
                let diff = self.frame_diff(&first.path, &last.path);
                if let FrameDiff::DecodeError(reason) = &diff {
                    log_warn!("{source}: could not decode frames for diff: {reason}");
                }
                (source.clone(), diff)
            })
            .collect()
    }

    pub fn frame_diff(&self, first: &Path, last: &Path) -> FrameDiff {
        let load = |path: &Path| -> Result<GrayImage, String> {
            let img = image::open(path).map_err(|err| format!("{}: {err}", path.display()))?;
            Ok(img
                .resize_exact(
                    self.config.compare_width,
                    self.config.compare_height,
                    FilterType::Triangle,
                )
                .to_luma8())
        };

        match (load(first), load(last)) {
            (Ok(a), Ok(b)) => FrameDiff::Score(mean_abs_diff(&a, &b)),
            (Err(err), _) | (_, Err(err)) => FrameDiff::DecodeError(err),
        }
    }

    /// Applies the gating rule to measured diffs and the last inference time.
    pub fn decide(
        &self,
        diffs: &[(String, FrameDiff)],
        last_inference_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let mut score: f64 = 0.0;
        let mut decode_failed = false;
        for (_, diff) in diffs {
            match diff {
                FrameDiff::Score(value) => score = score.max(*value),
                FrameDiff::DecodeError(_) => decode_failed = true,
            }
        }

        let minutes_since_inference =
            last_inference_at.map(|at| (now - at).num_milliseconds() as f64 / 60_000.0);
        let changed = decode_failed || score > self.config.diff_threshold;
        let stale = match minutes_since_inference {
            Some(minutes) => minutes >= self.config.force_refresh_minutes as f64,
            None => true,
        };

        let (trigger, reason) = if changed {
            (true, GateReason::VisualChange)
        } else if stale {
            (true, GateReason::PeriodicForced)
        } else {
            (false, GateReason::NoChange)
        };

        log_info!(
            "Gate score={score:.1} (threshold {}) decode_failed={decode_failed} since_last={} -> {}",
            self.config.diff_threshold,
            minutes_since_inference
                .map(|m| format!("{m:.0}min"))
                .unwrap_or_else(|| "never".into()),
            reason
        );

        GateDecision {
            trigger,
            reason,
            score,
            decode_failed,
            minutes_since_inference,
        }
    }

    pub fn evaluate(
        &self,
        frames: &BTreeMap<String, Vec<Frame>>,
        last_inference_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let diffs = self.measure(frames);
        self.decide(&diffs, last_inference_at, now)
    }
}

fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    let count = a.as_raw().len().min(b.as_raw().len());
    if count == 0 {
        return 0.0;
    }
    total as f64 / count as f64
}
