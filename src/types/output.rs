//! Per-frame and per-session output structures

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{StepStatus, DangerousPair};

/// Language-qualified audio reference.
///
/// The engine only pairs a cue with a language; turning that into a
/// playable location is up to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub language: String,
    pub cue: String,
}

impl AudioRef {
    pub fn new(language: impl Into<String>, cue: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            cue: cue.into(),
        }
    }
}

/// Snapshot of the current step for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub current_step: usize,
    pub total_steps: usize,
    pub step_name: String,
    /// Hint while active, transition text otherwise
    pub hint: String,
    pub required_objects: Vec<String>,
    pub detected_required: Vec<String>,
    pub missing_objects: Vec<String>,
    /// 0-100, one decimal
    pub progress: f64,
    /// Seconds on the current step, one decimal
    pub time_on_step: f64,
    /// Seconds since session start, one decimal
    pub elapsed_total: f64,
    pub completed: bool,
    pub step_status: StepStatus,
}

/// Proximity alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub severity: String,
    pub message: String,
    pub pair: DangerousPair,
    pub distance_px: f64,
    pub threshold_px: f64,
    /// Cue key to play with the alert
    pub cue: String,
}

/// Everything the caller needs after one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub timestamp: DateTime<Utc>,
    pub step_info: StepInfo,
    pub safety_alert: Option<SafetyAlert>,
    /// True only on the frame that advances or completes
    pub step_advance: bool,
    /// Step cue key, language independent
    pub audio_to_play: Option<String>,
    /// `audio_to_play` paired with the resolved language
    pub audio: Option<AudioRef>,
    pub experiment_complete: bool,
}

impl FrameResult {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let status = self.step_info.step_status;
        format!(
            "{}{} {}{}",
            status.color_code(),
            status.emoji(),
            self.to_parseable_string(),
            StepStatus::color_reset()
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        let mut line = format!(
            "step={}/{} | status={} | progress={:.1}% | missing=[{}]",
            self.step_info.current_step,
            self.step_info.total_steps,
            self.step_info.step_status,
            self.step_info.progress,
            self.step_info.missing_objects.join(","),
        );
        if let Some(cue) = &self.audio_to_play {
            line.push_str(&format!(" | cue={}", cue));
        }
        if self.step_advance {
            line.push_str(" | ADVANCE");
        }
        if let Some(alert) = &self.safety_alert {
            line.push_str(&format!(
                " | ALERT {}~{} {:.1}px",
                alert.pair.0, alert.pair.1, alert.distance_px
            ));
        }
        line
    }
}

/// Read-only session view for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    pub experiment_name: String,
    pub total_steps: usize,
    pub current_step: usize,
    pub step_info: StepInfo,
    pub completed: bool,
}

/// Session counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub current_step: usize,
    pub total_steps: usize,
    pub completed: bool,
    pub frames_processed: u64,
    pub step_advances: u64,
    pub safety_alerts: u64,
    pub elapsed_total: f64,
}

/// Round to one decimal, as every reported number is
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
