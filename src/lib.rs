//! VocalLab: step guidance engine for camera-assisted lab experiments
//!
//! Frames of detector output → label mapping → safety monitor → step tracker
//! → per-frame result for the student app and the teacher dashboard.

pub mod core;
pub mod types;

// =============================================================================
// DEBOUNCE THRESHOLDS [C]
// =============================================================================

/// Consecutive frames with every required object present before a step
/// counts as done. 3 keeps single-frame detector flicker out while staying
/// responsive for a live demo.
pub const STABLE_FRAMES_REQUIRED: u32 = 3;

/// Consecutive frames with at least one required object gone before a
/// finished step hands over to the next one.
pub const REMOVAL_FRAMES_REQUIRED: u32 = 2;

// =============================================================================
// SAFETY DEFAULTS [C] - used when the catalog omits them
// =============================================================================

/// Default proximity threshold in detector pixels
pub const DEFAULT_PROXIMITY_THRESHOLD: f64 = 150.0;

/// Default seconds between two safety alerts
pub const DEFAULT_ALERT_COOLDOWN_SECS: f64 = 3.0;

/// Cue key played with every proximity alert
pub const SAFETY_ALERT_CUE: &str = "error_hand_proximity";

// =============================================================================
// LANGUAGE
// =============================================================================

/// Fallback language when a catalog does not declare one
pub const DEFAULT_LANGUAGE: &str = "en";

/// Display name of the terminal snapshot
pub const COMPLETE_STEP_NAME: &str = "Experiment Complete!";

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "2.0.0";
