//! Step status definitions

use serde::{Deserialize, Serialize};

/// The three states a step tracker can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Waiting for the current step's objects to be stable
    Active,
    /// Step done, waiting for its objects to leave the frame
    Transition,
    /// Final step done, terminal
    Completed,
}

impl StepStatus {
    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            StepStatus::Active => "\x1b[33m",     // Yellow
            StepStatus::Transition => "\x1b[36m", // Cyan
            StepStatus::Completed => "\x1b[32m",  // Green
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    /// Get emoji for status
    pub fn emoji(&self) -> &'static str {
        match self {
            StepStatus::Active => "🧪",
            StepStatus::Transition => "➡️",
            StepStatus::Completed => "🎉",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepStatus::Active => "ACTIVE",
            StepStatus::Transition => "TRANSITION",
            StepStatus::Completed => "COMPLETED",
        };
        write!(f, "{}", name)
    }
}
