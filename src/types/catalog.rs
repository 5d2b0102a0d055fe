//! Step catalog definitions
//!
//! A catalog is read once, validated, and then shared read-only between
//! every session of the process.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::{DEFAULT_ALERT_COOLDOWN_SECS, DEFAULT_LANGUAGE, DEFAULT_PROXIMITY_THRESHOLD};

/// Which localized text of a step to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    /// Shown while the student is working on the step
    Hint,
    /// Shown once the step is done and its objects should be cleared away
    Transition,
}

impl std::fmt::Display for TextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextKind::Hint => write!(f, "hint"),
            TextKind::Transition => write!(f, "transition"),
        }
    }
}

/// One experiment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 0-based position, assigned by the loader
    #[serde(default)]
    pub id: usize,
    pub name: String,
    /// Every label here must be visible in the same frame
    #[serde(default)]
    pub required_objects: Vec<String>,
    /// Language code → hint text
    #[serde(default)]
    pub hint: BTreeMap<String, String>,
    /// Language code → transition text
    #[serde(default)]
    pub transition: BTreeMap<String, String>,
    pub audio_intro: String,
    pub audio_transition: String,
    pub audio_complete: String,
}

/// Two labels that must not come close to each other.
/// Order only affects the alert message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerousPair(pub String, pub String);

impl DangerousPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self(a.into(), b.into())
    }
}

/// Global proximity rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRules {
    #[serde(default = "default_proximity_threshold")]
    pub proximity_threshold: f64,
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_seconds: f64,
    #[serde(default)]
    pub dangerous_pairs: Vec<DangerousPair>,
}

fn default_proximity_threshold() -> f64 {
    DEFAULT_PROXIMITY_THRESHOLD
}

fn default_alert_cooldown() -> f64 {
    DEFAULT_ALERT_COOLDOWN_SECS
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self {
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            alert_cooldown_seconds: DEFAULT_ALERT_COOLDOWN_SECS,
            dangerous_pairs: Vec::new(),
        }
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// The full experiment definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Experiment display name
    pub name: String,
    /// Declared step count, checked against `steps`
    pub total_steps: usize,
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Languages the catalog carries text and audio for
    #[serde(default)]
    pub languages: Vec<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub safety_rules: SafetyRules,
    /// SHA-256 of the source document, set by the loader
    #[serde(skip)]
    pub fingerprint: String,
}

impl Catalog {
    /// Step at `index`, if any
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Is `index` the last step?
    pub fn is_final(&self, index: usize) -> bool {
        index + 1 == self.steps.len()
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }
}
