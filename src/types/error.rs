//! Catalog load errors

use crate::types::TextKind;

/// Why a catalog was rejected. Always fatal: no session starts from it.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog has no steps")]
    NoSteps,

    #[error("catalog declares {declared} steps but defines {actual}")]
    StepCountMismatch { declared: usize, actual: usize },

    #[error("default language {0:?} is not in the language list")]
    UnknownDefaultLanguage(String),

    #[error("step {step} has no name")]
    MissingName { step: usize },

    #[error("step {step} has no {kind} text for default language {language:?}")]
    MissingText {
        step: usize,
        kind: TextKind,
        language: String,
    },

    #[error("step {step} has an empty {cue} cue")]
    MissingCue { step: usize, cue: &'static str },

    #[error("step {step} has an invalid required object {label:?}")]
    InvalidRequiredObject { step: usize, label: String },

    #[error("invalid safety rules: {0}")]
    InvalidSafetyRules(String),
}
