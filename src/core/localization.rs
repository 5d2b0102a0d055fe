//! Localization: text and audio resolution per language
//!
//! Pure functions of (step, language, kind). No session state.

use crate::types::{AudioRef, Catalog, Step, TextKind};

/// Normalize a requested language code.
///
/// Trimmed and lowercased; unsupported or empty codes become `default`.
pub fn normalize_language(code: &str, supported: &[String], default: &str) -> String {
    let code = code.trim().to_lowercase();
    if !code.is_empty() && supported.iter().any(|s| *s == code) {
        code
    } else {
        default.to_string()
    }
}

/// Resolve a step text, falling back to the default language
pub fn resolve_text<'a>(step: &'a Step, language: &str, kind: TextKind, default: &str) -> &'a str {
    let texts = match kind {
        TextKind::Hint => &step.hint,
        TextKind::Transition => &step.transition,
    };
    texts
        .get(language)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| texts.get(default))
        .map(String::as_str)
        .unwrap_or("")
}

/// Catalog-bound resolver
#[derive(Debug, Clone, Copy)]
pub struct Localizer<'a> {
    catalog: &'a Catalog,
}

impl<'a> Localizer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Language code the catalog will actually serve for `requested`
    pub fn language(&self, requested: &str) -> String {
        normalize_language(requested, &self.catalog.languages, &self.catalog.default_language)
    }

    pub fn text(&self, step: &'a Step, requested: &str, kind: TextKind) -> &'a str {
        resolve_text(step, &self.language(requested), kind, &self.catalog.default_language)
    }

    /// Pair a cue key with the resolved language
    pub fn audio(&self, cue: &str, requested: &str) -> AudioRef {
        AudioRef::new(self.language(requested), cue)
    }
}
