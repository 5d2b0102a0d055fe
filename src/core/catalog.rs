//! Catalog loading and validation
//!
//! A catalog either loads completely or not at all: every structural
//! problem is reported as a `CatalogError` before any tracker sees it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use sha2::{Sha256, Digest};
use tracing::info;
use crate::types::{Catalog, CatalogError, TextKind};

/// Read, parse and validate a catalog file
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let catalog = parse_catalog(&raw)?;
    info!(
        path = %path.display(),
        name = %catalog.name,
        steps = catalog.total_steps,
        fingerprint = %&catalog.fingerprint[..12],
        "catalog loaded"
    );
    Ok(catalog)
}

/// Parse and validate a catalog document
pub fn parse_catalog(raw: &str) -> Result<Catalog, CatalogError> {
    let mut catalog: Catalog = serde_json::from_str(raw)?;
    catalog.fingerprint = fingerprint(raw.as_bytes());
    validate(&mut catalog)?;
    Ok(catalog)
}

/// Hex SHA-256 of the source document
pub fn fingerprint(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Structural checks plus normalization (ids, language list)
fn validate(catalog: &mut Catalog) -> Result<(), CatalogError> {
    if catalog.steps.is_empty() {
        return Err(CatalogError::NoSteps);
    }
    if catalog.steps.len() != catalog.total_steps {
        return Err(CatalogError::StepCountMismatch {
            declared: catalog.total_steps,
            actual: catalog.steps.len(),
        });
    }

    catalog.default_language = catalog.default_language.trim().to_lowercase();
    for lang in catalog.languages.iter_mut() {
        *lang = lang.trim().to_lowercase();
    }
    if catalog.languages.is_empty() {
        catalog.languages.push(catalog.default_language.clone());
    }
    if catalog.default_language.is_empty()
        || !catalog.languages.contains(&catalog.default_language)
    {
        return Err(CatalogError::UnknownDefaultLanguage(catalog.default_language.clone()));
    }

    let default_language = catalog.default_language.clone();
    for (index, step) in catalog.steps.iter_mut().enumerate() {
        step.id = index;
        normalize_keys(&mut step.hint);
        normalize_keys(&mut step.transition);

        if step.name.trim().is_empty() {
            return Err(CatalogError::MissingName { step: index });
        }

        for (kind, texts) in [(TextKind::Hint, &step.hint), (TextKind::Transition, &step.transition)] {
            let present = texts
                .get(&default_language)
                .is_some_and(|t| !t.trim().is_empty());
            if !present {
                return Err(CatalogError::MissingText {
                    step: index,
                    kind,
                    language: default_language.clone(),
                });
            }
        }

        for (cue, key) in [
            ("audio_intro", &step.audio_intro),
            ("audio_transition", &step.audio_transition),
            ("audio_complete", &step.audio_complete),
        ] {
            if key.trim().is_empty() {
                return Err(CatalogError::MissingCue { step: index, cue });
            }
        }

        let mut seen = HashSet::new();
        for label in &step.required_objects {
            if label.trim().is_empty() || !seen.insert(label.as_str()) {
                return Err(CatalogError::InvalidRequiredObject {
                    step: index,
                    label: label.clone(),
                });
            }
        }
    }

    let rules = &catalog.safety_rules;
    if !rules.proximity_threshold.is_finite() || rules.proximity_threshold <= 0.0 {
        return Err(CatalogError::InvalidSafetyRules(format!(
            "proximity_threshold must be positive, got {}",
            rules.proximity_threshold
        )));
    }
    if Duration::try_from_secs_f64(rules.alert_cooldown_seconds).is_err() {
        return Err(CatalogError::InvalidSafetyRules(format!(
            "alert_cooldown_seconds must be a non-negative duration, got {}",
            rules.alert_cooldown_seconds
        )));
    }
    for pair in &rules.dangerous_pairs {
        if pair.0.trim().is_empty() || pair.1.trim().is_empty() {
            return Err(CatalogError::InvalidSafetyRules(format!(
                "dangerous pair {:?} has an empty label",
                pair
            )));
        }
    }

    Ok(())
}

/// Language keys of a text map, trimmed and lowercased like the language list
fn normalize_keys(texts: &mut BTreeMap<String, String>) {
    *texts = std::mem::take(texts)
        .into_iter()
        .map(|(lang, text)| (lang.trim().to_lowercase(), text))
        .collect();
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn base() -> Value {
        json!({
            "name": "Titration",
            "total_steps": 2,
            "languages": ["en", "hi"],
            "steps": [
                {
                    "name": "Prepare",
                    "required_objects": ["beaker", "spatula"],
                    "hint": {"en": "Place the beaker", "hi": "बीकर रखें"},
                    "transition": {"en": "Clear the bench"},
                    "audio_intro": "s0_intro",
                    "audio_transition": "s0_transition",
                    "audio_complete": "s0_complete"
                },
                {
                    "name": "Heat",
                    "required_objects": ["hotplate"],
                    "hint": {"en": "Switch on the hotplate"},
                    "transition": {"en": "Done"},
                    "audio_intro": "s1_intro",
                    "audio_transition": "s1_transition",
                    "audio_complete": "s1_complete"
                }
            ],
            "safety_rules": {
                "proximity_threshold": 120,
                "dangerous_pairs": [["hand", "hotplate"]]
            }
        })
    }

    fn parse(v: &Value) -> Result<Catalog, CatalogError> {
        parse_catalog(&v.to_string())
    }

    #[test]
    fn test_valid_catalog_loads() {
        let catalog = parse(&base()).unwrap();
        assert_eq!(catalog.total_steps(), 2);
        assert_eq!(catalog.steps[1].id, 1);
        assert_eq!(catalog.default_language, "en");
        assert_eq!(catalog.safety_rules.proximity_threshold, 120.0);
        // omitted cooldown falls back to the default
        assert_eq!(catalog.safety_rules.alert_cooldown_seconds, 3.0);
        assert_eq!(catalog.fingerprint.len(), 64);
        assert!(catalog.is_final(1));
        assert!(!catalog.is_final(0));
    }

    #[test]
    fn test_step_count_mismatch() {
        let mut v = base();
        v["total_steps"] = json!(3);
        assert!(matches!(
            parse(&v),
            Err(CatalogError::StepCountMismatch { declared: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_empty_steps_rejected() {
        let mut v = base();
        v["steps"] = json!([]);
        v["total_steps"] = json!(0);
        assert!(matches!(parse(&v), Err(CatalogError::NoSteps)));
    }

    #[test]
    fn test_missing_default_language_text() {
        let mut v = base();
        v["steps"][1]["transition"] = json!({"hi": "समाप्त"});
        match parse(&v) {
            Err(CatalogError::MissingText { step, kind, .. }) => {
                assert_eq!(step, 1);
                assert_eq!(kind, TextKind::Transition);
            }
            other => panic!("expected MissingText, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_cue_field_is_parse_error() {
        let mut v = base();
        v["steps"][0].as_object_mut().unwrap().remove("audio_intro");
        assert!(matches!(parse(&v), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_blank_cue_rejected() {
        let mut v = base();
        v["steps"][0]["audio_complete"] = json!("  ");
        assert!(matches!(
            parse(&v),
            Err(CatalogError::MissingCue { step: 0, cue: "audio_complete" })
        ));
    }

    #[test]
    fn test_duplicate_required_object_rejected() {
        let mut v = base();
        v["steps"][0]["required_objects"] = json!(["beaker", "beaker"]);
        assert!(matches!(parse(&v), Err(CatalogError::InvalidRequiredObject { step: 0, .. })));
    }

    #[test]
    fn test_default_language_must_be_listed() {
        let mut v = base();
        v["default_language"] = json!("ta");
        assert!(matches!(parse(&v), Err(CatalogError::UnknownDefaultLanguage(_))));
    }

    #[test]
    fn test_language_list_defaults_to_default_language() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("languages");
        let catalog = parse(&v).unwrap();
        assert_eq!(catalog.languages, vec!["en".to_string()]);
    }

    #[test]
    fn test_invalid_safety_rules() {
        let mut v = base();
        v["safety_rules"]["proximity_threshold"] = json!(0);
        assert!(matches!(parse(&v), Err(CatalogError::InvalidSafetyRules(_))));

        let mut v = base();
        v["safety_rules"]["alert_cooldown_seconds"] = json!(-1.0);
        assert!(matches!(parse(&v), Err(CatalogError::InvalidSafetyRules(_))));

        let mut v = base();
        v["safety_rules"]["alert_cooldown_seconds"] = json!(1e20);
        assert!(matches!(parse(&v), Err(CatalogError::InvalidSafetyRules(_))));

        let mut v = base();
        v["safety_rules"]["dangerous_pairs"] = json!([["hand", ""]]);
        assert!(matches!(parse(&v), Err(CatalogError::InvalidSafetyRules(_))));
    }

    #[test]
    fn test_text_keys_follow_language_normalization() {
        let mut v = base();
        v["languages"] = json!(["EN", " Hi "]);
        v["steps"][0]["hint"] = json!({"En": "Place the beaker", "HI ": "बीकर रखें"});
        v["steps"][0]["transition"] = json!({" en": "Clear the bench"});

        let catalog = parse(&v).unwrap();
        assert_eq!(catalog.languages, vec!["en".to_string(), "hi".to_string()]);
        let step = &catalog.steps[0];
        assert_eq!(step.hint.get("hi").map(String::as_str), Some("बीकर रखें"));
        assert_eq!(step.hint.get("en").map(String::as_str), Some("Place the beaker"));
        assert_eq!(step.transition.get("en").map(String::as_str), Some("Clear the bench"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_catalog("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }
}
