//! Label mapping: generic detector class names → lab equipment labels
//!
//! The detector is a stock COCO model, so everyday objects stand in for lab
//! equipment. Unknown names pass through unchanged.

use std::collections::HashMap;
use lazy_static::lazy_static;
use regex::Regex;
use crate::types::Detection;

lazy_static! {
    /// Runs of whitespace, underscores or hyphens collapse to one space
    static ref RE_SEPARATORS: Regex = Regex::new(r"[\s_\-]+").unwrap();

    static ref DETECTOR_TO_LAB: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("bottle", "beaker");
        m.insert("wine glass", "conical_flask");
        m.insert("cup", "measuring_cylinder");
        m.insert("bowl", "petri_dish");
        m.insert("spoon", "spatula");
        m.insert("knife", "conical_flask");
        m.insert("scissors", "tongs");
        m.insert("vase", "volumetric_flask");
        m.insert("person", "hand");
        m.insert("cell phone", "ph_meter");
        m.insert("remote", "thermometer");
        m.insert("mouse", "dropper");
        m.insert("keyboard", "hotplate");
        m.insert("laptop", "analytical_balance");
        m.insert("book", "lab_manual");
        m.insert("clock", "stopwatch");
        m.insert("banana", "test_tube");
        m.insert("apple", "rubber_stopper");
        m.insert("orange", "watch_glass");
        m.insert("carrot", "stirring_rod");
        m.insert("toothbrush", "brush");
        m.insert("pen", "pipette");
        m
    };
}

/// Normalized lookup key for a raw class name
fn normalize(raw: &str) -> String {
    RE_SEPARATORS
        .replace_all(raw.trim(), " ")
        .to_lowercase()
}

/// Map one raw class name
pub fn map_label(raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }
    match DETECTOR_TO_LAB.get(normalize(raw).as_str()) {
        Some(lab) => lab.to_string(),
        None => raw.to_string(),
    }
}

/// Map every detection's label in place
pub fn map_detections(detections: &mut [Detection]) {
    for d in detections.iter_mut() {
        d.label = map_label(&d.label);
    }
}

/// Every lab label the table can produce, sorted and deduplicated
pub fn all_lab_labels() -> Vec<&'static str> {
    let mut labels: Vec<&'static str> = DETECTOR_TO_LAB.values().copied().collect();
    labels.sort_unstable();
    labels.dedup();
    labels
}

/// Number of raw names with a mapping
pub fn mapping_count() -> usize {
    DETECTOR_TO_LAB.len()
}
