//! Detector output as seen by the engine
//!
//! Only `label` and the center point matter here; confidence and bbox are
//! carried through so dashboards can draw them.

use std::collections::HashSet;
use serde::{Deserialize, Serialize};

/// A point in detector pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A single detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Domain label (or raw class name before mapping)
    #[serde(alias = "class_name", default)]
    pub label: String,
    #[serde(default)]
    pub confidence: f64,
    /// [x1, y1, x2, y2]
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    /// [cx, cy]
    #[serde(default)]
    pub center: Option<Vec<f64>>,
}

impl Detection {
    /// Detection with an explicit center
    pub fn at(label: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            label: label.into(),
            confidence: 1.0,
            bbox: None,
            center: Some(vec![x, y]),
        }
    }

    /// Detection with neither center nor bbox
    pub fn label_only(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            confidence: 1.0,
            bbox: None,
            center: None,
        }
    }

    /// Center used for distance checks.
    ///
    /// Explicit center first, then bbox midpoint; `None` when neither is
    /// usable.
    pub fn center_point(&self) -> Option<Point> {
        if let Some(c) = self.center.as_deref() {
            if c.len() >= 2 {
                let p = Point::new(c[0], c[1]);
                if p.is_finite() {
                    return Some(p);
                }
            }
        }
        match self.bbox.as_deref() {
            Some([x1, y1, x2, y2, ..]) => {
                let p = Point::new((x1 + x2) / 2.0, (y1 + y2) / 2.0);
                p.is_finite().then_some(p)
            }
            _ => None,
        }
    }
}

/// Set of non-empty labels in a frame
pub fn label_set(detections: &[Detection]) -> HashSet<String> {
    detections
        .iter()
        .filter(|d| !d.label.is_empty())
        .map(|d| d.label.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_prefers_explicit_point() {
        let mut d = Detection::at("beaker", 10.0, 20.0);
        d.bbox = Some(vec![0.0, 0.0, 100.0, 100.0]);
        assert_eq!(d.center_point(), Some(Point::new(10.0, 20.0)));
    }

    #[test]
    fn test_center_falls_back_to_bbox() {
        let mut d = Detection::label_only("beaker");
        d.bbox = Some(vec![0.0, 0.0, 100.0, 50.0]);
        assert_eq!(d.center_point(), Some(Point::new(50.0, 25.0)));
    }

    #[test]
    fn test_center_unavailable() {
        let mut d = Detection::label_only("beaker");
        assert_eq!(d.center_point(), None);

        d.bbox = Some(vec![1.0, 2.0]);
        assert_eq!(d.center_point(), None);

        d.center = Some(vec![f64::NAN, 1.0]);
        assert_eq!(d.center_point(), None);
    }

    #[test]
    fn test_label_set_skips_empty() {
        let dets = vec![
            Detection::label_only("hand"),
            Detection::label_only(""),
            Detection::label_only("hand"),
        ];
        let labels = label_set(&dets);
        assert_eq!(labels.len(), 1);
        assert!(labels.contains("hand"));
    }

    #[test]
    fn test_class_name_alias() {
        let d: Detection = serde_json::from_str(r#"{"class_name": "cup", "confidence": 0.8}"#).unwrap();
        assert_eq!(d.label, "cup");
        assert_eq!(d.center_point(), None);
    }
}
