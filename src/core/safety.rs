//! Safety Monitor: dangerous-pair proximity with a cooldown
//!
//! Runs on every frame before the step tracker, including after the
//! experiment is complete.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;
use crate::SAFETY_ALERT_CUE;
use crate::types::{Detection, Point, SafetyAlert, SafetyRules, round1};

/// Proximity checker for one session
#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    rules: SafetyRules,
    cooldown: Duration,
    /// When the last alert fired, of any pair
    last_alert: Option<Instant>,
    alerts_raised: u64,
}

impl SafetyMonitor {
    pub fn new(rules: SafetyRules) -> Self {
        // validated catalogs always convert; hand-built rules saturate
        let cooldown = Duration::try_from_secs_f64(rules.alert_cooldown_seconds.max(0.0))
            .unwrap_or(Duration::MAX);
        Self {
            rules,
            cooldown,
            last_alert: None,
            alerts_raised: 0,
        }
    }

    /// Check a frame now
    pub fn check(&mut self, detections: &[Detection]) -> Option<SafetyAlert> {
        self.check_at(detections, Instant::now())
    }

    /// Check a frame at `now`.
    ///
    /// At most one alert per call: the first configured pair that is too
    /// close wins and the remaining pairs are not looked at.
    pub fn check_at(&mut self, detections: &[Detection], now: Instant) -> Option<SafetyAlert> {
        if self.cooling_down(now) {
            return None;
        }

        // last detection of a label wins, centerless ones make it unavailable
        let mut centers: HashMap<&str, Option<Point>> = HashMap::new();
        for d in detections {
            centers.insert(d.label.as_str(), d.center_point());
        }

        for pair in &self.rules.dangerous_pairs {
            let (Some(Some(a)), Some(Some(b))) =
                (centers.get(pair.0.as_str()), centers.get(pair.1.as_str()))
            else {
                continue;
            };
            let distance = a.distance(b);
            if distance < self.rules.proximity_threshold {
                self.last_alert = Some(now);
                self.alerts_raised += 1;
                warn!(
                    a = %pair.0,
                    b = %pair.1,
                    distance = round1(distance),
                    threshold = self.rules.proximity_threshold,
                    "safety: objects too close"
                );
                return Some(SafetyAlert {
                    severity: "high".to_string(),
                    message: format!("Keep hands away from {}!", pair.1),
                    pair: pair.clone(),
                    distance_px: round1(distance),
                    threshold_px: self.rules.proximity_threshold,
                    cue: SAFETY_ALERT_CUE.to_string(),
                });
            }
        }
        None
    }

    fn cooling_down(&self, now: Instant) -> bool {
        self.last_alert
            .is_some_and(|last| now.saturating_duration_since(last) < self.cooldown)
    }

    /// Number of alerts raised so far
    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised
    }

    pub fn rules(&self) -> &SafetyRules {
        &self.rules
    }
}

// =============================================================================
// TESTS
// =============================================================================
