//! Integration tests for the experiment session
//!
//! Tests the full path: detections → safety monitor → step tracker → result

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use vocallab::core::{parse_catalog, Session};
use vocallab::types::{AudioRef, Catalog, Detection, StepStatus};
use vocallab::{REMOVAL_FRAMES_REQUIRED, STABLE_FRAMES_REQUIRED};

fn catalog() -> Arc<Catalog> {
    let doc = json!({
        "name": "Titration",
        "total_steps": 3,
        "languages": ["en", "hi"],
        "steps": [
            {
                "name": "Prepare",
                "required_objects": ["beaker", "spatula"],
                "hint": {"en": "Place the beaker", "hi": "बीकर रखें"},
                "transition": {"en": "Put them away", "hi": "हटा दें"},
                "audio_intro": "s0_intro",
                "audio_transition": "s0_transition",
                "audio_complete": "s0_complete"
            },
            {
                "name": "Heat",
                "required_objects": ["hotplate"],
                "hint": {"en": "Switch on the hotplate"},
                "transition": {"en": "Turn it off"},
                "audio_intro": "s1_intro",
                "audio_transition": "s1_transition",
                "audio_complete": "s1_complete"
            },
            {
                "name": "Measure",
                "required_objects": ["ph_meter"],
                "hint": {"en": "Read the pH"},
                "transition": {"en": "All done"},
                "audio_intro": "s2_intro",
                "audio_transition": "s2_transition",
                "audio_complete": "s2_complete"
            }
        ],
        "safety_rules": {
            "proximity_threshold": 100,
            "alert_cooldown_seconds": 3,
            "dangerous_pairs": [["hand", "hotplate"]]
        }
    });
    Arc::new(parse_catalog(&doc.to_string()).unwrap())
}

fn dets(labels: &[&str]) -> Vec<Detection> {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| Detection::at(*l, 500.0 * i as f64, 0.0))
        .collect()
}

fn hand_near_hotplate() -> Vec<Detection> {
    vec![Detection::at("hand", 0.0, 0.0), Detection::at("hotplate", 30.0, 40.0)]
}

/// Drive a session through step `from` into `from + 1`
async fn complete_step(session: &Session, required: &[&str], t: &mut Instant) {
    for _ in 0..STABLE_FRAMES_REQUIRED {
        session.process_at(&dets(required), "en", *t).await;
        *t += Duration::from_millis(500);
    }
    for _ in 0..REMOVAL_FRAMES_REQUIRED {
        session.process_at(&dets(&[]), "en", *t).await;
        *t += Duration::from_millis(500);
    }
}

#[tokio::test]
async fn test_beaker_spatula_scenario() {
    let session = Session::new(catalog());
    let both = dets(&["beaker", "spatula"]);
    let none = dets(&[]);
    let t0 = Instant::now();

    let f1 = session.process_at(&both, "en", t0).await;
    assert_eq!(f1.audio_to_play.as_deref(), Some("s0_intro"));
    assert_eq!(f1.step_info.progress, 100.0);

    session.process_at(&both, "en", t0).await;
    let f3 = session.process_at(&both, "en", t0).await;
    assert!(!f3.step_advance);
    assert_eq!(f3.step_info.step_status, StepStatus::Transition);
    assert_eq!(f3.audio_to_play.as_deref(), Some("s0_transition"));
    assert_eq!(f3.step_info.hint, "Put them away");

    let f4 = session.process_at(&none, "en", t0).await;
    assert!(!f4.step_advance);
    assert_eq!(f4.audio_to_play, None);

    let f5 = session.process_at(&none, "en", t0).await;
    assert!(f5.step_advance);
    assert!(!f5.experiment_complete);
    assert_eq!(f5.step_info.current_step, 1);
    assert_eq!(f5.step_info.step_name, "Heat");
    assert_eq!(f5.audio_to_play.as_deref(), Some("s1_intro"));
    assert_eq!(f5.audio, Some(AudioRef::new("en", "s1_intro")));
}

#[tokio::test]
async fn test_hand_hotplate_cooldown_scenario() {
    let session = Session::new(catalog());
    let t0 = Instant::now();

    let f10 = session.process_at(&hand_near_hotplate(), "en", t0).await;
    let alert = f10.safety_alert.expect("alert on first violation");
    assert_eq!(alert.distance_px, 50.0);
    assert_eq!(alert.threshold_px, 100.0);

    let f11 = session
        .process_at(&hand_near_hotplate(), "en", t0 + Duration::from_millis(500))
        .await;
    assert!(f11.safety_alert.is_none());

    let later = session
        .process_at(&hand_near_hotplate(), "en", t0 + Duration::from_secs(3))
        .await;
    assert!(later.safety_alert.is_some());
    assert_eq!(session.stats().await.safety_alerts, 2);
}

#[tokio::test]
async fn test_alert_does_not_block_step_progress() {
    let session = Session::new(catalog());
    let t0 = Instant::now();
    let mut frame = dets(&["beaker", "spatula"]);
    frame.extend(hand_near_hotplate());

    let first = session.process_at(&frame, "en", t0).await;
    assert!(first.safety_alert.is_some());
    // the step cue still goes out alongside the alert
    assert_eq!(first.audio_to_play.as_deref(), Some("s0_intro"));
    assert_eq!(session.stats().await.current_step, 0);
}

#[tokio::test]
async fn test_full_run_to_completion() {
    let session = Session::new(catalog());
    let mut t = Instant::now();

    complete_step(&session, &["beaker", "spatula"], &mut t).await;
    complete_step(&session, &["hotplate"], &mut t).await;

    let meter = dets(&["ph_meter"]);
    session.process_at(&meter, "en", t).await;
    session.process_at(&meter, "en", t).await;
    let done = session.process_at(&meter, "hi", t).await;
    assert!(done.step_advance);
    assert!(done.experiment_complete);
    assert_eq!(done.audio_to_play.as_deref(), Some("s2_complete"));
    assert_eq!(done.audio, Some(AudioRef::new("hi", "s2_complete")));
    assert_eq!(done.step_info.current_step, 3);
    assert_eq!(done.step_info.step_status, StepStatus::Completed);
    // no "hi" transition text on the final step → default language
    assert_eq!(done.step_info.hint, "All done");

    let after = session.process_at(&meter, "en", t).await;
    assert!(after.experiment_complete);
    assert!(!after.step_advance);
    assert_eq!(after.audio_to_play, None);

    let stats = session.stats().await;
    assert_eq!(stats.step_advances, 3);
    assert!(stats.completed);
    assert_eq!(stats.current_step, stats.total_steps);
}

#[tokio::test]
async fn test_safety_still_runs_after_completion() {
    let session = Session::new(catalog());
    let mut t = Instant::now();
    complete_step(&session, &["beaker", "spatula"], &mut t).await;
    complete_step(&session, &["hotplate"], &mut t).await;
    for _ in 0..STABLE_FRAMES_REQUIRED {
        session.process_at(&dets(&["ph_meter"]), "en", t).await;
    }
    assert!(session.full_state("en").await.completed);

    let result = session.process_at(&hand_near_hotplate(), "en", t).await;
    assert!(result.experiment_complete);
    assert!(result.safety_alert.is_some());
}

#[tokio::test]
async fn test_full_state_is_read_only() {
    let session = Session::new(catalog());
    let t0 = Instant::now();
    session.process_at(&dets(&["beaker", "spatula"]), "en", t0).await;

    let mut a = session.full_state("en").await;
    let mut b = session.full_state("en").await;
    a.step_info.time_on_step = 0.0;
    a.step_info.elapsed_total = 0.0;
    b.step_info.time_on_step = 0.0;
    b.step_info.elapsed_total = 0.0;
    assert_eq!(a, b);

    // the stable counter was not touched: two more frames finish the step
    session.process_at(&dets(&["beaker", "spatula"]), "en", t0).await;
    let third = session.process_at(&dets(&["beaker", "spatula"]), "en", t0).await;
    assert_eq!(third.step_info.step_status, StepStatus::Transition);
}

#[tokio::test]
async fn test_reset_returns_to_step_zero() {
    let session = Session::new(catalog());
    let mut t = Instant::now();
    complete_step(&session, &["beaker", "spatula"], &mut t).await;
    assert_eq!(session.full_state("en").await.current_step, 1);

    session.reset().await;
    let state = session.full_state("en").await;
    assert_eq!(state.current_step, 0);
    assert_eq!(state.step_info.step_status, StepStatus::Active);
    assert_eq!(session.stats().await.frames_processed, 0);

    // intro fires again after a reset
    let f = session.process(&dets(&["beaker"]), "en").await;
    assert_eq!(f.audio_to_play.as_deref(), Some("s0_intro"));
}

#[tokio::test]
async fn test_change_language_replays_intro_once() {
    let session = Session::new(catalog());
    session.process(&dets(&["beaker"]), "en").await;

    let update = session.change_language("HI").await;
    assert_eq!(update.language, "hi");
    assert_eq!(update.step_info.hint, "बीकर रखें");
    assert_eq!(update.audio, Some(AudioRef::new("hi", "s0_intro")));

    let next = session.process(&dets(&["beaker"]), "hi").await;
    assert_eq!(next.audio_to_play, None);

    let unknown = session.change_language("xx").await;
    assert_eq!(unknown.language, "en");
}

#[tokio::test]
async fn test_unknown_language_falls_back() {
    let session = Session::new(catalog());
    let f = session.process(&dets(&["beaker"]), "fr").await;
    assert_eq!(f.step_info.hint, "Place the beaker");
    assert_eq!(f.audio, Some(AudioRef::new("en", "s0_intro")));
}

#[tokio::test]
async fn test_concurrent_frames_complete_exactly_once() {
    let session = Arc::new(Session::new(catalog()));
    let mut t = Instant::now();
    complete_step(&session, &["beaker", "spatula"], &mut t).await;
    complete_step(&session, &["hotplate"], &mut t).await;

    let mut handles = Vec::new();
    for _ in 0..32 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session.process(&dets(&["ph_meter"]), "en").await
        }));
    }

    let mut advances = 0;
    let mut completes = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        if result.step_advance {
            advances += 1;
        }
        if result.audio_to_play.as_deref() == Some("s2_complete") {
            completes += 1;
        }
    }
    assert_eq!(advances, 1);
    assert_eq!(completes, 1);
    assert_eq!(session.stats().await.frames_processed, 10 + 32);
}

#[tokio::test]
async fn test_concurrent_transition_cue_exactly_once() {
    let session = Arc::new(Session::new(catalog()));
    let mut handles = Vec::new();
    for _ in 0..40 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session.process(&dets(&["beaker", "spatula"]), "en").await
        }));
    }

    let mut transition_cues = 0;
    for handle in handles {
        if handle.await.unwrap().audio_to_play.as_deref() == Some("s0_transition") {
            transition_cues += 1;
        }
    }
    assert_eq!(transition_cues, 1);
    assert_eq!(session.full_state("en").await.current_step, 0);
}

#[tokio::test]
async fn test_stats_follow_injected_clock() {
    let t0 = Instant::now();
    let session = Session::new_at(catalog(), t0);
    let last = t0 + Duration::from_millis(500 * 9);
    session.process_at(&dets(&["beaker"]), "en", last).await;

    let stats = session.stats_at(last).await;
    assert_eq!(stats.elapsed_total, 4.5);
    assert_eq!(stats.frames_processed, 1);
    // a clock before the start reads as zero
    assert_eq!(session.stats_at(t0).await.elapsed_total, 0.0);
}
