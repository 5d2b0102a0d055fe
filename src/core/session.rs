//! Experiment session: the serialized entry point around tracker + monitor
//!
//! One lock acquisition covers a whole frame: safety check, counter updates,
//! cue choice and result assembly. Reset takes the same lock and swaps the
//! state out wholesale, so no caller ever sees a half-reset session.

use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use crate::core::{Localizer, SafetyMonitor, StepTracker};
use crate::types::{
    AudioRef, Catalog, Detection, FrameResult, FullState, SessionStats, StepInfo, label_set, round1,
};

/// Mutable half of a session, only touched under the lock
#[derive(Debug)]
struct SessionCore {
    tracker: StepTracker,
    safety: SafetyMonitor,
    frames_processed: u64,
}

impl SessionCore {
    fn new(catalog: Arc<Catalog>, now: Instant) -> Self {
        Self {
            safety: SafetyMonitor::new(catalog.safety_rules.clone()),
            tracker: StepTracker::new_at(catalog, now),
            frames_processed: 0,
        }
    }

    fn process(&mut self, detections: &[Detection], language: &str, now: Instant) -> FrameResult {
        self.frames_processed += 1;
        let labels = label_set(detections);

        // safety first, every frame, completed or not
        let safety_alert = self.safety.check_at(detections, now);
        let outcome = self.tracker.process_at(&labels, now);

        let localizer = Localizer::new(self.tracker.catalog());
        let audio = outcome.cue.as_deref().map(|cue| localizer.audio(cue, language));

        FrameResult {
            timestamp: Utc::now(),
            step_info: self.tracker.step_info_at(&labels, language, now),
            safety_alert,
            step_advance: outcome.step_advance,
            audio_to_play: outcome.cue,
            audio,
            experiment_complete: outcome.experiment_complete,
        }
    }
}

/// Reply to a language switch
#[derive(Debug, Clone, Serialize)]
pub struct LanguageUpdate {
    /// Language actually served
    pub language: String,
    pub step_info: StepInfo,
    /// Current step intro in the new language
    pub audio: Option<AudioRef>,
}

/// One experiment run shared by every connected client
#[derive(Debug)]
pub struct Session {
    catalog: Arc<Catalog>,
    core: Mutex<SessionCore>,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::new_at(catalog, Instant::now())
    }

    /// Session whose clock starts at `now`
    pub fn new_at(catalog: Arc<Catalog>, now: Instant) -> Self {
        let core = SessionCore::new(Arc::clone(&catalog), now);
        Self {
            catalog,
            core: Mutex::new(core),
        }
    }

    /// Process one frame of (already label-mapped) detections
    pub async fn process(&self, detections: &[Detection], language: &str) -> FrameResult {
        self.process_at(detections, language, Instant::now()).await
    }

    /// Process one frame at `now`
    pub async fn process_at(&self, detections: &[Detection], language: &str, now: Instant) -> FrameResult {
        let mut core = self.core.lock().await;
        core.process(detections, language, now)
    }

    /// Back to step 0 with the loaded catalog
    pub async fn reset(&self) {
        let mut core = self.core.lock().await;
        *core = SessionCore::new(Arc::clone(&self.catalog), Instant::now());
        info!(experiment = %self.catalog.name, "session reset to step 0");
    }

    /// Status view; never touches counters
    pub async fn full_state(&self, language: &str) -> FullState {
        let core = self.core.lock().await;
        let state = core.tracker.state();
        FullState {
            experiment_name: self.catalog.name.clone(),
            total_steps: self.catalog.total_steps(),
            current_step: state.current_step_index,
            step_info: core.tracker.step_info(&Default::default(), language),
            completed: state.completed(),
        }
    }

    pub async fn stats(&self) -> SessionStats {
        self.stats_at(Instant::now()).await
    }

    /// Counters with `elapsed_total` measured up to `now`
    pub async fn stats_at(&self, now: Instant) -> SessionStats {
        let core = self.core.lock().await;
        let state = core.tracker.state();
        SessionStats {
            current_step: state.current_step_index,
            total_steps: self.catalog.total_steps(),
            completed: state.completed(),
            frames_processed: core.frames_processed,
            step_advances: core.tracker.step_advances(),
            safety_alerts: core.safety.alerts_raised(),
            elapsed_total: round1(now.saturating_duration_since(state.session_start_time).as_secs_f64()),
        }
    }

    /// Switch language: re-issue the current step's intro in the new language
    pub async fn change_language(&self, requested: &str) -> LanguageUpdate {
        let mut core = self.core.lock().await;
        let localizer = Localizer::new(&self.catalog);
        let language = localizer.language(requested);
        let audio = core
            .tracker
            .replay_intro()
            .map(|cue| localizer.audio(&cue, &language));
        info!(%language, "language changed");
        LanguageUpdate {
            step_info: core.tracker.step_info(&Default::default(), &language),
            language,
            audio,
        }
    }

    /// Language the catalog will serve for `requested`
    pub fn language(&self, requested: &str) -> String {
        Localizer::new(&self.catalog).language(requested)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}
