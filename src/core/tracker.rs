//! Step Tracker: frame-driven state machine with debounce counters
//!
//! State transitions:
//! - ACTIVE → TRANSITION: all required objects present for 3 frames (non-final step)
//! - ACTIVE → COMPLETED: same, on the final step
//! - TRANSITION → ACTIVE (next step): a required object missing for 2 frames
//! - COMPLETED: terminal
//!
//! Cue rules:
//! - intro: first frame a required object shows up, once per step occurrence
//! - transition: once, on entry to TRANSITION
//! - on advance, the next step's intro rides along in the same frame
//! - complete: the final step's `audio_complete` on completion

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use crate::{COMPLETE_STEP_NAME, REMOVAL_FRAMES_REQUIRED, STABLE_FRAMES_REQUIRED};
use crate::core::Localizer;
use crate::types::{Catalog, Step, StepInfo, StepStatus, TextKind, round1};

/// Mutable per-session progress
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// 0..=total_steps; equals total_steps once completed
    pub current_step_index: usize,
    /// Consecutive all-present frames (ACTIVE only)
    pub stable_count: u32,
    /// Consecutive not-all-present frames (TRANSITION only)
    pub removal_count: u32,
    pub status: StepStatus,
    /// Transition cue already emitted for this step occurrence
    pub transition_cue_sent: bool,
    /// Last step whose intro cue went out
    pub intro_played_for_step: Option<usize>,
    pub step_start_time: Instant,
    pub session_start_time: Instant,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            current_step_index: 0,
            stable_count: 0,
            removal_count: 0,
            status: StepStatus::Active,
            transition_cue_sent: false,
            intro_played_for_step: None,
            step_start_time: now,
            session_start_time: now,
        }
    }

    pub fn in_transition(&self) -> bool {
        self.status == StepStatus::Transition
    }

    pub fn completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// What a single frame did to the tracker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Advanced to the next step, or completed the final one
    pub step_advance: bool,
    pub experiment_complete: bool,
    /// Cue key to play, if any
    pub cue: Option<String>,
}

impl FrameOutcome {
    fn quiet(cue: Option<String>) -> Self {
        Self {
            cue,
            ..Self::default()
        }
    }
}

/// Step progress state machine
#[derive(Debug)]
pub struct StepTracker {
    catalog: Arc<Catalog>,
    state: SessionState,
    step_advances: u64,
}

impl StepTracker {
    /// Create a tracker at step 0
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::new_at(catalog, Instant::now())
    }

    pub fn new_at(catalog: Arc<Catalog>, now: Instant) -> Self {
        Self {
            catalog,
            state: SessionState::new(now),
            step_advances: 0,
        }
    }

    /// Feed one frame's label set
    pub fn process(&mut self, labels: &HashSet<String>) -> FrameOutcome {
        self.process_at(labels, Instant::now())
    }

    /// Feed one frame's label set at `now`
    pub fn process_at(&mut self, labels: &HashSet<String>, now: Instant) -> FrameOutcome {
        let catalog = Arc::clone(&self.catalog);
        let index = self.state.current_step_index;

        let step = match catalog.step(index) {
            Some(step) if !self.state.completed() => step,
            _ => {
                return FrameOutcome {
                    experiment_complete: true,
                    ..FrameOutcome::default()
                };
            }
        };

        if self.state.in_transition() {
            self.on_transition(&catalog, step, labels, now)
        } else {
            self.on_active(&catalog, step, labels, now)
        }
    }

    fn on_active(
        &mut self,
        catalog: &Catalog,
        step: &Step,
        labels: &HashSet<String>,
        now: Instant,
    ) -> FrameOutcome {
        let present = count_present(step, labels);
        let all_present = present == step.required_objects.len();

        let mut cue = None;
        if present > 0 && self.state.intro_played_for_step != Some(step.id) {
            self.state.intro_played_for_step = Some(step.id);
            cue = Some(step.audio_intro.clone());
        }

        if !all_present {
            self.state.stable_count = 0;
            return FrameOutcome::quiet(cue);
        }

        self.state.stable_count += 1;
        debug!(
            step = step.id,
            stable = self.state.stable_count,
            required = STABLE_FRAMES_REQUIRED,
            "step stable"
        );
        if self.state.stable_count < STABLE_FRAMES_REQUIRED {
            return FrameOutcome::quiet(cue);
        }

        self.state.stable_count = 0;
        self.state.removal_count = 0;

        if catalog.is_final(step.id) {
            self.state.status = StepStatus::Completed;
            self.state.current_step_index = catalog.total_steps();
            self.state.step_start_time = now;
            self.step_advances += 1;
            info!(step = %step.name, "experiment complete");
            return FrameOutcome {
                step_advance: true,
                experiment_complete: true,
                cue: Some(step.audio_complete.clone()),
            };
        }

        self.state.status = StepStatus::Transition;
        self.state.transition_cue_sent = false;
        info!(step = %step.name, "step done, waiting for removal");
        // a pending intro loses to the transition cue
        FrameOutcome::quiet(self.take_transition_cue(step).or(cue))
    }

    fn on_transition(
        &mut self,
        catalog: &Catalog,
        step: &Step,
        labels: &HashSet<String>,
        now: Instant,
    ) -> FrameOutcome {
        let cue = self.take_transition_cue(step);

        // a step with nothing to put away counts every frame as cleared
        let still_present = !step.required_objects.is_empty()
            && count_present(step, labels) == step.required_objects.len();
        if still_present {
            self.state.removal_count = 0;
            return FrameOutcome::quiet(cue);
        }

        self.state.removal_count += 1;
        debug!(
            step = step.id,
            removal = self.state.removal_count,
            required = REMOVAL_FRAMES_REQUIRED,
            "step objects leaving"
        );
        if self.state.removal_count < REMOVAL_FRAMES_REQUIRED {
            return FrameOutcome::quiet(cue);
        }

        let next_index = step.id + 1;
        let Some(next) = catalog.step(next_index) else {
            // not reachable with a validated catalog: the final step never transitions
            self.state.status = StepStatus::Completed;
            self.state.current_step_index = catalog.total_steps();
            return FrameOutcome {
                experiment_complete: true,
                ..FrameOutcome::default()
            };
        };

        self.state.current_step_index = next_index;
        self.state.stable_count = 0;
        self.state.removal_count = 0;
        self.state.transition_cue_sent = false;
        self.state.status = StepStatus::Active;
        self.state.step_start_time = now;
        self.state.intro_played_for_step = Some(next_index);
        self.step_advances += 1;
        info!(from = %step.name, to = %next.name, "step advanced");

        FrameOutcome {
            step_advance: true,
            experiment_complete: false,
            cue: Some(next.audio_intro.clone()),
        }
    }

    fn take_transition_cue(&mut self, step: &Step) -> Option<String> {
        if self.state.transition_cue_sent {
            return None;
        }
        self.state.transition_cue_sent = true;
        Some(step.audio_transition.clone())
    }

    /// Emit the current step's intro again (language switch).
    ///
    /// Marks it played, so the next frame does not repeat it.
    pub fn replay_intro(&mut self) -> Option<String> {
        if self.state.completed() {
            return None;
        }
        let step = self.catalog.step(self.state.current_step_index)?;
        self.state.intro_played_for_step = Some(step.id);
        Some(step.audio_intro.clone())
    }

    /// Snapshot of the current step for the given frame labels
    pub fn step_info(&self, labels: &HashSet<String>, language: &str) -> StepInfo {
        self.step_info_at(labels, language, Instant::now())
    }

    pub fn step_info_at(&self, labels: &HashSet<String>, language: &str, now: Instant) -> StepInfo {
        let localizer = Localizer::new(&self.catalog);
        let total_steps = self.catalog.total_steps();
        let elapsed_total = round1(now.saturating_duration_since(self.state.session_start_time).as_secs_f64());

        let step = match self.catalog.step(self.state.current_step_index) {
            Some(step) if !self.state.completed() => step,
            _ => {
                let hint = self
                    .catalog
                    .steps
                    .last()
                    .map(|last| localizer.text(last, language, TextKind::Transition).to_string())
                    .unwrap_or_default();
                return StepInfo {
                    current_step: total_steps,
                    total_steps,
                    step_name: COMPLETE_STEP_NAME.to_string(),
                    hint,
                    required_objects: Vec::new(),
                    detected_required: Vec::new(),
                    missing_objects: Vec::new(),
                    progress: 100.0,
                    time_on_step: 0.0,
                    elapsed_total,
                    completed: true,
                    step_status: StepStatus::Completed,
                };
            }
        };

        let (detected_required, missing_objects): (Vec<String>, Vec<String>) = step
            .required_objects
            .iter()
            .cloned()
            .partition(|obj| labels.contains(obj));

        let (kind, progress) = if self.state.in_transition() {
            (TextKind::Transition, 100.0)
        } else if step.required_objects.is_empty() {
            (TextKind::Hint, 100.0)
        } else {
            let ratio = detected_required.len() as f64 / step.required_objects.len() as f64;
            (TextKind::Hint, round1(ratio * 100.0))
        };

        StepInfo {
            current_step: self.state.current_step_index,
            total_steps,
            step_name: step.name.clone(),
            hint: localizer.text(step, language, kind).to_string(),
            required_objects: step.required_objects.clone(),
            detected_required,
            missing_objects,
            progress,
            time_on_step: round1(now.saturating_duration_since(self.state.step_start_time).as_secs_f64()),
            elapsed_total,
            completed: false,
            step_status: self.state.status,
        }
    }

    /// Read-only view of the counters
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Step that is currently being worked on, `None` once completed
    pub fn current_step(&self) -> Option<&Step> {
        if self.state.completed() {
            return None;
        }
        self.catalog.step(self.state.current_step_index)
    }

    /// Number of advances (including completion)
    pub fn step_advances(&self) -> u64 {
        self.step_advances
    }

    /// Back to step 0 with the same catalog
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        *self = Self::new_at(Arc::clone(&self.catalog), now);
    }
}

fn count_present(step: &Step, labels: &HashSet<String>) -> usize {
    step.required_objects
        .iter()
        .filter(|obj| labels.contains(obj.as_str()))
        .count()
}

// =============================================================================
// TESTS
// =============================================================================
