//! Core modules for VocalLab

pub mod catalog;
pub mod labels;
pub mod localization;
pub mod safety;
pub mod tracker;
pub mod session;
pub mod api;

pub use catalog::{load_catalog, parse_catalog, fingerprint};
pub use labels::{map_label, map_detections, all_lab_labels, mapping_count};
pub use localization::{Localizer, normalize_language, resolve_text};
pub use safety::SafetyMonitor;
pub use tracker::{StepTracker, SessionState, FrameOutcome};
pub use session::{Session, LanguageUpdate};
pub use api::{
    create_router, router_with_state, run_server, audio_url, accept_frame, student_reply,
    AppState, ClientMessage, ServerMessage, StudentLink, MIN_FRAME_INTERVAL,
};
