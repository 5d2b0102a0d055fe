//! Core types for VocalLab

mod catalog;
mod detection;
mod error;
mod output;
mod status;

pub use catalog::{Catalog, Step, SafetyRules, DangerousPair, TextKind};
pub use detection::{Detection, Point, label_set};
pub use error::CatalogError;
pub use output::{AudioRef, StepInfo, SafetyAlert, FrameResult, FullState, SessionStats, round1};
pub use status::StepStatus;
