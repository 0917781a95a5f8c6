//! Core domain types for stagetest.
//!
//! This module contains:
//! - Stage names, statuses and gate decisions
//! - Stage lifecycle events

mod event;
mod status;

pub use event::StageEvent;
pub use status::{StageDecision, StageStatus, StandardStage};
