//! Testing utilities for code built on stagetest.
//!
//! This module provides:
//! - An in-memory provisioner with call recording and failure injection
//! - Recording callbacks sharing one call log
//! - Assertions for reports and call order

mod assertions;
mod mocks;

pub use assertions::{
    assert_called_before, assert_called_times, assert_report_succeeded, assert_stage_order,
    assert_stage_status,
};
pub use mocks::{CallLog, MockProvisioner, ProvisionMethod, RecordingCallbacks};
