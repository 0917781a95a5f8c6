//! Stage lifecycle events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An event emitted while a stage moves through its lifecycle.
///
/// Events are consumed by event sinks for logging or test inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// The event type (e.g., "stage.started", "stage.skipped").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl StageEvent {
    /// Creates a new stage event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: BTreeMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the stage name carried by the event, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.data.get("stage").and_then(serde_json::Value::as_str)
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn started(stage_name: &str) -> Self {
        Self::new("stage.started").add_data("stage", serde_json::json!(stage_name))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn completed(stage_name: &str, duration_ms: f64) -> Self {
        Self::new("stage.completed")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn failed(stage_name: &str, error: &str, duration_ms: f64) -> Self {
        Self::new("stage.failed")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("error", serde_json::json!(error))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.skipped" event.
    #[must_use]
    pub fn skipped(stage_name: &str, reason: &str) -> Self {
        Self::new("stage.skipped")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("reason", serde_json::json!(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_started() {
        let event = StageEvent::started("validate");
        assert_eq!(event.event_type, "stage.started");
        assert_eq!(event.stage(), Some("validate"));
    }

    #[test]
    fn test_event_completed() {
        let event = StageEvent::completed("init_apply", 123.5);
        assert_eq!(event.event_type, "stage.completed");
        assert_eq!(event.data.get("duration_ms"), Some(&serde_json::json!(123.5)));
    }

    #[test]
    fn test_event_skipped_carries_reason() {
        let event = StageEvent::skipped("destroy", "SKIP_destroy is set");
        assert_eq!(event.data.get("reason"), Some(&serde_json::json!("SKIP_destroy is set")));
    }

    #[test]
    fn test_event_serialization() {
        let event = StageEvent::failed("setup", "boom", 1.0);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"stage.failed""#));

        let back: StageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
