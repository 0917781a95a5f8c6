//! Event sinks for stage lifecycle observability.
//!
//! The stage runner reports every start, skip, completion and failure through
//! an [`EventSink`]. The default sink forwards events to `tracing`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
