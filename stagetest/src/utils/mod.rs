//! Small shared helpers.

pub mod timestamps;

pub use timestamps::{elapsed_ms, iso_timestamp, now_utc, Timestamp};

/// Extracts a readable message from a caught panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
