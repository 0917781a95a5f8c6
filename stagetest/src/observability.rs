//! Tracing setup for test binaries.
//!
//! The harness only emits `tracing` events. Call [`init_tracing`] at the top
//! of a test to see them; later calls are no-ops, so every test can call it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log format (`text` or `json`).
pub const LOG_FORMAT_ENV: &str = "STAGETEST_LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Reads the format from [`LOG_FORMAT_ENV`], defaulting to text.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Installs a global subscriber writing through the test harness's capture.
///
/// Honors `RUST_LOG` and [`LOG_FORMAT_ENV`]. Returns false if a subscriber
/// was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with(LogFormat::from_env())
}

/// Installs a global subscriber with an explicit format.
pub fn init_tracing_with(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_test_writer())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init(),
    };
    result.is_ok()
}
