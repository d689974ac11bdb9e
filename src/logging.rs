//! Logging setup.
//!
//! Logs go to **stderr**; stdout carries only the handshake line.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `info`, `gitlab_provider=debug`), default `info`
//! - `GITLAB_PROVIDER_LOG_FORMAT`: `json` for JSON lines, anything else for text
//!
//! ```bash
//! RUST_LOG=gitlab_provider=debug GITLAB_PROVIDER_LOG_FORMAT=json ./gitlab-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LOG_FORMAT_ENV;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Read the format from `GITLAB_PROVIDER_LOG_FORMAT`.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .map(|v| Self::parse(&v))
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

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn try_init_logging_with(default_level: &str, format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(default_level));

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
            .is_ok(),
    }
}

/// Install the subscriber at `info`, in the format chosen by the environment.
///
/// Does nothing when a subscriber is already installed.
pub fn init_logging() {
    try_init_logging();
}

/// Like [`init_logging`], but reports whether the subscriber was installed.
pub fn try_init_logging() -> bool {
    try_init_logging_with("info", LogFormat::from_env())
}
