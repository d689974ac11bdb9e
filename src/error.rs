//! Error types for the GitLab provider.
//!
//! Every [`ProviderError`] ends up as a diagnostic in a protocol response;
//! [`ProviderError::to_diagnostic`] decides how it reads to the user.

use thiserror::Error;

use crate::client::ApiError;
use crate::schema::Diagnostic;

/// Errors that can occur while serving provider requests.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The GitLab API rejected or failed a call.
    #[error("{summary}: {source}")]
    Api {
        /// What the provider was doing, e.g. "Error creating pages domain for project 42".
        summary: String,
        /// The client error.
        #[source]
        source: ApiError,
    },

    /// The remote object changed but the operation did not finish.
    /// `state` describes what now exists and must be kept by the host.
    #[error("{source}")]
    Incomplete {
        /// State of the object as left behind.
        state: serde_json::Value,
        /// What stopped the operation.
        source: Box<ProviderError>,
    },

    /// A stored or imported ID does not have the expected shape.
    #[error("Invalid resource ID format: '{id}' should be '{expected}': {reason}")]
    InvalidId {
        /// The offending ID.
        id: String,
        /// The expected format, e.g. `<project>:<domain>`.
        expected: &'static str,
        /// Why parsing failed.
        reason: String,
    },

    /// A value passed validation but cannot be applied.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A resource or data source was used before `Configure`.
    #[error("Provider not configured: Configure must succeed before managing resources")]
    NotConfigured,

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The requested data source type is unknown.
    #[error("Unknown data source type: {0}")]
    UnknownDataSource(String),

    /// The host sent a payload that could not be decoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Binding the listener or another I/O step failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Wrap a client error with a user-facing summary.
    pub fn api(summary: impl Into<String>, source: ApiError) -> Self {
        Self::Api {
            summary: summary.into(),
            source,
        }
    }

    /// Attach the state of a partially applied change to `error`.
    pub fn incomplete(state: serde_json::Value, error: ProviderError) -> Self {
        Self::Incomplete {
            state,
            source: Box::new(error),
        }
    }

    /// State to record despite the error, if the remote object was changed.
    pub fn partial_state(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Incomplete { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Whether this error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { source, .. } if source.is_not_found())
    }

    /// Render the error as an error diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Incomplete { source, .. } => source.to_diagnostic(),
            Self::Api { summary, source } => {
                Diagnostic::error(summary.clone()).with_detail(source.to_string())
            },
            Self::InvalidId {
                id,
                expected,
                reason,
            } => Diagnostic::error("Invalid resource ID format")
                .with_detail(format!(
                    "The resource ID '{}' has an invalid format. It should be '{}'. Error: {}",
                    id, expected, reason
                ))
                .with_attribute("id"),
            other => Diagnostic::error(other.to_string()),
        }
    }
}
