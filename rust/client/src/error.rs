use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of failures, used by callers to decide whether a
/// completed rollout is affected or only a subsequent render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised by `reset`, `step` or `close`. Fatal to the episode, never retried.
    EnvironmentFailure,
    /// Bad input handed to a render call. Local to that call.
    InputContractViolation,
    /// Invalid settings or channel-name lists.
    ConfigurationError,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from '{endpoint}': {reason}")]
    Protocol { endpoint: String, reason: String },

    #[error("environment failure: {0}")]
    Environment(String),

    #[error("invalid action {0}: expected 0 (do nothing), 1 (repair) or 2 (sell)")]
    InvalidAction(i64),

    #[error("observation width changed from {expected} to {actual} at step {step}")]
    ObservationWidth {
        step: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: String,
        actual: usize,
    },

    #[error("{names} channel names supplied for observations of width {width}")]
    ChannelNames { names: usize, width: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to render figure '{title}': {reason}")]
    Render { title: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http { .. }
            | Error::Protocol { .. }
            | Error::Environment(_)
            | Error::InvalidAction(_)
            | Error::ObservationWidth { .. } => ErrorCategory::EnvironmentFailure,
            Error::LengthMismatch { .. } | Error::Render { .. } => {
                ErrorCategory::InputContractViolation
            }
            Error::ChannelNames { .. } | Error::Config(_) => ErrorCategory::ConfigurationError,
            Error::Io(_) | Error::Json(_) => ErrorCategory::ConfigurationError,
        }
    }

    pub(crate) fn protocol(endpoint: &str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}
