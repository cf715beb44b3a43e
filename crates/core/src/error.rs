//! Error taxonomy for the registration workflow.
//!
//! - [`ValidationError`]: malformed caller input, raised before any network call
//! - [`RegistryError`]: a registry operation failed (`Unavailable`) or was refused (`Rejected`)
//! - [`RegistrationError`]: everything a workflow step can fail with, including
//!   `AmbiguousMatch`
//! - [`ConfigError`]: configuration could not be read or failed validation

use intake_types::{GenderError, ResourceId};
use std::path::PathBuf;
use std::time::Duration;

/// Boxed error carried as the underlying cause of a registry failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} is not a valid calendar date (expected YYYY-MM-DD): '{value}'")]
    InvalidDate { field: &'static str, value: String },
    #[error(transparent)]
    Gender(#[from] GenderError),
    #[error("region must be a two-letter code, got '{0}'")]
    InvalidRegion(String),
    #[error("{field} contains characters not allowed in a phone number: '{value}'")]
    InvalidPhone { field: &'static str, value: String },
    #[error("{field} is not a valid identifier: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Transport failure, server error, malformed response or timeout. Safe to retry the step.
    #[error("registry unavailable during {operation}: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// The registry refused the request as invalid. Not retried automatically.
    #[error("registry rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },
}

impl RegistryError {
    pub fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error as the cause of an unavailable registry.
    pub fn unavailable_from<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unavailable {
            operation,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn timed_out(operation: &'static str, after: Duration) -> Self {
        Self::unavailable(
            operation,
            format!("no response within {} ms", after.as_millis()),
        )
    }

    pub fn rejected(operation: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            status,
            message: message.into(),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Unavailable { operation, .. } | Self::Rejected { operation, .. } => *operation,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("invalid registration input: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(
        "ambiguous match: {top} ({top_score:.2}) and {runner_up} ({runner_up_score:.2}) differ by no more than {margin:.2}; manual adjudication required"
    )]
    AmbiguousMatch {
        top: ResourceId,
        top_score: f64,
        runner_up: ResourceId,
        runner_up_score: f64,
        margin: f64,
    },
}

impl RegistrationError {
    /// True when re-running the failed step may succeed without any change by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Registry(err) if err.is_unavailable())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration file {path}: {source}", path = path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
