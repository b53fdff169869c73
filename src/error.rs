//! Error types surfaced by the comparison engine.
//!
//! Storage internals stay on `anyhow` so every failure carries the context of what was being
//! attempted; the engine maps them into [`EngineError::Storage`] at its boundary.

use thiserror::Error;

use crate::db::models::ComparisonStatus;

/// Input rejected before anything is written.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("screenshot name must not be empty")]
    EmptyName,

    #[error("invalid screenshot name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid properties: {0}")]
    InvalidProperties(String),

    #[error("invalid threshold {0}: must be a finite, non-negative number")]
    InvalidThreshold(f64),

    #[error("cannot move comparison from {from} to {to}")]
    InvalidTransition {
        from: ComparisonStatus,
        to: ComparisonStatus,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("comparison not found: {0}")]
    NotFound(String),

    /// The image a review decision depends on is gone from disk.
    #[error("comparison {id} has no image at {path}")]
    MissingImage { id: String, path: String },

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// True when the caller sent something wrong, as opposed to the engine failing.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::NotFound(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage(anyhow::Error::new(err))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_faults_are_validation_and_not_found() {
        assert!(EngineError::from(ValidationError::EmptyName).is_client_fault());
        assert!(EngineError::NotFound("abc".into()).is_client_fault());
        assert!(!EngineError::Storage(anyhow::anyhow!("disk full")).is_client_fault());
        assert!(!EngineError::MissingImage {
            id: "a".into(),
            path: "/tmp/a.png".into(),
        }
        .is_client_fault());
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = ValidationError::InvalidTransition {
            from: ComparisonStatus::Error,
            to: ComparisonStatus::Accepted,
        };
        assert_eq!(err.to_string(), "cannot move comparison from error to accepted");
    }
}
