//! Policy engine errors

use thiserror::Error;

/// Policy error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Policy composition error: {0}")]
    Composition(String),
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),
    #[error("Policy evaluation error: {0}")]
    Evaluation(String),
    #[error("Invalid policy definition: {0}")]
    Definition(String),
}

/// Policy result type
pub type PolicyResult<T> = Result<T, PolicyError>;

impl From<PolicyError> for directgate_common::Error {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Evaluation(msg) => directgate_common::Error::Validation(msg),
            other => directgate_common::Error::PolicyComposition(other.to_string()),
        }
    }
}
