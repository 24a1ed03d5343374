//! Error types for DirectGate

use thiserror::Error;

/// Main error type for DirectGate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Gateway is not initialized")]
    NotInitialized,

    #[error("Configured domains mismatch: {configured} configured, {found} found in domain service")]
    ConfiguredDomainsMismatch { configured: usize, found: usize },

    #[error("Security agent returned an invalid envelope")]
    InvalidEnvelopeFromAgent,

    #[error("Security agent produced an empty message")]
    EmptyResultFromAgent,

    #[error("Untrusted sender: {0}")]
    UntrustedSender(String),

    #[error("No trusted recipients")]
    NoRecipients,

    #[error("Policy composition error: {0}")]
    PolicyComposition(String),

    #[error("Security agent error: {0}")]
    Agent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config service error: {0}")]
    Service(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Message processing timed out after {0} seconds")]
    Timeout(u64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DirectGate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotInitialized => "NOT_INITIALIZED",
            Error::ConfiguredDomainsMismatch { .. } => "CONFIGURED_DOMAINS_MISMATCH",
            Error::InvalidEnvelopeFromAgent => "INVALID_ENVELOPE_FROM_AGENT",
            Error::EmptyResultFromAgent => "EMPTY_RESULT_FROM_AGENT",
            Error::UntrustedSender(_) => "UNTRUSTED_SENDER",
            Error::NoRecipients => "NO_RECIPIENTS",
            Error::PolicyComposition(_) => "POLICY_COMPOSITION_ERROR",
            Error::Agent(_) => "AGENT_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Service(_) => "SERVICE_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same operation can never succeed.
    ///
    /// Initialization failures and malformed agent output are fatal; the
    /// transport should not requeue a message rejected for these reasons.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NotInitialized
                | Error::ConfiguredDomainsMismatch { .. }
                | Error::InvalidEnvelopeFromAgent
                | Error::EmptyResultFromAgent
                | Error::PolicyComposition(_)
                | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NotInitialized.code(), "NOT_INITIALIZED");
        assert_eq!(Error::NoRecipients.code(), "NO_RECIPIENTS");
        assert_eq!(
            Error::ConfiguredDomainsMismatch {
                configured: 2,
                found: 1
            }
            .code(),
            "CONFIGURED_DOMAINS_MISMATCH"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::InvalidEnvelopeFromAgent.is_fatal());
        assert!(Error::NotInitialized.is_fatal());
        assert!(!Error::NoRecipients.is_fatal());
        assert!(!Error::Timeout(30).is_fatal());
    }

    #[test]
    fn test_mismatch_message() {
        let err = Error::ConfiguredDomainsMismatch {
            configured: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Configured domains mismatch: 2 configured, 1 found in domain service"
        );
    }
}
