//! Security agent interface
//!
//! The security agent performs the cryptographic work on a message: signing
//! and encrypting outgoing mail, decrypting and verifying incoming mail.

use crate::envelope::MessageEnvelope;
use async_trait::async_trait;
use directgate_policy::{CertificateAttributes, PolicyFilter};
use thiserror::Error;

/// Errors reported by a security agent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("Untrusted sender: {0}")]
    UntrustedSender(String),

    #[error("No trusted recipients")]
    NoRecipients,

    #[error("Untrusted message")]
    UntrustedMessage,

    #[error("Cryptographic failure: {0}")]
    Cryptographic(String),

    #[error("{0}")]
    Other(String),
}

impl From<AgentError> for directgate_common::Error {
    fn from(err: AgentError) -> Self {
        use directgate_common::Error;

        match err {
            AgentError::UntrustedSender(sender) => Error::UntrustedSender(sender),
            AgentError::NoRecipients => Error::NoRecipients,
            other => Error::Agent(other.to_string()),
        }
    }
}

/// The gateway's trust policies, handed to the agent with every envelope
///
/// A certificate is trusted when it satisfies every policy. With no policies
/// configured every certificate is trusted.
#[derive(Debug, Clone, Copy)]
pub struct TrustPolicies<'a> {
    filters: &'a [PolicyFilter],
}

impl<'a> TrustPolicies<'a> {
    pub fn new(filters: &'a [PolicyFilter]) -> Self {
        Self { filters }
    }

    pub fn none() -> TrustPolicies<'static> {
        TrustPolicies { filters: &[] }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a PolicyFilter> {
        self.filters.iter()
    }

    pub fn is_trusted(&self, cert: &CertificateAttributes) -> bool {
        self.filters.iter().all(|filter| filter.is_compliant(cert))
    }

    /// The certificates trusted by every policy, in input order
    pub fn filter_trusted<'c, I>(&self, certs: I) -> Vec<&'c CertificateAttributes>
    where
        I: IntoIterator<Item = &'c CertificateAttributes>,
    {
        certs
            .into_iter()
            .filter(|cert| self.is_trusted(cert))
            .collect()
    }
}

/// Cryptographic processing of envelopes
///
/// Certificates the agent selects for signing, encryption or verification
/// must pass `policies`.
#[async_trait]
pub trait SecurityAgent: Send + Sync {
    /// Protect a message leaving the managed domains
    async fn process_outgoing(
        &self,
        envelope: MessageEnvelope,
        policies: TrustPolicies<'_>,
    ) -> std::result::Result<MessageEnvelope, AgentError>;

    /// Unwrap and verify a message entering the managed domains
    async fn process_incoming(
        &self,
        envelope: MessageEnvelope,
        policies: TrustPolicies<'_>,
    ) -> std::result::Result<MessageEnvelope, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::{AgentError, TrustPolicies};
    use directgate_common::Error;
    use directgate_policy::identifiers::RdnAttributeIdentifier;
    use directgate_policy::{CertificateAttributes, PolicyFilter, PolicySet};

    #[test]
    fn test_trust_policies() {
        let filters: Vec<PolicyFilter> = PolicySet::from_toml_str(
            r#"
[[policy]]
name = "hospital-org"
expression = { op = "contains", operands = [{ attribute = "X509.TBS.Subject.O" }, { literal = "Hospital" }] }

[[policy]]
name = "has-cn"
expression = { op = "{}!", operands = [{ attribute = "X509.TBS.Subject.CN" }] }
"#,
        )
        .unwrap()
        .compile_all()
        .unwrap()
        .into_iter()
        .map(PolicyFilter::new)
        .collect();
        let policies = TrustPolicies::new(&filters);

        let hospital = CertificateAttributes::default()
            .with_subject(RdnAttributeIdentifier::ORGANIZATION, "Hospital")
            .with_subject(RdnAttributeIdentifier::COMMON_NAME, "hospital.example");
        let org_only =
            CertificateAttributes::default().with_subject(RdnAttributeIdentifier::ORGANIZATION, "Hospital");

        assert_eq!(policies.len(), 2);
        assert!(policies.is_trusted(&hospital));
        assert!(!policies.is_trusted(&org_only));
        assert_eq!(policies.filter_trusted([&org_only, &hospital]), vec![&hospital]);
        assert!(TrustPolicies::none().is_trusted(&org_only));
    }

    #[test]
    fn test_agent_error_mapping() {
        assert!(matches!(
            Error::from(AgentError::NoRecipients),
            Error::NoRecipients
        ));
        assert!(matches!(
            Error::from(AgentError::UntrustedSender("x@remote.example".to_string())),
            Error::UntrustedSender(s) if s == "x@remote.example"
        ));

        let err = Error::from(AgentError::Cryptographic("bad signature".to_string()));
        assert_eq!(err.code(), "AGENT_ERROR");
        assert_eq!(
            err.to_string(),
            "Security agent error: Cryptographic failure: bad signature"
        );
    }
}
