//! Common types for DirectGate

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for domains
pub type DomainId = Uuid;

/// Unique identifier for addresses
pub type AddressId = Uuid;

/// Email address
///
/// The domain part is stored lowercased; the local part is kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailAddress {
    pub local: String,
    pub domain: String,
}

impl MailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into().to_lowercase(),
        }
    }

    /// Parse an email address from a string
    ///
    /// Accepts the bare `local@domain` form as well as the angle-bracketed
    /// reverse-path form (`<local@domain>`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix('<')
            .and_then(|inner| inner.strip_suffix('>'))
            .unwrap_or(s)
            .trim();

        let (local, domain) = s.rsplit_once('@')?;
        if local.is_empty() || domain.is_empty() || domain.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::new(local, domain))
    }

    /// Case-insensitive comparison of the full address
    pub fn matches(&self, other: &MailAddress) -> bool {
        self.domain.eq_ignore_ascii_case(&other.domain)
            && self.local.eq_ignore_ascii_case(&other.local)
    }

    /// Normalized key used for recipient de-duplication
    pub fn key(&self) -> String {
        format!("{}@{}", self.local.to_lowercase(), self.domain)
    }

    /// Whether the address belongs to `domain` (case-insensitive)
    pub fn in_domain(&self, domain: &str) -> bool {
        self.domain.eq_ignore_ascii_case(domain)
    }
}

impl std::fmt::Display for MailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for MailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::Validation(format!("Invalid email address: {}", s)))
    }
}

/// A managed domain as known to the domain service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    /// Address id of the domain's postmaster, if one is registered
    #[serde(default)]
    pub postmaster_id: Option<AddressId>,
}

/// A resolved, policy-known identity returned by the address service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    #[serde(default)]
    pub domain_id: Option<DomainId>,
    pub email_address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Delivery type used by routing (e.g. "SMTP", "XDR")
    #[serde(default, rename = "type")]
    pub address_type: Option<String>,
    #[serde(default)]
    pub postmaster: bool,
}

impl Address {
    /// Whether this address refers to the given mail address
    pub fn matches(&self, address: &MailAddress) -> bool {
        self.to_mail_address()
            .map(|own| own.matches(address))
            .unwrap_or(false)
    }

    /// Parse the stored email into a mail address
    pub fn to_mail_address(&self) -> Option<MailAddress> {
        MailAddress::parse(&self.email_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_address_parse() {
        let email = MailAddress::parse("user@Example.COM").unwrap();
        assert_eq!(email.local, "user");
        assert_eq!(email.domain, "example.com");
        assert_eq!(email.to_string(), "user@example.com");
    }

    #[test]
    fn test_mail_address_angle_brackets() {
        let email = MailAddress::parse(" <postmaster@hospital.org> ").unwrap();
        assert_eq!(email.local, "postmaster");
        assert_eq!(email.domain, "hospital.org");
    }

    #[test]
    fn test_mail_address_invalid() {
        assert!(MailAddress::parse("invalid").is_none());
        assert!(MailAddress::parse("@example.com").is_none());
        assert!(MailAddress::parse("user@").is_none());
        assert!(MailAddress::parse("postmaster").is_none());
    }

    #[test]
    fn test_mail_address_matches_case_insensitive() {
        let a = MailAddress::parse("Dr.Who@Hospital.org").unwrap();
        let b = MailAddress::parse("dr.who@hospital.ORG").unwrap();
        assert!(a.matches(&b));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_address_matches() {
        let address = Address {
            id: Uuid::new_v4(),
            domain_id: None,
            email_address: "nurse@clinic.example".to_string(),
            display_name: None,
            address_type: Some("SMTP".to_string()),
            postmaster: false,
        };
        assert!(address.matches(&MailAddress::parse("NURSE@clinic.example").unwrap()));
        assert!(!address.matches(&MailAddress::parse("doctor@clinic.example").unwrap()));
    }
}
