//! Certificate attributes and the named fields policies extract from them

use crate::error::{PolicyError, PolicyResult};
use crate::identifiers::RdnAttributeIdentifier;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key usage bit values, as carried in the `KeyUsage` attribute
pub mod key_usage {
    pub const DIGITAL_SIGNATURE: i64 = 128;
    pub const NON_REPUDIATION: i64 = 64;
    pub const KEY_ENCIPHERMENT: i64 = 32;
    pub const DATA_ENCIPHERMENT: i64 = 16;
    pub const KEY_AGREEMENT: i64 = 8;
    pub const KEY_CERT_SIGN: i64 = 4;
    pub const CRL_SIGN: i64 = 2;
    pub const ENCIPHER_ONLY: i64 = 1;
    pub const DECIPHER_ONLY: i64 = 32768;
}

/// Fields already extracted from an X.509 certificate
///
/// Directory names are keyed by attribute OID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAttributes {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub subject: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub issuer: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub signature_algorithm: String,
    #[serde(default)]
    pub public_key_algorithm: String,
    #[serde(default)]
    pub public_key_size: i64,
    #[serde(default)]
    pub key_usage: i64,
    #[serde(default)]
    pub extended_key_usage: Vec<String>,
    #[serde(default)]
    pub policy_oids: Vec<String>,
    #[serde(default)]
    pub subject_alt_names: Vec<String>,
    #[serde(default)]
    pub crl_distribution_points: Vec<String>,
    #[serde(default)]
    pub basic_constraints_ca: Option<bool>,
}

impl CertificateAttributes {
    /// Add a subject directory-name value
    pub fn with_subject(mut self, attribute: RdnAttributeIdentifier, value: impl Into<String>) -> Self {
        self.subject
            .entry(attribute.oid.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// Add an issuer directory-name value
    pub fn with_issuer(mut self, attribute: RdnAttributeIdentifier, value: impl Into<String>) -> Self {
        self.issuer
            .entry(attribute.oid.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// Set the public key algorithm OID and key size
    pub fn with_public_key(mut self, algorithm_oid: impl Into<String>, size: i64) -> Self {
        self.public_key_algorithm = algorithm_oid.into();
        self.public_key_size = size;
        self
    }
}

/// Something a policy can pull attribute values from
pub trait AttributeSource {
    fn extract(&self, field: &AttributeField) -> Value;
}

impl AttributeSource for CertificateAttributes {
    fn extract(&self, field: &AttributeField) -> Value {
        match field {
            AttributeField::Version => Value::Integer(self.version),
            AttributeField::SerialNumber => Value::String(self.serial_number.clone()),
            AttributeField::SignatureAlgorithm => Value::String(self.signature_algorithm.clone()),
            AttributeField::Subject(rdn) => rdn_values(&self.subject, rdn),
            AttributeField::Issuer(rdn) => rdn_values(&self.issuer, rdn),
            AttributeField::PublicKeyAlgorithm => Value::String(self.public_key_algorithm.clone()),
            AttributeField::PublicKeySize => Value::Integer(self.public_key_size),
            AttributeField::KeyUsage => Value::Integer(self.key_usage),
            AttributeField::ExtendedKeyUsage => Value::set(self.extended_key_usage.iter().cloned()),
            AttributeField::PolicyOids => Value::set(self.policy_oids.iter().cloned()),
            AttributeField::SubjectAltName => Value::set(self.subject_alt_names.iter().cloned()),
            AttributeField::CrlDistributionPoints => {
                Value::set(self.crl_distribution_points.iter().cloned())
            }
            AttributeField::BasicConstraintsCa => {
                Value::Boolean(self.basic_constraints_ca.unwrap_or(false))
            }
        }
    }
}

fn rdn_values(names: &BTreeMap<String, Vec<String>>, rdn: &RdnAttributeIdentifier) -> Value {
    Value::set(names.get(rdn.oid).into_iter().flatten().cloned())
}

const SUBJECT_PREFIX: &str = "X509.TBS.Subject.";
const ISSUER_PREFIX: &str = "X509.TBS.Issuer.";

/// A named attribute leaf of a policy expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeField {
    Version,
    SerialNumber,
    SignatureAlgorithm,
    Subject(RdnAttributeIdentifier),
    Issuer(RdnAttributeIdentifier),
    PublicKeyAlgorithm,
    PublicKeySize,
    KeyUsage,
    ExtendedKeyUsage,
    PolicyOids,
    SubjectAltName,
    CrlDistributionPoints,
    BasicConstraintsCa,
}

impl AttributeField {
    /// Resolve a dotted attribute name such as `X509.TBS.Subject.CN`
    pub fn parse(name: &str) -> PolicyResult<Self> {
        let field = match name {
            "X509.Version" => Self::Version,
            "X509.SerialNumber" => Self::SerialNumber,
            "X509.Algorithm" => Self::SignatureAlgorithm,
            "X509.TBS.SubjectPublicKeyInfo.Algorithm" => Self::PublicKeyAlgorithm,
            "X509.TBS.SubjectPublicKeyInfo.Size" => Self::PublicKeySize,
            "X509.TBS.EXTENSION.KeyUsage" => Self::KeyUsage,
            "X509.TBS.EXTENSION.ExtendedKeyUsage" => Self::ExtendedKeyUsage,
            "X509.TBS.EXTENSION.CertificatePolicies.PolicyOIDs" => Self::PolicyOids,
            "X509.TBS.EXTENSION.SubjectAltName" => Self::SubjectAltName,
            "X509.TBS.EXTENSION.CRLDistributionPoints" => Self::CrlDistributionPoints,
            "X509.TBS.EXTENSION.BasicConstraints.CA" => Self::BasicConstraintsCa,
            other => {
                if let Some(rdn) = other.strip_prefix(SUBJECT_PREFIX) {
                    Self::Subject(*rdn_identifier(other, rdn)?)
                } else if let Some(rdn) = other.strip_prefix(ISSUER_PREFIX) {
                    Self::Issuer(*rdn_identifier(other, rdn)?)
                } else {
                    return Err(PolicyError::UnknownAttribute(other.to_string()));
                }
            }
        };
        Ok(field)
    }

    /// Type of the value this field extracts
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Version | Self::PublicKeySize | Self::KeyUsage => ValueType::Integer,
            Self::SerialNumber | Self::SignatureAlgorithm | Self::PublicKeyAlgorithm => {
                ValueType::String
            }
            Self::Subject(_)
            | Self::Issuer(_)
            | Self::ExtendedKeyUsage
            | Self::PolicyOids
            | Self::SubjectAltName
            | Self::CrlDistributionPoints => ValueType::StringSet,
            Self::BasicConstraintsCa => ValueType::Boolean,
        }
    }
}

fn rdn_identifier(name: &str, rdn: &str) -> PolicyResult<&'static RdnAttributeIdentifier> {
    RdnAttributeIdentifier::from_name(rdn)
        .ok_or_else(|| PolicyError::UnknownAttribute(name.to_string()))
}

impl fmt::Display for AttributeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version => f.write_str("X509.Version"),
            Self::SerialNumber => f.write_str("X509.SerialNumber"),
            Self::SignatureAlgorithm => f.write_str("X509.Algorithm"),
            Self::Subject(rdn) => write!(f, "{}{}", SUBJECT_PREFIX, rdn.name),
            Self::Issuer(rdn) => write!(f, "{}{}", ISSUER_PREFIX, rdn.name),
            Self::PublicKeyAlgorithm => f.write_str("X509.TBS.SubjectPublicKeyInfo.Algorithm"),
            Self::PublicKeySize => f.write_str("X509.TBS.SubjectPublicKeyInfo.Size"),
            Self::KeyUsage => f.write_str("X509.TBS.EXTENSION.KeyUsage"),
            Self::ExtendedKeyUsage => f.write_str("X509.TBS.EXTENSION.ExtendedKeyUsage"),
            Self::PolicyOids => f.write_str("X509.TBS.EXTENSION.CertificatePolicies.PolicyOIDs"),
            Self::SubjectAltName => f.write_str("X509.TBS.EXTENSION.SubjectAltName"),
            Self::CrlDistributionPoints => f.write_str("X509.TBS.EXTENSION.CRLDistributionPoints"),
            Self::BasicConstraintsCa => f.write_str("X509.TBS.EXTENSION.BasicConstraints.CA"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::PublicKeyAlgorithmIdentifier;

    #[test]
    fn test_parse_subject_field() {
        let field = AttributeField::parse("X509.TBS.Subject.CN").unwrap();
        assert_eq!(field, AttributeField::Subject(RdnAttributeIdentifier::COMMON_NAME));
        assert_eq!(field.value_type(), ValueType::StringSet);
        assert_eq!(field.to_string(), "X509.TBS.Subject.CN");
    }

    #[test]
    fn test_parse_unknown_rdn() {
        assert_eq!(
            AttributeField::parse("X509.TBS.Issuer.XX"),
            Err(PolicyError::UnknownAttribute("X509.TBS.Issuer.XX".to_string()))
        );
        assert!(AttributeField::parse("X509.Nothing").is_err());
    }

    #[test]
    fn test_display_round_trips_every_simple_field() {
        let fields = [
            AttributeField::Version,
            AttributeField::PublicKeySize,
            AttributeField::PolicyOids,
            AttributeField::BasicConstraintsCa,
        ];
        for field in fields {
            assert_eq!(AttributeField::parse(&field.to_string()).unwrap(), field);
        }
    }

    #[test]
    fn test_extract() {
        let cert = CertificateAttributes::default()
            .with_subject(RdnAttributeIdentifier::COMMON_NAME, "hospital.example")
            .with_subject(RdnAttributeIdentifier::COMMON_NAME, "Hospital")
            .with_public_key(PublicKeyAlgorithmIdentifier::RSA.oid, 2048);

        assert_eq!(
            cert.extract(&AttributeField::Subject(RdnAttributeIdentifier::COMMON_NAME)),
            Value::set(["Hospital", "hospital.example"])
        );
        assert_eq!(
            cert.extract(&AttributeField::Issuer(RdnAttributeIdentifier::ORGANIZATION)),
            Value::set(Vec::<String>::new())
        );
        assert_eq!(cert.extract(&AttributeField::PublicKeySize), Value::Integer(2048));
        assert_eq!(
            cert.extract(&AttributeField::BasicConstraintsCa),
            Value::Boolean(false)
        );
    }
}
