//! Attribute identifier registry
//!
//! Static tables mapping short attribute and algorithm names to their
//! canonical object identifiers. Lookups are exact and case-sensitive and
//! return `None` for unknown input; whether an unknown name is an error is
//! up to the caller.

macro_rules! identifier_table {
    (
        $(#[$meta:meta])*
        $table:ident {
            $( $(#[$item_meta:meta])* $constant:ident => ($name:expr, $oid:expr), )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $table {
            /// Short name, e.g. `CN`
            pub name: &'static str,
            /// Dotted object identifier
            pub oid: &'static str,
        }

        impl $table {
            $(
                $(#[$item_meta])*
                pub const $constant: Self = Self { name: $name, oid: $oid };
            )+

            const ALL: &'static [Self] = &[$(Self::$constant),+];

            /// Every identifier in the table
            pub fn all() -> &'static [Self] {
                Self::ALL
            }

            /// Look up an identifier by its exact name
            pub fn from_name(name: &str) -> Option<&'static Self> {
                Self::ALL.iter().find(|id| id.name == name)
            }

            /// Look up an identifier by its dotted OID
            pub fn from_oid(oid: &str) -> Option<&'static Self> {
                Self::ALL.iter().find(|id| id.oid == oid)
            }
        }

        impl std::fmt::Display for $table {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name)
            }
        }
    };
}

identifier_table! {
    /// Relative distinguished name attributes of X.500 directory names
    RdnAttributeIdentifier {
        COMMON_NAME => ("CN", "2.5.4.3"),
        COUNTRY => ("C", "2.5.4.6"),
        LOCALITY => ("L", "2.5.4.7"),
        STATE => ("ST", "2.5.4.8"),
        STREET => ("STREET", "2.5.4.9"),
        ORGANIZATION => ("O", "2.5.4.10"),
        ORGANIZATIONAL_UNIT => ("OU", "2.5.4.11"),
        TITLE => ("T", "2.5.4.12"),
        SERIAL_NUMBER => ("SERIALNUMBER", "2.5.4.5"),
        SURNAME => ("SURNAME", "2.5.4.4"),
        GIVEN_NAME => ("GIVENNAME", "2.5.4.42"),
        INITIALS => ("INITIALS", "2.5.4.43"),
        GENERATION_QUALIFIER => ("GENERATION", "2.5.4.44"),
        DN_QUALIFIER => ("DNQUALIFIER", "2.5.4.46"),
        PSEUDONYM => ("PSEUDONYM", "2.5.4.65"),
        EMAIL_ADDRESS => ("E", "1.2.840.113549.1.9.1"),
        DOMAIN_COMPONENT => ("DC", "0.9.2342.19200300.100.1.25"),
        USER_ID => ("UID", "0.9.2342.19200300.100.1.1"),
    }
}

identifier_table! {
    /// Subject public key algorithms
    PublicKeyAlgorithmIdentifier {
        RSA => ("RSA", "1.2.840.113549.1.1.1"),
        DSA => ("DSA", "1.2.840.10040.4.1"),
        EC => ("EC", "1.2.840.10045.2.1"),
    }
}

identifier_table! {
    /// Certificate signature algorithms
    SignatureAlgorithmIdentifier {
        SHA1_WITH_RSA => ("SHA1withRSA", "1.2.840.113549.1.1.5"),
        SHA256_WITH_RSA => ("SHA256withRSA", "1.2.840.113549.1.1.11"),
        SHA384_WITH_RSA => ("SHA384withRSA", "1.2.840.113549.1.1.12"),
        SHA512_WITH_RSA => ("SHA512withRSA", "1.2.840.113549.1.1.13"),
        SHA1_WITH_DSA => ("SHA1withDSA", "1.2.840.10040.4.3"),
        SHA256_WITH_ECDSA => ("SHA256withECDSA", "1.2.840.10045.4.3.2"),
        SHA384_WITH_ECDSA => ("SHA384withECDSA", "1.2.840.10045.4.3.3"),
    }
}

identifier_table! {
    /// Extended key usage purposes
    ExtendedKeyUsageIdentifier {
        SERVER_AUTH => ("serverAuth", "1.3.6.1.5.5.7.3.1"),
        CLIENT_AUTH => ("clientAuth", "1.3.6.1.5.5.7.3.2"),
        CODE_SIGNING => ("codeSigning", "1.3.6.1.5.5.7.3.3"),
        EMAIL_PROTECTION => ("emailProtection", "1.3.6.1.5.5.7.3.4"),
        TIME_STAMPING => ("timeStamping", "1.3.6.1.5.5.7.3.8"),
        OCSP_SIGNING => ("OCSPSigning", "1.3.6.1.5.5.7.3.9"),
        ANY_EXTENDED_KEY_USAGE => ("anyExtendedKeyUsage", "2.5.29.37.0"),
    }
}

/// Result of a lookup across every table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierMatch {
    /// Which table matched
    pub table: &'static str,
    pub name: &'static str,
    pub oid: &'static str,
}

/// Resolve a name or OID against all identifier tables
pub fn lookup(name_or_oid: &str) -> Vec<IdentifierMatch> {
    let mut matches = Vec::new();

    macro_rules! search {
        ($table:ident, $label:expr) => {
            if let Some(id) =
                $table::from_name(name_or_oid).or_else(|| $table::from_oid(name_or_oid))
            {
                matches.push(IdentifierMatch {
                    table: $label,
                    name: id.name,
                    oid: id.oid,
                });
            }
        };
    }

    search!(RdnAttributeIdentifier, "rdn");
    search!(PublicKeyAlgorithmIdentifier, "public_key_algorithm");
    search!(SignatureAlgorithmIdentifier, "signature_algorithm");
    search!(ExtendedKeyUsageIdentifier, "extended_key_usage");

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdn_names() {
        assert_eq!(RdnAttributeIdentifier::COMMON_NAME.name, "CN");
        assert_eq!(RdnAttributeIdentifier::COUNTRY.name, "C");
    }

    #[test]
    fn test_rdn_from_name() {
        let cn = RdnAttributeIdentifier::from_name("CN").unwrap();
        assert_eq!(cn, &RdnAttributeIdentifier::COMMON_NAME);
        assert_eq!(cn.oid, "2.5.4.3");
        assert!(RdnAttributeIdentifier::from_name("CN.").is_none());
        assert!(RdnAttributeIdentifier::from_name("cn").is_none());
    }

    #[test]
    fn test_rdn_from_oid() {
        let org = RdnAttributeIdentifier::from_oid("2.5.4.10").unwrap();
        assert_eq!(org.name, "O");
        assert!(RdnAttributeIdentifier::from_oid("2.5.4.999").is_none());
    }

    #[test]
    fn test_public_key_algorithms() {
        let rsa = PublicKeyAlgorithmIdentifier::from_name("RSA").unwrap();
        assert_eq!(rsa.oid, "1.2.840.113549.1.1.1");
        assert_eq!(rsa.name, "RSA");
        assert_eq!(
            PublicKeyAlgorithmIdentifier::from_oid("1.2.840.10040.4.1"),
            Some(&PublicKeyAlgorithmIdentifier::DSA)
        );
    }

    #[test]
    fn test_tables_have_unique_entries() {
        let names: std::collections::HashSet<_> =
            RdnAttributeIdentifier::all().iter().map(|id| id.name).collect();
        let oids: std::collections::HashSet<_> =
            RdnAttributeIdentifier::all().iter().map(|id| id.oid).collect();
        assert_eq!(names.len(), RdnAttributeIdentifier::all().len());
        assert_eq!(oids.len(), RdnAttributeIdentifier::all().len());
    }

    #[test]
    fn test_lookup_across_tables() {
        let matches = lookup("1.3.6.1.5.5.7.3.4");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "emailProtection");
        assert_eq!(matches[0].table, "extended_key_usage");

        assert!(lookup("nope").is_empty());
    }
}
