//! Configuration for DirectGate

use crate::types::MailAddress;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Domains this gateway is authoritative for
    pub domains: Vec<String>,

    /// Postmaster address per managed domain
    ///
    /// Domains without an entry default to `postmaster@<domain>`.
    #[serde(default)]
    pub postmasters: BTreeMap<String, String>,

    /// Raw copies of every message, taken on receipt
    #[serde(default)]
    pub raw_message: ProcessingSettings,

    /// Incoming (external sender) messages
    #[serde(default)]
    pub incoming: ProcessingSettings,

    /// Outgoing (managed sender) messages
    #[serde(default)]
    pub outgoing: ProcessingSettings,

    /// Rejected messages
    #[serde(default)]
    pub bad_message: ProcessingSettings,

    /// Ordered routing rules for incoming domain recipients
    #[serde(default)]
    pub incoming_routes: Vec<RouteConfig>,

    /// Domain manager (config service) endpoint
    pub domain_manager: Option<ServiceConfig>,

    /// Address manager (config service) endpoint
    pub address_manager: Option<ServiceConfig>,

    /// Deadline for processing a single message, in seconds
    pub processing_timeout_secs: Option<u64>,

    /// Path to a trust policy definition file
    pub policies: Option<PathBuf>,
}

/// Per-stage folder and relay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Folder receiving one archived copy per message, if any
    #[serde(default)]
    pub copy_folder: Option<PathBuf>,

    /// Whether the transport may relay the message onward after acceptance
    #[serde(default = "default_enable_relay")]
    pub enable_relay: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            copy_folder: None,
            enable_relay: default_enable_relay(),
        }
    }
}

fn default_enable_relay() -> bool {
    true
}

impl ProcessingSettings {
    /// Settings that archive into `folder` and never relay
    pub fn with_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            copy_folder: Some(folder.into()),
            enable_relay: false,
        }
    }

    /// Whether a copy folder is configured
    pub fn has_copy_folder(&self) -> bool {
        self.copy_folder.is_some()
    }

    /// Create the copy folder if one is configured
    pub async fn ensure_folders(&self) -> crate::Result<()> {
        if let Some(folder) = &self.copy_folder {
            tokio::fs::create_dir_all(folder).await.map_err(|e| {
                crate::Error::Storage(format!(
                    "Failed to create folder {}: {}",
                    folder.display(),
                    e
                ))
            })?;
            debug!(folder = %folder.display(), "Ensured copy folder");
        }
        Ok(())
    }
}

/// A single incoming route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Recipient pattern: `*`, `type:<AddressType>`, `@domain`, `domain` or `user@domain`
    pub pattern: String,

    /// Destination folder for routed copies
    pub copy_folder: PathBuf,
}

/// Config service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service
    pub url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_service_timeout")]
    pub timeout_ms: u64,
}

fn default_service_timeout() -> u64 {
    5000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl GatewayConfig {
    /// Minimal configuration for a set of managed domains
    pub fn for_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            logging: LoggingConfig::default(),
            domains: domains.into_iter().map(Into::into).collect(),
            postmasters: BTreeMap::new(),
            raw_message: ProcessingSettings::default(),
            incoming: ProcessingSettings::default(),
            outgoing: ProcessingSettings::default(),
            bad_message: ProcessingSettings::default(),
            incoming_routes: Vec::new(),
            domain_manager: None,
            address_manager: None,
            processing_timeout_secs: None,
            policies: None,
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./directgate.toml"),
            PathBuf::from("/etc/directgate/directgate.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> crate::Result<()> {
        if self.domains.is_empty() {
            return Err(crate::Error::Config(
                "At least one managed domain is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for domain in &self.domains {
            let name = domain.trim().to_lowercase();
            if name.is_empty() {
                return Err(crate::Error::Config("Empty domain name".to_string()));
            }
            if !seen.insert(name) {
                return Err(crate::Error::Config(format!(
                    "Duplicate domain: {}",
                    domain
                )));
            }
        }

        for (domain, postmaster) in &self.postmasters {
            if !seen.contains(&domain.trim().to_lowercase()) {
                return Err(crate::Error::Config(format!(
                    "Postmaster configured for unmanaged domain: {}",
                    domain
                )));
            }
            if MailAddress::parse(postmaster).is_none() {
                return Err(crate::Error::Config(format!(
                    "Invalid postmaster address for {}: {}",
                    domain, postmaster
                )));
            }
        }

        for route in &self.incoming_routes {
            if route.pattern.trim().is_empty() {
                return Err(crate::Error::Config(
                    "Route pattern must not be empty".to_string(),
                ));
            }
            if route.copy_folder.as_os_str().is_empty() {
                return Err(crate::Error::Config(format!(
                    "Route {} has no copy folder",
                    route.pattern
                )));
            }
        }

        Ok(())
    }

    /// Whether domains are loaded from a domain manager
    pub fn has_domain_manager(&self) -> bool {
        self.domain_manager.is_some()
    }

    /// Whether addresses are resolved via an address manager
    pub fn has_address_manager(&self) -> bool {
        self.address_manager.is_some()
    }

    /// Whether incoming routes are configured
    pub fn has_routes(&self) -> bool {
        !self.incoming_routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = ProcessingSettings::default();
        assert!(settings.copy_folder.is_none());
        assert!(settings.enable_relay);

        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
domains = ["hospital.example", "clinic.example"]
processing_timeout_secs = 30

[postmasters]
"hospital.example" = "admin@hospital.example"

[incoming]
copy_folder = "/var/spool/directgate/incoming"
enable_relay = false

[[incoming_routes]]
pattern = "type:XDR"
copy_folder = "/var/spool/directgate/xdr"

[address_manager]
url = "http://localhost:6692/config"
"#;

        let config = GatewayConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.domains.len(), 2);
        assert_eq!(
            config.postmasters.get("hospital.example").map(String::as_str),
            Some("admin@hospital.example")
        );
        assert!(!config.incoming.enable_relay);
        assert!(config.outgoing.enable_relay);
        assert_eq!(config.incoming_routes[0].pattern, "type:XDR");
        assert_eq!(config.address_manager.as_ref().unwrap().timeout_ms, 5000);
        assert!(config.has_address_manager());
        assert!(!config.has_domain_manager());
        assert_eq!(config.processing_timeout_secs, Some(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_domains() {
        let config = GatewayConfig::for_domains(Vec::<String>::new());
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_domains() {
        let config = GatewayConfig::for_domains(["a.example", "A.EXAMPLE"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_foreign_postmaster() {
        let mut config = GatewayConfig::for_domains(["a.example"]);
        config
            .postmasters
            .insert("b.example".to_string(), "postmaster@b.example".to_string());
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_ensure_folders() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("raw").join("nested");
        let settings = ProcessingSettings::with_folder(&folder);
        settings.ensure_folders().await.unwrap();
        assert!(folder.is_dir());
    }
}
