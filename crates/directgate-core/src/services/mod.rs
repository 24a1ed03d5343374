//! Domain and address configuration services
//!
//! The gateway looks up managed domains and resolves addresses through these
//! traits. [`HttpConfigService`] talks to a remote config service;
//! [`StaticConfigService`] serves a fixed in-memory set.

mod http;
mod memory;

pub use http::HttpConfigService;
pub use memory::StaticConfigService;

use async_trait::async_trait;
use directgate_common::types::{Address, AddressId, Domain, MailAddress};
use directgate_common::{GatewayConfig, Result};
use std::sync::Arc;

/// Domain lookups
#[async_trait]
pub trait DomainService: Send + Sync {
    /// Domains matching `names`; unknown names are omitted
    async fn get_domains(&self, names: &[String]) -> Result<Vec<Domain>>;
}

/// Address lookups
#[async_trait]
pub trait AddressService: Send + Sync {
    async fn get_address(&self, address: &MailAddress) -> Result<Option<Address>>;

    async fn get_address_by_id(&self, id: AddressId) -> Result<Option<Address>>;

    /// Addresses matching `addresses`; unknown addresses are omitted
    async fn get_addresses(&self, addresses: &[MailAddress]) -> Result<Vec<Address>>;
}

/// The config services available to a gateway
#[derive(Clone, Default)]
pub struct ConfigServices {
    pub domains: Option<Arc<dyn DomainService>>,
    pub addresses: Option<Arc<dyn AddressService>>,
}

impl ConfigServices {
    /// No config services; domains and postmasters come from configuration only
    pub fn none() -> Self {
        Self::default()
    }

    /// HTTP clients for the configured domain and address managers
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let domains = match &config.domain_manager {
            Some(service) => Some(Arc::new(HttpConfigService::new(service)?) as Arc<dyn DomainService>),
            None => None,
        };
        let addresses = match &config.address_manager {
            Some(service) => {
                Some(Arc::new(HttpConfigService::new(service)?) as Arc<dyn AddressService>)
            }
            None => None,
        };
        Ok(Self { domains, addresses })
    }

    pub fn with_domains(mut self, service: Arc<dyn DomainService>) -> Self {
        self.domains = Some(service);
        self
    }

    pub fn with_addresses(mut self, service: Arc<dyn AddressService>) -> Self {
        self.addresses = Some(service);
        self
    }

    pub fn has_domain_service(&self) -> bool {
        self.domains.is_some()
    }

    pub fn has_address_service(&self) -> bool {
        self.addresses.is_some()
    }
}

impl std::fmt::Debug for ConfigServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigServices")
            .field("domains", &self.has_domain_service())
            .field("addresses", &self.has_address_service())
            .finish()
    }
}
