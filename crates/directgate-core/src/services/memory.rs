use super::{AddressService, DomainService};
use async_trait::async_trait;
use directgate_common::types::{Address, AddressId, Domain, MailAddress};
use directgate_common::Result;

/// Fixed in-memory domains and addresses
#[derive(Debug, Clone, Default)]
pub struct StaticConfigService {
    domains: Vec<Domain>,
    addresses: Vec<Address>,
}

impl StaticConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domains.push(domain);
        self
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    fn find(&self, address: &MailAddress) -> Option<&Address> {
        self.addresses.iter().find(|a| a.matches(address))
    }
}

#[async_trait]
impl DomainService for StaticConfigService {
    async fn get_domains(&self, names: &[String]) -> Result<Vec<Domain>> {
        Ok(self
            .domains
            .iter()
            .filter(|d| names.iter().any(|n| n.eq_ignore_ascii_case(&d.name)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AddressService for StaticConfigService {
    async fn get_address(&self, address: &MailAddress) -> Result<Option<Address>> {
        Ok(self.find(address).cloned())
    }

    async fn get_address_by_id(&self, id: AddressId) -> Result<Option<Address>> {
        Ok(self.addresses.iter().find(|a| a.id == id).cloned())
    }

    async fn get_addresses(&self, addresses: &[MailAddress]) -> Result<Vec<Address>> {
        Ok(addresses
            .iter()
            .filter_map(|a| self.find(a))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn address(email: &str) -> Address {
        Address {
            id: Uuid::new_v4(),
            domain_id: None,
            email_address: email.to_string(),
            display_name: None,
            address_type: None,
            postmaster: false,
        }
    }

    #[tokio::test]
    async fn test_lookups_omit_unknown() {
        let service = StaticConfigService::new()
            .with_address(address("a@hospital.example"))
            .with_address(address("c@hospital.example"))
            .with_domain(Domain {
                id: Uuid::new_v4(),
                name: "hospital.example".to_string(),
                postmaster_id: None,
            });

        let found = service
            .get_addresses(&[
                MailAddress::new("a", "hospital.example"),
                MailAddress::new("b", "hospital.example"),
                MailAddress::new("C", "HOSPITAL.example"),
            ])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        assert!(service
            .get_address(&MailAddress::new("b", "hospital.example"))
            .await
            .unwrap()
            .is_none());

        let domains = service
            .get_domains(&["Hospital.Example".to_string(), "clinic.example".to_string()])
            .await
            .unwrap();
        assert_eq!(domains.len(), 1);
    }
}
