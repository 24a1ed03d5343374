//! Managed domains and their postmasters

use crate::services::AddressService;
use directgate_common::types::{Domain, MailAddress};
use directgate_common::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

const POSTMASTER: &str = "postmaster";

/// Whether a raw sender is the local postmaster (`postmaster`, no domain)
pub fn is_local_postmaster(sender: &str) -> bool {
    let sender = sender.trim();
    let sender = sender
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(sender)
        .trim();
    sender.eq_ignore_ascii_case(POSTMASTER)
}

/// Managed domain set with one postmaster per domain
///
/// Keys are lowercased domain names. Built once during gateway
/// initialization and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct DomainPostmasters {
    postmasters: BTreeMap<String, MailAddress>,
}

impl DomainPostmasters {
    /// Register `domains`, taking postmasters from `configured` and
    /// defaulting to `postmaster@<domain>`
    pub fn init(domains: &[String], configured: &BTreeMap<String, String>) -> Result<Self> {
        let configured: BTreeMap<String, &String> = configured
            .iter()
            .map(|(domain, address)| (domain.trim().to_lowercase(), address))
            .collect();

        let mut postmasters = BTreeMap::new();
        for domain in domains {
            let name = domain.trim().to_lowercase();
            if name.is_empty() {
                return Err(Error::Config("Empty domain name".to_string()));
            }

            let postmaster = match configured.get(&name) {
                Some(address) => MailAddress::parse(address).ok_or_else(|| {
                    Error::Config(format!("Invalid postmaster address for {}: {}", name, address))
                })?,
                None => MailAddress::new(POSTMASTER, name.as_str()),
            };

            debug!(domain = %name, postmaster = %postmaster, "Registered postmaster");
            postmasters.insert(name, postmaster);
        }

        Ok(Self { postmasters })
    }

    /// Managed domain names, lowercased and sorted
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.postmasters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.postmasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postmasters.is_empty()
    }

    /// Whether the address is inside a managed domain
    pub fn is_managed(&self, address: &MailAddress) -> bool {
        self.postmasters
            .contains_key(address.domain.to_lowercase().as_str())
    }

    pub fn postmaster_for(&self, domain: &str) -> Option<&MailAddress> {
        self.postmasters.get(domain.trim().to_lowercase().as_str())
    }

    /// Whether the address is the postmaster of any managed domain
    pub fn is_postmaster(&self, address: &MailAddress) -> bool {
        self.postmasters.values().any(|pm| pm.matches(address))
    }

    /// [`is_postmaster`](Self::is_postmaster) for raw sender text, also
    /// accepting the local postmaster. Empty text is never a postmaster.
    pub fn is_sender_postmaster(&self, sender: &str) -> bool {
        if sender.trim().is_empty() {
            return false;
        }
        if is_local_postmaster(sender) {
            return true;
        }
        MailAddress::parse(sender)
            .map(|address| self.is_postmaster(&address))
            .unwrap_or(false)
    }

    /// Postmaster standing in for the local `postmaster` sender: that of the
    /// first managed recipient's domain, else of the first managed domain
    pub fn local_postmaster_for(&self, recipients: &[MailAddress]) -> Option<&MailAddress> {
        recipients
            .iter()
            .find_map(|r| self.postmaster_for(&r.domain))
            .or_else(|| self.postmasters.values().next())
    }

    /// Replace a managed domain's postmaster; unmanaged domains are ignored
    pub fn set_postmaster(&mut self, domain: &str, postmaster: MailAddress) -> bool {
        match self.postmasters.get_mut(domain.trim().to_lowercase().as_str()) {
            Some(entry) => {
                *entry = postmaster;
                true
            }
            None => false,
        }
    }

    /// Replace postmasters with the addresses registered in the config service
    pub async fn overlay_from_service(
        &mut self,
        domains: &[Domain],
        addresses: &dyn AddressService,
    ) -> Result<()> {
        for domain in domains {
            let Some(postmaster_id) = domain.postmaster_id else {
                continue;
            };
            let Some(address) = addresses.get_address_by_id(postmaster_id).await? else {
                debug!(domain = %domain.name, id = %postmaster_id, "Postmaster address not found");
                continue;
            };
            let Some(postmaster) = address.to_mail_address() else {
                return Err(Error::Service(format!(
                    "Invalid postmaster address for {}: {}",
                    domain.name, address.email_address
                )));
            };

            if self.set_postmaster(&domain.name, postmaster) {
                info!(domain = %domain.name, postmaster = %address.email_address, "Postmaster loaded from config service");
            }
        }
        Ok(())
    }
}
