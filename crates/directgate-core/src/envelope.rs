//! Trust envelope derived from a transport message

use crate::postmasters::DomainPostmasters;
use directgate_common::types::{Address, MailAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Direction of a message relative to the managed domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sender outside the managed domains
    Incoming,
    /// Sender inside a managed domain
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Incoming => f.write_str("incoming"),
            Direction::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// An envelope address, optionally tagged with its resolved identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeAddress {
    pub address: MailAddress,
    pub resolved: Option<Address>,
}

impl EnvelopeAddress {
    pub fn new(address: MailAddress) -> Self {
        Self {
            address,
            resolved: None,
        }
    }

    /// Address type of the resolved identity, if any
    pub fn address_type(&self) -> Option<&str> {
        self.resolved.as_ref()?.address_type.as_deref()
    }
}

/// Sender, recipients and text of one message run
///
/// Domain recipients are stored as positions in the recipient list, so they
/// are always a subset of the recipients. The direction is fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    direction: Direction,
    sender: EnvelopeAddress,
    recipients: Vec<EnvelopeAddress>,
    domain_recipients: Vec<usize>,
    text: String,
}

impl MessageEnvelope {
    /// Build an envelope; recipients repeated case-insensitively are dropped
    pub fn new<I>(direction: Direction, sender: MailAddress, recipients: I, text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = MailAddress>,
    {
        let mut seen = HashSet::new();
        let recipients = recipients
            .into_iter()
            .filter(|r| seen.insert(r.key()))
            .map(EnvelopeAddress::new)
            .collect();

        Self {
            direction,
            sender: EnvelopeAddress::new(sender),
            recipients,
            domain_recipients: Vec::new(),
            text: text.into(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn sender(&self) -> &EnvelopeAddress {
        &self.sender
    }

    pub fn tag_sender(&mut self, address: Address) {
        self.sender.resolved = Some(address);
    }

    pub fn recipients(&self) -> &[EnvelopeAddress] {
        &self.recipients
    }

    /// Recipients inside managed domains, in recipient order
    pub fn domain_recipients(&self) -> impl Iterator<Item = &EnvelopeAddress> + '_ {
        self.domain_recipients
            .iter()
            .filter_map(|&i| self.recipients.get(i))
    }

    pub fn domain_recipient_addresses(&self) -> Vec<MailAddress> {
        self.domain_recipients()
            .map(|r| r.address.clone())
            .collect()
    }

    pub fn domain_recipient_count(&self) -> usize {
        self.domain_recipients.len()
    }

    pub fn has_domain_recipients(&self) -> bool {
        !self.domain_recipients.is_empty()
    }

    /// Mark every recipient in a managed domain as a domain recipient
    pub fn categorize_recipients(&mut self, registry: &DomainPostmasters) {
        self.domain_recipients = self
            .recipients
            .iter()
            .enumerate()
            .filter(|(_, r)| registry.is_managed(&r.address))
            .map(|(i, _)| i)
            .collect();
    }

    /// Drop domain recipients failing `keep`; the full recipient list is untouched
    pub fn retain_domain_recipients<F>(&mut self, mut keep: F)
    where
        F: FnMut(&EnvelopeAddress) -> bool,
    {
        let recipients = &self.recipients;
        self.domain_recipients
            .retain(|&i| recipients.get(i).map(&mut keep).unwrap_or(false));
    }

    /// Tag the domain recipient matching `address`; returns whether one matched
    pub fn tag_domain_recipient(&mut self, address: &Address) -> bool {
        for &i in &self.domain_recipients {
            if let Some(recipient) = self.recipients.get_mut(i) {
                if address.matches(&recipient.address) {
                    recipient.resolved = Some(address.clone());
                    return true;
                }
            }
        }
        false
    }

    /// Tag domain recipients from resolved identities and drop the rest
    pub fn retain_resolved_domain_recipients(&mut self, resolved: &[Address]) {
        for address in resolved {
            self.tag_domain_recipient(address);
        }
        self.retain_domain_recipients(|r| r.resolved.is_some());
    }

    /// Every recipient is a domain recipient
    pub fn is_internal(&self) -> bool {
        !self.recipients.is_empty() && self.domain_recipients.len() == self.recipients.len()
    }

    /// Domain recipients reference existing, distinct recipients
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        self.domain_recipients
            .iter()
            .all(|&i| i < self.recipients.len() && seen.insert(i))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_message_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Message text to hand back to the transport
    pub fn serialize_message(&self) -> String {
        self.text.clone()
    }
}
