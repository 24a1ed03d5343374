//! Incoming message routing to internal destinations

use crate::envelope::{EnvelopeAddress, MessageEnvelope};
use async_trait::async_trait;
use directgate_common::config::{ProcessingSettings, RouteConfig};
use directgate_common::types::MailAddress;
use directgate_common::{Error, Result};
use tracing::{debug, info};

/// Recipient pattern of a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatcher {
    /// `*`
    Any,
    /// `type:<T>`, matched against the resolved address type
    AddressType(String),
    /// `@domain` or `domain`
    Domain(String),
    /// `local@domain`
    Address(MailAddress),
}

impl RouteMatcher {
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(Error::Config("Route pattern must not be empty".to_string()));
        }

        if pattern == "*" {
            return Ok(RouteMatcher::Any);
        }
        if let Some(address_type) = pattern.strip_prefix("type:") {
            let address_type = address_type.trim();
            if address_type.is_empty() {
                return Err(Error::Config(format!("Invalid route pattern: {}", pattern)));
            }
            return Ok(RouteMatcher::AddressType(address_type.to_string()));
        }
        if let Some(domain) = pattern.strip_prefix('@') {
            return Self::domain(pattern, domain);
        }
        if pattern.contains('@') {
            return MailAddress::parse(pattern)
                .map(RouteMatcher::Address)
                .ok_or_else(|| Error::Config(format!("Invalid route pattern: {}", pattern)));
        }
        Self::domain(pattern, pattern)
    }

    fn domain(pattern: &str, domain: &str) -> Result<Self> {
        if domain.is_empty() || domain.contains(char::is_whitespace) {
            return Err(Error::Config(format!("Invalid route pattern: {}", pattern)));
        }
        Ok(RouteMatcher::Domain(domain.to_lowercase()))
    }

    pub fn matches(&self, recipient: &EnvelopeAddress) -> bool {
        match self {
            RouteMatcher::Any => true,
            RouteMatcher::AddressType(address_type) => recipient
                .address_type()
                .map(|t| t.eq_ignore_ascii_case(address_type))
                .unwrap_or(false),
            RouteMatcher::Domain(domain) => recipient.address.in_domain(domain),
            RouteMatcher::Address(address) => recipient.address.matches(address),
        }
    }
}

/// A route rule and the destination it copies to
#[derive(Debug, Clone)]
pub struct MessageRoute {
    pub pattern: String,
    pub matcher: RouteMatcher,
    pub settings: ProcessingSettings,
}

impl MessageRoute {
    pub fn from_config(config: &RouteConfig) -> Result<Self> {
        Ok(Self {
            pattern: config.pattern.clone(),
            matcher: RouteMatcher::parse(&config.pattern)?,
            settings: ProcessingSettings::with_folder(&config.copy_folder),
        })
    }
}

/// Receives one call per matched route
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn deliver(&self, route: &MessageRoute);
}

/// Ordered, first-match-wins route table
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    routes: Vec<MessageRoute>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the route table
    pub fn set_routes(&mut self, routes: &[RouteConfig]) -> Result<()> {
        self.routes = routes
            .iter()
            .map(MessageRoute::from_config)
            .collect::<Result<Vec<_>>>()?;
        info!(routes = self.routes.len(), "Loaded incoming routes");
        Ok(())
    }

    pub fn has_routes(&self) -> bool {
        !self.routes.is_empty()
    }

    pub fn routes(&self) -> &[MessageRoute] {
        &self.routes
    }

    /// Route index of the first rule matching `recipient`
    pub fn find_route(&self, recipient: &EnvelopeAddress) -> Option<usize> {
        self.routes.iter().position(|r| r.matcher.matches(recipient))
    }

    /// Deliver the envelope's domain recipients to their routes
    ///
    /// Each matched route gets one delivery however many recipients it
    /// matched. Returns `true` only when there is at least one domain
    /// recipient and every one of them matched a route.
    pub async fn route(&self, envelope: &MessageEnvelope, handler: &dyn RouteHandler) -> bool {
        if !self.has_routes() {
            return false;
        }

        let mut matched: Vec<usize> = Vec::new();
        let mut total = 0;
        let mut routed = 0;

        for recipient in envelope.domain_recipients() {
            total += 1;
            match self.find_route(recipient) {
                Some(index) => {
                    routed += 1;
                    if !matched.contains(&index) {
                        matched.push(index);
                    }
                }
                None => debug!(recipient = %recipient.address, "No route for recipient"),
            }
        }

        for &index in &matched {
            if let Some(route) = self.routes.get(index) {
                debug!(pattern = %route.pattern, "Routing message");
                handler.deliver(route).await;
            }
        }

        total > 0 && routed == total
    }
}
