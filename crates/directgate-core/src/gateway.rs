//! Message processing pipeline
//!
//! [`SmtpAgent`] drives one message at a time through classification,
//! security processing and disposition:
//!
//! ```text
//! Received -> PreProcessed -> Classified -> SecurityProcessed -> Accepted -> PostProcess
//!     \____________\______________\______________\__________________> Rejected
//! ```
//!
//! Every run ends with exactly one of accept or reject on the transport
//! message, also when the run times out or its future is dropped. Abort only
//! ever follows accept and suppresses onward relay.

use crate::agent::{SecurityAgent, TrustPolicies};
use crate::archive::MessageArchive;
use crate::envelope::{Direction, MessageEnvelope};
use crate::hooks::{GatewayHooks, NoopHooks};
use crate::message::SmtpMessage;
use crate::postmasters::DomainPostmasters;
use crate::router::{MessageRoute, MessageRouter, RouteHandler};
use crate::services::ConfigServices;
use async_trait::async_trait;
use directgate_common::types::MailAddress;
use directgate_common::{Error, GatewayConfig, Result};
use directgate_policy::{PolicyFilter, PolicySet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pipeline stage of a message run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    PreProcessed,
    Classified,
    SecurityProcessed,
    Accepted,
    PostProcess,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::PreProcessed => "pre_processed",
            Stage::Classified => "classified",
            Stage::SecurityProcessed => "security_processed",
            Stage::Accepted => "accepted",
            Stage::PostProcess => "post_process",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Accepted,
    Rejected,
}

/// Owns the transport message for one run and its single disposition
///
/// Dropped while still pending, it rejects the message.
struct Disposition<'a> {
    message: &'a mut dyn SmtpMessage,
    outcome: Outcome,
    stage: Stage,
}

impl<'a> Disposition<'a> {
    fn new(message: &'a mut dyn SmtpMessage) -> Self {
        Self {
            message,
            outcome: Outcome::Pending,
            stage: Stage::Received,
        }
    }

    fn message(&self) -> &dyn SmtpMessage {
        &*self.message
    }

    fn message_mut(&mut self) -> &mut dyn SmtpMessage {
        &mut *self.message
    }

    fn advance(&mut self, stage: Stage) {
        debug!(stage = %stage, sender = %self.message.sender(), "Stage reached");
        self.stage = stage;
    }

    fn accept(&mut self) -> Result<()> {
        self.message.accept()?;
        self.outcome = Outcome::Accepted;
        info!(sender = %self.message.sender(), "Accepted message");
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        if self.outcome != Outcome::Accepted {
            return Err(Error::Transport(
                "Abort requested for a message that was not accepted".to_string(),
            ));
        }
        self.message.abort()?;
        info!(sender = %self.message.sender(), "Relay suppressed");
        Ok(())
    }

    /// Reject unless a disposition was already made; errors from the
    /// transport are logged only. Returns whether the message was rejected.
    fn reject(&mut self) -> bool {
        if self.outcome != Outcome::Pending {
            return false;
        }
        self.outcome = Outcome::Rejected;
        if let Err(e) = self.message.reject() {
            warn!(stage = %self.stage, error = %e, "Reject failed");
        }
        info!(stage = %self.stage, sender = %self.message.sender(), "Rejected message");
        true
    }
}

impl Drop for Disposition<'_> {
    fn drop(&mut self) {
        if self.outcome == Outcome::Pending {
            warn!(stage = %self.stage, "Message run abandoned");
            self.reject();
        }
    }
}

/// Archives one copy per matched route
struct ArchiveRoute<'a> {
    archive: &'a MessageArchive,
    message: &'a dyn SmtpMessage,
}

#[async_trait]
impl<'a> RouteHandler for ArchiveRoute<'a> {
    async fn deliver(&self, route: &MessageRoute) {
        self.archive
            .copy_to_folder(self.message, &route.settings)
            .await;
    }
}

/// State built by a successful [`SmtpAgent::init`]
struct AgentState {
    postmasters: DomainPostmasters,
    router: MessageRouter,
    services: ConfigServices,
    policies: Vec<PolicyFilter>,
    agent: Arc<dyn SecurityAgent>,
}

impl AgentState {
    /// Postmaster mail to domain recipients only passes through in the clear
    fn is_internal_postmaster_message(&self, envelope: &MessageEnvelope) -> bool {
        self.postmasters.is_postmaster(&envelope.sender().address) && envelope.is_internal()
    }
}

/// The gateway
pub struct SmtpAgent {
    config: GatewayConfig,
    hooks: Arc<dyn GatewayHooks>,
    archive: MessageArchive,
    state: OnceLock<AgentState>,
}

impl SmtpAgent {
    /// Create an uninitialized gateway from validated configuration
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hooks: Arc::new(NoopHooks),
            archive: MessageArchive::new(),
            state: OnceLock::new(),
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn GatewayHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// [`new`](Self::new) followed by [`init`](Self::init)
    pub async fn initialize(
        config: GatewayConfig,
        agent: Arc<dyn SecurityAgent>,
        services: ConfigServices,
    ) -> Result<Self> {
        let gateway = Self::new(config)?;
        gateway.init(agent, services).await?;
        Ok(gateway)
    }

    /// Build domains, folders, routes and policies, then install the agent
    ///
    /// On failure the gateway stays uninitialized.
    pub async fn init(&self, agent: Arc<dyn SecurityAgent>, services: ConfigServices) -> Result<()> {
        info!(stage = "init_begin", "Initializing gateway");

        let state = match self.build_state(agent, services).await {
            Ok(state) => state,
            Err(e) => {
                error!(stage = "init_failed", code = e.code(), error = %e, "Gateway initialization failed");
                return Err(e);
            }
        };

        self.state
            .set(state)
            .map_err(|_| Error::Config("Gateway is already initialized".to_string()))?;

        info!(stage = "init_end", domains = self.config.domains.len(), "Gateway initialized");
        Ok(())
    }

    async fn build_state(
        &self,
        agent: Arc<dyn SecurityAgent>,
        services: ConfigServices,
    ) -> Result<AgentState> {
        let mut postmasters =
            DomainPostmasters::init(&self.config.domains, &self.config.postmasters)?;

        for settings in [
            &self.config.raw_message,
            &self.config.incoming,
            &self.config.outgoing,
            &self.config.bad_message,
        ] {
            settings.ensure_folders().await?;
        }

        let mut router = MessageRouter::new();
        if self.config.has_routes() {
            router.set_routes(&self.config.incoming_routes)?;
            for route in router.routes() {
                route.settings.ensure_folders().await?;
            }
        }

        match &services.domains {
            Some(domain_service) => {
                let found = domain_service.get_domains(&self.config.domains).await?;
                if found.is_empty() || found.len() != self.config.domains.len() {
                    return Err(Error::ConfiguredDomainsMismatch {
                        configured: self.config.domains.len(),
                        found: found.len(),
                    });
                }

                match &services.addresses {
                    Some(addresses) => {
                        postmasters
                            .overlay_from_service(&found, addresses.as_ref())
                            .await?
                    }
                    None => debug!("Postmasters not loaded from config service"),
                }
            }
            None => debug!("Domains not loaded from config service"),
        }

        let policies = match &self.config.policies {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!(
                        "Failed to read policy file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let compiled = PolicySet::from_toml_str(&content)?.compile_all()?;
                info!(policies = compiled.len(), "Loaded trust policies");
                compiled.into_iter().map(PolicyFilter::new).collect()
            }
            None => Vec::new(),
        };

        Ok(AgentState {
            postmasters,
            router,
            services,
            policies,
            agent,
        })
    }

    fn state(&self) -> Result<&AgentState> {
        self.state.get().ok_or(Error::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn postmasters(&self) -> Result<&DomainPostmasters> {
        Ok(&self.state()?.postmasters)
    }

    pub fn router(&self) -> Result<&MessageRouter> {
        Ok(&self.state()?.router)
    }

    /// Trust policies loaded from the configured policy file
    pub fn policies(&self) -> Result<TrustPolicies<'_>> {
        Ok(TrustPolicies::new(&self.state()?.policies))
    }

    /// Process one message to a terminal disposition
    ///
    /// On failure the message has been rejected (unless it was already
    /// accepted), a copy archived to the bad-message folder, and the error
    /// is returned so the transport can refuse the message.
    pub async fn process_message(&self, message: &mut dyn SmtpMessage) -> Result<()> {
        let sender = message.sender().to_string();
        let mut disposition = Disposition::new(message);

        let result = match self.config.processing_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), self.run(&mut disposition))
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(secs))),
            None => self.run(&mut disposition).await,
        };

        let Err(err) = result else {
            return Ok(());
        };

        let stage = disposition.stage;
        let rejected = disposition.reject();
        drop(disposition);

        error!(
            stage = %stage,
            sender = %sender,
            code = err.code(),
            error = %err,
            "Message processing failed"
        );
        if rejected {
            self.archive
                .copy_to_folder(&*message, &self.config.bad_message)
                .await;
        }
        self.hooks.on_error(&sender, &err);

        Err(err)
    }

    async fn run(&self, disposition: &mut Disposition<'_>) -> Result<()> {
        let state = self.state()?;

        info!(
            stage = %Stage::Received,
            sender = %disposition.message().sender(),
            recipients = disposition.message().recipients().len(),
            "Message received"
        );
        self.archive
            .copy_to_folder(disposition.message(), &self.config.raw_message)
            .await;
        disposition.advance(Stage::PreProcessed);

        let envelope = Self::envelope_for(state, disposition.message(), None)?;
        disposition.advance(Stage::Classified);

        let envelope = match envelope.direction() {
            Direction::Outgoing => self.process_outgoing_envelope(state, envelope).await?,
            Direction::Incoming => {
                let envelope = self.process_incoming_envelope(state, envelope).await?;
                disposition
                    .message_mut()
                    .set_envelope_recipients(&envelope.domain_recipient_addresses());
                envelope
            }
        };
        disposition.advance(Stage::SecurityProcessed);

        if state.is_internal_postmaster_message(&envelope) {
            info!(sender = %envelope.sender().address, "Internal postmaster message, delivering unmodified");
        } else {
            let text = envelope.serialize_message();
            if text.is_empty() {
                return Err(Error::EmptyResultFromAgent);
            }
            disposition.message_mut().update(&text)?;
        }

        disposition.accept()?;
        disposition.advance(Stage::Accepted);

        disposition.advance(Stage::PostProcess);
        self.post_process(state, disposition, &envelope).await
    }

    async fn post_process(
        &self,
        state: &AgentState,
        disposition: &mut Disposition<'_>,
        envelope: &MessageEnvelope,
    ) -> Result<()> {
        let relay = match envelope.direction() {
            Direction::Outgoing => {
                self.archive
                    .copy_to_folder(disposition.message(), &self.config.outgoing)
                    .await;
                self.config.outgoing.enable_relay
            }
            Direction::Incoming => {
                let handler = ArchiveRoute {
                    archive: &self.archive,
                    message: disposition.message(),
                };
                let fully_routed = state.router.route(envelope, &handler).await;
                self.archive
                    .copy_to_folder(disposition.message(), &self.config.incoming)
                    .await;
                debug!(fully_routed, "Routed incoming message");
                !fully_routed && self.config.incoming.enable_relay
            }
        };

        if !relay {
            disposition.abort()?;
        }
        Ok(())
    }

    /// Run the outgoing half of the pipeline without a disposition
    pub async fn process_outgoing(&self, message: &dyn SmtpMessage) -> Result<MessageEnvelope> {
        let state = self.state()?;
        let envelope = Self::envelope_for(state, message, Some(Direction::Outgoing))?;
        self.process_outgoing_envelope(state, envelope).await
    }

    /// Run the incoming half of the pipeline without a disposition
    ///
    /// The message's recipients are restricted to the trusted domain
    /// recipients.
    pub async fn process_incoming(&self, message: &mut dyn SmtpMessage) -> Result<MessageEnvelope> {
        let state = self.state()?;
        let envelope = Self::envelope_for(state, message, Some(Direction::Incoming))?;
        let envelope = self.process_incoming_envelope(state, envelope).await?;
        message.set_envelope_recipients(&envelope.domain_recipient_addresses());
        Ok(envelope)
    }

    fn envelope_for(
        state: &AgentState,
        message: &dyn SmtpMessage,
        direction: Option<Direction>,
    ) -> Result<MessageEnvelope> {
        let recipients = message
            .recipients()
            .iter()
            .map(|r| {
                MailAddress::parse(r)
                    .ok_or_else(|| Error::Validation(format!("Invalid recipient address: '{}'", r)))
            })
            .collect::<Result<Vec<_>>>()?;
        let sender = Self::sender_address(state, message.sender(), &recipients)?;

        let direction = direction.unwrap_or(if state.postmasters.is_managed(&sender) {
            Direction::Outgoing
        } else {
            Direction::Incoming
        });

        let mut envelope = MessageEnvelope::new(direction, sender, recipients, message.text());
        envelope.categorize_recipients(&state.postmasters);
        debug!(
            direction = %direction,
            recipients = envelope.recipients().len(),
            domain_recipients = envelope.domain_recipient_count(),
            "Classified message"
        );
        Ok(envelope)
    }

    /// Parse the envelope sender; the bare local `postmaster` becomes the
    /// postmaster of the recipients' managed domain
    fn sender_address(
        state: &AgentState,
        raw: &str,
        recipients: &[MailAddress],
    ) -> Result<MailAddress> {
        if let Some(sender) = MailAddress::parse(raw) {
            return Ok(sender);
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "<>" {
            return Err(Error::Validation(
                "Null reverse-path senders are not accepted".to_string(),
            ));
        }
        if !state.postmasters.is_sender_postmaster(raw) {
            return Err(Error::Validation(format!("Invalid sender address: '{}'", raw)));
        }

        let postmaster = state
            .postmasters
            .local_postmaster_for(recipients)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("No postmaster for sender '{}'", raw)))?;
        debug!(postmaster = %postmaster, "Local postmaster sender");
        Ok(postmaster)
    }

    async fn process_outgoing_envelope(
        &self,
        state: &AgentState,
        mut envelope: MessageEnvelope,
    ) -> Result<MessageEnvelope> {
        if let Some(addresses) = &state.services.addresses {
            let sender = envelope.sender().address.clone();
            match addresses.get_address(&sender).await? {
                Some(address) if address.matches(&sender) => envelope.tag_sender(address),
                Some(address) => {
                    warn!(
                        sender = %sender,
                        resolved = %address.email_address,
                        "Address service resolved sender to a different address"
                    );
                    return Err(Error::UntrustedSender(sender.to_string()));
                }
                None => {
                    warn!(sender = %sender, "Sender not found in address service");
                    return Err(Error::UntrustedSender(sender.to_string()));
                }
            }
        }
        self.hooks.before_outgoing(&mut envelope).await?;

        let processed = state
            .agent
            .process_outgoing(envelope, TrustPolicies::new(&state.policies))
            .await?;
        Self::check_agent_envelope(Direction::Outgoing, &processed)?;

        info!(stage = "processed_outgoing", sender = %processed.sender().address, "Security agent processed outgoing message");
        Ok(processed)
    }

    async fn process_incoming_envelope(
        &self,
        state: &AgentState,
        mut envelope: MessageEnvelope,
    ) -> Result<MessageEnvelope> {
        if let Some(addresses) = &state.services.addresses {
            let domain_recipients = envelope.domain_recipient_addresses();
            let resolved = if domain_recipients.is_empty() {
                Vec::new()
            } else {
                addresses.get_addresses(&domain_recipients).await?
            };

            envelope.retain_resolved_domain_recipients(&resolved);
            let pruned = domain_recipients.len() - envelope.domain_recipient_count();
            if pruned > 0 {
                info!(pruned, "Removed unresolved domain recipients");
            }
            if !envelope.has_domain_recipients() {
                return Err(Error::NoRecipients);
            }
        }
        self.hooks.before_incoming(&mut envelope).await?;

        let processed = state
            .agent
            .process_incoming(envelope, TrustPolicies::new(&state.policies))
            .await?;
        Self::check_agent_envelope(Direction::Incoming, &processed)?;

        info!(stage = "processed_incoming", sender = %processed.sender().address, "Security agent processed incoming message");
        Ok(processed)
    }

    fn check_agent_envelope(expected: Direction, envelope: &MessageEnvelope) -> Result<()> {
        if envelope.direction() != expected || !envelope.is_consistent() {
            return Err(Error::InvalidEnvelopeFromAgent);
        }
        Ok(())
    }
}

impl fmt::Debug for SmtpAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpAgent")
            .field("domains", &self.config.domains)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
