//! DirectGate core
//!
//! The [`SmtpAgent`] pipeline: envelope classification, postmaster and
//! recipient trust checks, the pluggable [`SecurityAgent`], incoming
//! routing and best-effort archiving.

pub mod agent;
pub mod archive;
pub mod envelope;
pub mod gateway;
pub mod hooks;
pub mod message;
pub mod postmasters;
pub mod router;
pub mod services;

pub use agent::{AgentError, SecurityAgent, TrustPolicies};
pub use archive::MessageArchive;
pub use envelope::{Direction, EnvelopeAddress, MessageEnvelope};
pub use gateway::{SmtpAgent, Stage};
pub use hooks::{GatewayHooks, NoopHooks};
pub use message::{DispositionEvent, MemoryMessage, SmtpMessage};
pub use postmasters::{is_local_postmaster, DomainPostmasters};
pub use router::{MessageRoute, MessageRouter, RouteHandler, RouteMatcher};
pub use services::{AddressService, ConfigServices, DomainService, HttpConfigService, StaticConfigService};
