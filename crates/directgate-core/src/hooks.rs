//! Pipeline extension points

use crate::envelope::MessageEnvelope;
use async_trait::async_trait;
use directgate_common::{Error, Result};

/// Callbacks injected into the gateway at construction
///
/// `before_outgoing` and `before_incoming` run after the gateway's own
/// sender and recipient checks and right before the security agent; an
/// error rejects the message. `on_error` sees every failed run.
#[async_trait]
pub trait GatewayHooks: Send + Sync {
    async fn before_outgoing(&self, _envelope: &mut MessageEnvelope) -> Result<()> {
        Ok(())
    }

    async fn before_incoming(&self, _envelope: &mut MessageEnvelope) -> Result<()> {
        Ok(())
    }

    fn on_error(&self, _sender: &str, _error: &Error) {}
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl GatewayHooks for NoopHooks {}
