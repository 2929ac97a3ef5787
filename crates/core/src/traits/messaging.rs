use async_trait::async_trait;

use crate::Result;

/// Outbound messaging collaborator.
///
/// Delivery is fire-and-forget from the pipeline's point of view; retries
/// belong to the transport.
#[async_trait]
pub trait MessagingClient: Send + Sync + 'static {
    /// Send `message` to the canonical `phone`
    async fn send_text(&self, phone: &str, message: &str) -> Result<()>;
}
