//! Duplex channel between the capture pipeline and its backend
//!
//! The hosting application owns the transport and injects it into the
//! pipeline as an `Arc<dyn SessionTransport>`.

pub mod channel;
pub mod messages;
pub mod nats;
pub mod retry;

use tokio::sync::mpsc;

use crate::error::CaptureError;

pub use channel::ChannelTransport;
pub use messages::{AudioMessage, FileMessage, InboundEvent, OutboundMessage};
pub use nats::NatsTransport;
pub use retry::{RetryPolicy, RetryingTransport};

#[async_trait::async_trait]
pub trait SessionTransport: Send + Sync {
    /// Send one event to the backend
    async fn emit(&self, message: OutboundMessage) -> Result<(), CaptureError>;

    /// Receive events pushed by the backend
    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundEvent>, CaptureError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
