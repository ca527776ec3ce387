use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::messages::{InboundEvent, OutboundMessage};
use super::SessionTransport;
use crate::error::CaptureError;

/// In-process transport over Tokio channels.
///
/// Outbound messages go to the receiver returned by [`ChannelTransport::new`];
/// inbound events are injected with [`ChannelTransport::inject`].
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    inbound: broadcast::Sender<InboundEvent>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(64);
        (Self { outbound, inbound }, rx)
    }

    /// Deliver an event to every current subscriber
    pub fn inject(&self, event: InboundEvent) -> usize {
        self.inbound.send(event).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl SessionTransport for ChannelTransport {
    async fn emit(&self, message: OutboundMessage) -> Result<(), CaptureError> {
        let event = message.event_name();
        self.outbound
            .send(message)
            .map_err(|_| CaptureError::TransportFailure {
                event: event.to_string(),
                reason: "receiver dropped".to_string(),
            })
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundEvent>, CaptureError> {
        let mut inbound = self.inbound.subscribe();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Inbound subscriber lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "channel"
    }
}
