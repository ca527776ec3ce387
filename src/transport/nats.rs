use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::{InboundEvent, OutboundMessage};
use super::SessionTransport;
use crate::error::CaptureError;

/// NATS-backed session transport.
///
/// Subjects, for prefix `p`:
/// - `p.audio`, `p.file`: outbound events (JSON payload of the event)
/// - `p.events.<name>`: inbound events pushed by the backend
pub struct NatsTransport {
    client: Client,
    prefix: String,
}

impl NatsTransport {
    /// Connect to NATS server
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    pub fn subject(&self, event: &str) -> String {
        format!("{}.{}", self.prefix, event)
    }

    /// Consume the outbound `audio`/`file` subjects (backend side)
    pub async fn subscribe_pipeline(&self) -> Result<mpsc::Receiver<OutboundMessage>> {
        let subject = self.subject("*");
        info!("Subscribing to pipeline events on {}", subject);

        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to pipeline events")?;

        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let subject = msg.subject.to_string();
                let event = subject.rsplit('.').next().unwrap_or_default();

                match OutboundMessage::from_event(event, &msg.payload) {
                    Ok(Some(message)) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!("Ignoring message on {}", subject),
                    Err(e) => warn!("Failed to parse {} message: {}", event, e),
                }
            }
            info!("Pipeline subscription on {} closed", subject);
        });

        Ok(rx)
    }
}

#[async_trait::async_trait]
impl SessionTransport for NatsTransport {
    async fn emit(&self, message: OutboundMessage) -> Result<(), CaptureError> {
        let event = message.event_name();
        let subject = self.subject(event);

        let failure = |reason: String| CaptureError::TransportFailure {
            event: event.to_string(),
            reason,
        };

        let payload = message.payload_json().map_err(|e| failure(e.to_string()))?;
        let bytes = payload.len();

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| failure(e.to_string()))?;

        debug!("Published {} to {} ({} bytes)", event, subject, bytes);

        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundEvent>, CaptureError> {
        let subject = self.subject("events.>");

        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| CaptureError::TransportFailure {
                event: "subscribe".to_string(),
                reason: e.to_string(),
            })?;

        info!("Subscribed to {}", subject);

        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let name = msg
                    .subject
                    .to_string()
                    .rsplit('.')
                    .next()
                    .unwrap_or_default()
                    .to_string();

                let payload = match serde_json::from_slice(&msg.payload) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Failed to parse inbound {} event: {}", name, e);
                        continue;
                    }
                };

                if let Err(e) = tx.send(InboundEvent { event: name, payload }).await {
                    error!("Failed to forward inbound event: {}", e);
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "nats"
    }
}
