// ── Publisher seam ──
//
// The sync engine never touches the bus directly. It hands
// `Publication`s to a `Publisher` and logs whatever error comes back.

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

/// One outbound bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    /// JSON text.
    pub payload: String,
    pub retain: bool,
}

impl Publication {
    /// Serialize `value` as the JSON payload of a non-retained message.
    pub fn json<T: serde::Serialize + ?Sized>(
        topic: String,
        value: &T,
    ) -> Result<Self, PublishError> {
        let payload =
            serde_json::to_string(value).map_err(|e| PublishError::Encode(e.to_string()))?;
        Ok(Self {
            topic,
            payload,
            retain: false,
        })
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

/// Consumer of publications. Implementations own all bus I/O.
pub trait Publisher: Send + Sync {
    fn publish(&self, publication: Publication) -> BoxFuture<'_, Result<(), PublishError>>;
}

// ── Channel publisher ────────────────────────────────────────────────

/// Forwards publications into an unbounded channel.
///
/// Used by tests and by in-process consumers that want the stream
/// without a broker.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Publication>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Publication>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, publication: Publication) -> BoxFuture<'_, Result<(), PublishError>> {
        let result = self
            .tx
            .send(publication)
            .map_err(|_| PublishError::Unavailable("receiver dropped".into()));
        Box::pin(async move { result })
    }
}

/// Drops every publication. For one-shot commands that only read the cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardPublisher;

impl Publisher for DiscardPublisher {
    fn publish(&self, _publication: Publication) -> BoxFuture<'_, Result<(), PublishError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{ChannelPublisher, Publication, Publisher};

    #[tokio::test]
    async fn channel_publisher_forwards_and_reports_closed_receiver() {
        let (publisher, mut rx) = ChannelPublisher::new();
        let msg = Publication::json("omada/ap/lobby".into(), &serde_json::json!({"a": 1})).unwrap();

        publisher.publish(msg.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(msg.clone()));

        drop(rx);
        assert!(publisher.publish(msg).await.is_err());
    }
}
