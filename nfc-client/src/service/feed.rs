//! Prediction subscription handle

use super::ServiceError;
use nfc_common::Prediction;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One item delivered by a subscription
pub type FeedItem = Result<Prediction, ServiceError>;

/// Channel capacity of a feed; producers wait when the consumer lags
pub const FEED_CAPACITY: usize = 64;

/// Live prediction subscription
///
/// Items arrive in whatever order the Model Service produced them. The feed
/// ends (`recv` returns `None`) when the producer finishes. Dropping the
/// feed aborts the producer task, releasing polling loops and sockets.
#[derive(Debug)]
pub struct PredictionFeed {
    rx: mpsc::Receiver<FeedItem>,
    producer: Option<JoinHandle<()>>,
}

impl PredictionFeed {
    /// Create a feed plus the sender its producer writes into
    pub fn channel() -> (mpsc::Sender<FeedItem>, mpsc::Receiver<FeedItem>) {
        mpsc::channel(FEED_CAPACITY)
    }

    /// Wrap a receiver whose producer is owned elsewhere
    pub fn from_receiver(rx: mpsc::Receiver<FeedItem>) -> Self {
        Self { rx, producer: None }
    }

    /// Wrap a receiver together with the task feeding it
    pub fn with_producer(rx: mpsc::Receiver<FeedItem>, producer: JoinHandle<()>) -> Self {
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// Next item, or `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<FeedItem> {
        self.rx.recv().await
    }
}

impl Drop for PredictionFeed {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}
