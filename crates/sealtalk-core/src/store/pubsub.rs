//! In-process publish/subscribe.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, mpsc};

/// Fan-out hub keyed by channel name.
///
/// Delivery is best effort: subscribers that dropped their receiver are
/// pruned on the next publish to their channel.
#[derive(Debug, Clone, Default)]
pub struct PubSubHub {
    channels: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>>,
}

impl PubSubHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to every live subscriber of `channel`.
    pub async fn publish(&self, channel: &str, message: Vec<u8>) -> usize {
        let mut channels = self.channels.lock().await;
        let Some(senders) = channels.get_mut(channel) else {
            return 0;
        };

        senders.retain(|tx| tx.send(message.clone()).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            channels.remove(channel);
        }
        delivered
    }

    /// Register a subscriber on `channel`.
    pub async fn subscribe(&self, channel: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.lock().await.entry(channel.to_owned()).or_default().push(tx);
        Subscription { rx }
    }
}

/// Receiving end of a channel subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    /// Next message, or `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
