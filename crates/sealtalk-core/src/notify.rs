//! Per-user notification channels.
//!
//! The invitee side announces a wrapped key with `key_ready`; the inviter's
//! listener acknowledges with `key_received`. Messages are CBOR maps
//! `{event, data}`.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    UserId,
    error::{CoreError, decode_cbor, encode_cbor},
    store::{SharedStore, Subscription, keys},
    token::SecureId,
};

/// A notification on a user's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// A wrapped session key awaits the inviter
    KeyReady(SecureId),
    /// The inviter unwrapped and stored the session key
    KeyReceived(SecureId),
}

/// Publishes and subscribes to notification channels.
#[derive(Clone)]
pub struct NotificationBus {
    store: SharedStore,
}

impl NotificationBus {
    /// Create a bus over `store`.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Publish to `user`'s channel. Returns the number of listeners reached.
    pub async fn publish(&self, user: UserId, notification: &Notification) -> Result<usize, CoreError> {
        let reached =
            self.store.publish(&keys::notifications(user), encode_cbor(notification)?).await?;
        trace!(user_id = user, ?notification, reached, "notification published");
        Ok(reached)
    }

    /// Subscribe to `user`'s channel.
    pub async fn subscribe(&self, user: UserId) -> Result<NotificationStream, CoreError> {
        let inner = self.store.subscribe(&keys::notifications(user)).await?;
        Ok(NotificationStream { user, inner })
    }
}

/// Decoded notifications for one user.
#[derive(Debug)]
pub struct NotificationStream {
    user: UserId,
    inner: Subscription,
}

impl NotificationStream {
    /// Next decodable notification, `None` once the channel closes.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            let raw = self.inner.next().await?;
            match decode_cbor::<Notification>(&raw) {
                Ok(notification) => return Some(notification),
                Err(e) => warn!(user_id = self.user, error = %e, "skipping undecodable notification"),
            }
        }
    }
}
