//! Inviter-side key listeners.
//!
//! `/start` launches one background task per inviter that waits for
//! `key_ready` on the inviter's channel and completes the inviter half of the
//! handshake. The registry is owned by the process and passed explicitly.
//! A listener removes its own registry slot when it ends; the slot carries a
//! generation so an old listener never evicts a newer one.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    UserId,
    env::Environment,
    error::CoreError,
    handshake::HandshakeCoordinator,
    notify::{Notification, NotificationBus, NotificationStream},
    token::SecureId,
};

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Running listeners keyed by user.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    slots: Arc<Mutex<HashMap<UserId, Slot>>>,
    next_generation: Arc<AtomicU64>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `user` has a live listener.
    pub async fn is_running(&self, user: UserId) -> bool {
        self.slots.lock().await.get(&user).is_some_and(|slot| !slot.handle.is_finished())
    }

    /// Number of registered listeners.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Whether no listener is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Abort every listener.
    pub async fn shutdown(&self) {
        let slots: Vec<_> = self.slots.lock().await.drain().collect();
        for (user, slot) in slots {
            slot.handle.abort();
            debug!(user_id = user, "listener aborted");
        }
    }

    async fn release(&self, user: UserId, generation: u64) {
        let mut slots = self.slots.lock().await;
        if slots.get(&user).is_some_and(|slot| slot.generation == generation) {
            slots.remove(&user);
        }
    }
}

/// Starts listeners for inviters.
#[derive(Clone)]
pub struct KeyListener<E: Environment> {
    handshake: HandshakeCoordinator<E>,
    bus: NotificationBus,
    registry: ListenerRegistry,
}

impl<E: Environment> KeyListener<E> {
    /// Create a launcher registering into `registry`.
    pub fn new(
        handshake: HandshakeCoordinator<E>,
        bus: NotificationBus,
        registry: ListenerRegistry,
    ) -> Self {
        Self { handshake, bus, registry }
    }

    /// The registry listeners are tracked in.
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Start listening for `user`.
    ///
    /// The subscription is in place when this returns, so a `key_ready`
    /// published afterwards is never missed. Returns `false` if a listener
    /// was already running.
    pub async fn start(&self, user: UserId) -> Result<bool, CoreError> {
        let mut slots = self.registry.slots.lock().await;
        if slots.get(&user).is_some_and(|slot| !slot.handle.is_finished()) {
            warn!(user_id = user, "listener already running");
            return Ok(false);
        }

        let stream = self.bus.subscribe(user).await?;
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);
        let handshake = self.handshake.clone();
        let registry = self.registry.clone();

        let handle = tokio::spawn(async move {
            listen(handshake, user, stream).await;
            registry.release(user, generation).await;
        });
        slots.insert(user, Slot { generation, handle });

        info!(user_id = user, "listener started");
        Ok(true)
    }
}

async fn listen<E: Environment>(
    handshake: HandshakeCoordinator<E>,
    user: UserId,
    mut stream: NotificationStream,
) {
    let mut received: HashSet<SecureId> = HashSet::new();

    while let Some(notification) = stream.next().await {
        match notification {
            Notification::KeyReady(secure_id) => {
                match handshake.receive(user, &secure_id).await {
                    Ok(_) => {
                        received.insert(secure_id);
                    },
                    Err(e) => e.log(user, "failed to receive session key"),
                }
            },
            Notification::KeyReceived(secure_id) if received.contains(&secure_id) => {
                info!(user_id = user, secure_id = %secure_id, "listener finished");
                return;
            },
            Notification::KeyReceived(_) => {},
        }
    }

    debug!(user_id = user, "notification channel closed");
}
