//! World state for scenario execution.

use std::collections::HashMap;

use sealtalk_core::{Session, SecureId, UserId};
use sealtalk_crypto::SymmetricKey;

/// One relayed message.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Sender name
    pub from: String,
    /// Recipient name
    pub to: String,
    /// Plaintext the sender typed
    pub sent: String,
    /// What the relay stored
    pub ciphertext: Vec<u8>,
    /// What the recipient decrypted, or why it could not
    pub received: Result<String, String>,
}

/// Everything a scenario produced, captured after the last step.
#[derive(Debug, Default)]
pub struct World {
    pub(crate) ids: HashMap<String, UserId>,
    pub(crate) secure_id: Option<SecureId>,
    pub(crate) keys: HashMap<String, SymmetricKey>,
    pub(crate) stored_key: Option<SymmetricKey>,
    pub(crate) sessions: HashMap<String, Option<Session>>,
    pub(crate) deliveries: Vec<Delivery>,
    pub(crate) pending: usize,
    pub(crate) failures: Vec<String>,
}

impl World {
    /// User id assigned to `actor`.
    pub fn user_id(&self, actor: &str) -> Option<UserId> {
        self.ids.get(actor).copied()
    }

    /// Secure id of the established conversation.
    pub fn secure_id(&self) -> Option<&SecureId> {
        self.secure_id.as_ref()
    }

    /// Session key as `actor` obtained it during the handshake.
    pub fn key(&self, actor: &str) -> Option<&SymmetricKey> {
        self.keys.get(actor)
    }

    /// Session key left in the store at the end.
    pub fn stored_key(&self) -> Option<&SymmetricKey> {
        self.stored_key.as_ref()
    }

    /// Session slot of `actor` at the end.
    pub fn session(&self, actor: &str) -> Option<&Session> {
        self.sessions.get(actor).and_then(Option::as_ref)
    }

    /// Messages delivered, in order.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Messages sent but never delivered.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Steps that failed, as `"<step>: <error>"`.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Both parties hold the same key and it matches the stored one.
    pub fn keys_agree(&self) -> bool {
        let mut keys = self.keys.values();
        let Some(first) = keys.next() else {
            return false;
        };
        self.keys.len() == 2
            && keys.all(|k| k == first)
            && self.stored_key.as_ref().is_some_and(|k| k == first)
    }

    /// Both session slots hold the same record.
    pub fn sessions_symmetric(&self) -> bool {
        let mut slots = self.sessions.values();
        match (slots.next(), slots.next()) {
            (Some(Some(a)), Some(Some(b))) => a == b,
            _ => false,
        }
    }
}
