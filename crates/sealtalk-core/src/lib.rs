//! SealTalk protocol core
//!
//! Session establishment and relay logic for two parties talking through an
//! untrusted chat platform. The server brokers a hybrid RSA/AES handshake and
//! relays ciphertext, but never holds plaintext or an unsealed private key
//! beyond a single in-memory operation.
//!
//! # Architecture
//!
//! Every component is a thin, request-scoped view over a shared [`Store`]
//! (a key-value store with expiring keys and publish/subscribe). Components
//! never share memory; all cross-request coordination goes through per-key
//! atomic store operations. Time and randomness come from an explicit
//! [`Environment`] so the same code runs in production and in deterministic
//! simulation.
//!
//! CPU-bound cryptography (RSA, PBKDF2) runs on tokio's blocking pool.
//!
//! # Components
//!
//! - [`identity`]: per-user RSA identities, sealed at rest
//! - [`invitation`]: expiring single-use invitations
//! - [`handshake`]: key generation, wrapping and the `key_ready` signal
//! - [`notify`]: per-user notification channels
//! - [`listener`]: inviter-side background listeners and their registry
//! - [`session`]: the two-sided conversation record
//! - [`partners`]: long-term contact index
//! - [`cache`]: short-key indirection for large payloads
//! - [`cipher`]: per-message encryption with a fresh IV
//! - [`interaction`]: typed callback payloads
//! - [`protocol`]: all components wired over one store
//! - [`store`]: store abstraction and in-memory backend
//! - [`mod@env`]: environment abstraction (time, RNG)

pub mod cache;
pub mod cipher;
pub mod config;
pub mod env;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod interaction;
pub mod invitation;
pub mod listener;
pub mod notify;
pub mod partners;
pub mod protocol;
pub mod session;
pub mod store;
pub mod token;

pub use cache::PayloadCache;
pub use cipher::RelayCipher;
pub use config::ProtocolConfig;
pub use env::{Environment, SystemEnv};
pub use error::{CoreError, StoreError};
pub use handshake::HandshakeCoordinator;
pub use identity::IdentityManager;
pub use interaction::{
    ConversationAction, Interaction, InteractionError, InviteAction, Role, SecureAction,
};
pub use invitation::{Invitation, InvitationLedger, InvitationStatus};
pub use listener::{KeyListener, ListenerRegistry};
pub use notify::{Notification, NotificationBus, NotificationStream};
pub use partners::{PartnerIndex, PartnerRecord};
pub use protocol::Protocol;
pub use session::{Session, SessionStore};
pub use store::{MemoryStore, SharedStore, Store, Subscription, Write};
pub use token::{CacheKey, SecureId};

/// Platform user identifier
pub type UserId = u64;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::{MemoryStore, ProtocolConfig, SharedStore, SystemEnv};

    pub(crate) const SECRET: &[u8] = b"test identity secret";

    /// Smaller RSA keys keep unit tests fast.
    pub(crate) fn config() -> ProtocolConfig {
        ProtocolConfig { rsa_bits: 1024, ..ProtocolConfig::default() }
    }

    pub(crate) fn store() -> SharedStore {
        Arc::new(MemoryStore::new(SystemEnv))
    }
}
