//! Wiring of all protocol components over one store.

use crate::{
    cache::PayloadCache,
    cipher::RelayCipher,
    config::ProtocolConfig,
    env::Environment,
    handshake::HandshakeCoordinator,
    identity::IdentityManager,
    invitation::InvitationLedger,
    listener::{KeyListener, ListenerRegistry},
    notify::NotificationBus,
    partners::PartnerIndex,
    session::SessionStore,
    store::SharedStore,
};

/// Every component, sharing one store and environment.
#[derive(Clone)]
pub struct Protocol<E: Environment> {
    /// Shared store
    pub store: SharedStore,
    /// Environment
    pub env: E,
    /// Tunables
    pub config: ProtocolConfig,
    /// Identity manager
    pub identities: IdentityManager<E>,
    /// Invitation ledger
    pub ledger: InvitationLedger<E>,
    /// Handshake coordinator
    pub handshake: HandshakeCoordinator<E>,
    /// Notification bus
    pub bus: NotificationBus,
    /// Listener launcher
    pub listener: KeyListener<E>,
    /// Session slots
    pub sessions: SessionStore,
    /// Partner index
    pub partners: PartnerIndex,
    /// Payload cache
    pub cache: PayloadCache<E>,
    /// Relay cipher
    pub cipher: RelayCipher<E>,
}

impl<E: Environment> Protocol<E> {
    /// Build all components. `secret` seals identity private keys.
    pub fn new(store: SharedStore, env: E, config: ProtocolConfig, secret: Vec<u8>) -> Self {
        let identities = IdentityManager::new(store.clone(), env.clone(), config.clone(), secret);
        let ledger =
            InvitationLedger::new(store.clone(), env.clone(), config.clone(), identities.clone());
        let bus = NotificationBus::new(store.clone());
        let partners = PartnerIndex::new(store.clone(), config.clone());
        let handshake = HandshakeCoordinator::new(
            store.clone(),
            env.clone(),
            config.clone(),
            identities.clone(),
            ledger.clone(),
            bus.clone(),
            partners.clone(),
        );
        let listener = KeyListener::new(handshake.clone(), bus.clone(), ListenerRegistry::new());
        let sessions = SessionStore::new(store.clone());
        let cache = PayloadCache::new(store.clone(), env.clone(), config.clone());
        let cipher = RelayCipher::new(env.clone());

        Self {
            store,
            env,
            config,
            identities,
            ledger,
            handshake,
            bus,
            listener,
            sessions,
            partners,
            cache,
            cipher,
        }
    }
}
