//! Hybrid RSA/AES key exchange.
//!
//! The invitee generates the session key and wraps it to the inviter's public
//! key in one request ([`HandshakeCoordinator::accept`]). The inviter's
//! background listener later unwraps it ([`HandshakeCoordinator::receive`]).
//! Both sides end up with the same key under `aes_key:{secure_id}`.
//!
//! Invitee steps, in order:
//!
//! 1. setup flag must be `in_progress`
//! 2. draw a fresh 256-bit key
//! 3. persist it set-if-absent; a racing second accept stops here
//! 4. wrap it with RSA-OAEP on the blocking pool
//! 5. persist the wrapped blob with the invitation lifetime
//! 6. record the partner
//! 7. flip the setup flag to `set_up`
//! 8. publish `key_ready` to the inviter
//!
//! If step 7 fails (the invitation expired mid-handshake) everything written
//! in steps 3 to 6 is removed again.

use sealtalk_crypto::{PublicKey, SymmetricKey};
use tracing::{debug, error, info, warn};

use crate::{
    UserId,
    config::ProtocolConfig,
    env::Environment,
    error::{CoreError, join_error},
    identity::IdentityManager,
    invitation::{Invitation, InvitationLedger, InvitationStatus},
    notify::{Notification, NotificationBus},
    partners::{PartnerIndex, PartnerRecord},
    store::{SharedStore, Write, keys},
    token::SecureId,
};

/// Drives both halves of the key exchange.
#[derive(Clone)]
pub struct HandshakeCoordinator<E: Environment> {
    store: SharedStore,
    env: E,
    config: ProtocolConfig,
    identities: IdentityManager<E>,
    ledger: InvitationLedger<E>,
    bus: NotificationBus,
    partners: PartnerIndex,
}

impl<E: Environment> HandshakeCoordinator<E> {
    /// Create a coordinator.
    pub fn new(
        store: SharedStore,
        env: E,
        config: ProtocolConfig,
        identities: IdentityManager<E>,
        ledger: InvitationLedger<E>,
        bus: NotificationBus,
        partners: PartnerIndex,
    ) -> Self {
        Self { store, env, config, identities, ledger, bus, partners }
    }

    /// Invitee side: establish the session key for `invitation`.
    ///
    /// # Errors
    ///
    /// - `SelfInviteRejected` if the invitee is the inviter
    /// - `InvalidHandshakeState` if the invitation is not awaiting a handshake
    /// - `AlreadyCompletedOrInvalid` if another accept won the race or the
    ///   invitation expired before completion
    pub async fn accept(
        &self,
        invitation: &Invitation,
        invitee: UserId,
        invitee_name: &str,
    ) -> Result<SymmetricKey, CoreError> {
        let secure_id = &invitation.secure_id;
        if invitee == invitation.inviter_id {
            return Err(CoreError::SelfInviteRejected);
        }
        if self.ledger.status(secure_id).await? != Some(InvitationStatus::InProgress) {
            return Err(CoreError::InvalidHandshakeState);
        }

        let key = SymmetricKey::from_bytes(self.env.random_array());
        let claimed = self
            .store
            .set_nx(&keys::aes_key(secure_id), key.as_bytes().to_vec(), self.config.session_key_ttl)
            .await?;
        if !claimed {
            debug!(secure_id = %secure_id, user_id = invitee, "lost accept race");
            return Err(CoreError::AlreadyCompletedOrInvalid);
        }

        match self.complete_accept(invitation, invitee, invitee_name, &key).await {
            Ok(()) => {
                info!(secure_id = %secure_id, user_id = invitee, "session key established");
                Ok(key)
            },
            Err(e) => {
                warn!(secure_id = %secure_id, error = %e, "handshake aborted, rolling back");
                self.roll_back(invitation, invitee).await;
                Err(e)
            },
        }
    }

    async fn complete_accept(
        &self,
        invitation: &Invitation,
        invitee: UserId,
        invitee_name: &str,
        key: &SymmetricKey,
    ) -> Result<(), CoreError> {
        let secure_id = &invitation.secure_id;
        let public_pem = invitation.inviter_public_key.clone();
        let mut rng = self.env.rng();
        let key = key.clone();

        let wrapped = tokio::task::spawn_blocking(move || {
            PublicKey::from_pem(&public_pem)?.wrap_key(&mut rng, &key)
        })
        .await
        .map_err(join_error)??;

        self.store
            .set(&keys::encrypted_key(secure_id), wrapped, Some(self.config.invitation_ttl))
            .await?;

        self.partners.record_conversation(invitation.inviter_id, secure_id, invitee).await?;
        self.partners
            .store_partner(&PartnerRecord {
                secure_id: secure_id.clone(),
                invitee_id: invitee,
                display_name: invitee_name.to_owned(),
            })
            .await?;

        self.ledger.mark_set_up(secure_id).await?;

        let reached = self
            .bus
            .publish(invitation.inviter_id, &Notification::KeyReady(secure_id.clone()))
            .await?;
        if reached == 0 {
            warn!(
                secure_id = %secure_id,
                user_id = invitation.inviter_id,
                "no listener for key_ready; inviter will pick up the stored key"
            );
        }
        Ok(())
    }

    async fn roll_back(&self, invitation: &Invitation, invitee: UserId) {
        let secure_id = &invitation.secure_id;
        let undo = self
            .store
            .apply(vec![
                Write::delete(keys::aes_key(secure_id)),
                Write::delete(keys::encrypted_key(secure_id)),
            ])
            .await;
        let forget = self.partners.forget(invitation.inviter_id, secure_id, invitee).await;

        if let Err(e) = undo.map_err(CoreError::from).and(forget) {
            error!(secure_id = %secure_id, error = %e, "handshake rollback failed");
        }
    }

    /// Inviter side: unwrap the key announced by `key_ready`.
    ///
    /// Verifies the result against the key the invitee stored, re-persists
    /// it, deletes the consumed blob and publishes `key_received`.
    pub async fn receive(
        &self,
        inviter: UserId,
        secure_id: &SecureId,
    ) -> Result<SymmetricKey, CoreError> {
        let blob_key = keys::encrypted_key(secure_id);
        let wrapped = self
            .store
            .get(&blob_key)
            .await?
            .ok_or_else(|| CoreError::EncryptedKeyMissing { secure_id: secure_id.to_string() })?;

        let private = self.identities.private_key(inviter).await?;
        let key = tokio::task::spawn_blocking(move || private.unwrap_key(&wrapped))
            .await
            .map_err(join_error)?
            .map_err(|_| CoreError::DecryptionFailure)?;

        if let Some(stored) = self.store.get(&keys::aes_key(secure_id)).await? {
            if SymmetricKey::from_slice(&stored)? != key {
                error!(secure_id = %secure_id, user_id = inviter, "unwrapped key mismatch");
                return Err(CoreError::KeyMismatch { secure_id: secure_id.to_string() });
            }
        }

        self.store
            .set(&keys::aes_key(secure_id), key.as_bytes().to_vec(), self.config.session_key_ttl)
            .await?;
        self.store.delete(&blob_key).await?;
        self.bus.publish(inviter, &Notification::KeyReceived(secure_id.clone())).await?;

        info!(secure_id = %secure_id, user_id = inviter, "session key received");
        Ok(key)
    }

    /// The symmetric key of an established session.
    pub async fn session_key(&self, secure_id: &SecureId) -> Result<SymmetricKey, CoreError> {
        let bytes = self
            .store
            .get(&keys::aes_key(secure_id))
            .await?
            .ok_or_else(|| CoreError::SessionKeyMissing { secure_id: secure_id.to_string() })?;
        Ok(SymmetricKey::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SystemEnv, testing};

    struct Fixture {
        store: SharedStore,
        ledger: InvitationLedger<SystemEnv>,
        handshake: HandshakeCoordinator<SystemEnv>,
        bus: NotificationBus,
        partners: PartnerIndex,
    }

    async fn fixture() -> Fixture {
        let store = testing::store();
        let config = testing::config();
        let identities = IdentityManager::new(
            store.clone(),
            SystemEnv,
            config.clone(),
            testing::SECRET.to_vec(),
        );
        identities.ensure(1).await.unwrap();
        let ledger =
            InvitationLedger::new(store.clone(), SystemEnv, config.clone(), identities.clone());
        let bus = NotificationBus::new(store.clone());
        let partners = PartnerIndex::new(store.clone(), config.clone());
        let handshake = HandshakeCoordinator::new(
            store.clone(),
            SystemEnv,
            config,
            identities,
            ledger.clone(),
            bus.clone(),
            partners.clone(),
        );
        Fixture { store, ledger, handshake, bus, partners }
    }

    async fn invitation(f: &Fixture) -> Invitation {
        let id = f.ledger.create(1, "alice").await.unwrap();
        f.ledger.resolve(id.as_str()).await.unwrap()
    }

    #[tokio::test]
    async fn both_sides_agree_on_the_key() {
        let f = fixture().await;
        let mut inbox = f.bus.subscribe(1).await.unwrap();
        let invitation = invitation(&f).await;
        let id = invitation.secure_id.clone();

        let invitee_key = f.handshake.accept(&invitation, 2, "bob").await.unwrap();
        assert_eq!(inbox.next().await, Some(Notification::KeyReady(id.clone())));
        assert_eq!(f.ledger.status(&id).await.unwrap(), Some(InvitationStatus::SetUp));
        assert!(f.store.get(&keys::encrypted_key(&id)).await.unwrap().is_some());

        let inviter_key = f.handshake.receive(1, &id).await.unwrap();
        assert_eq!(inviter_key, invitee_key);
        assert_eq!(f.handshake.session_key(&id).await.unwrap(), invitee_key);
        assert!(f.store.get(&keys::encrypted_key(&id)).await.unwrap().is_none());
        assert_eq!(inbox.next().await, Some(Notification::KeyReceived(id.clone())));

        let partners = f.partners.partners(1).await.unwrap();
        assert_eq!(partners.len(), 1);
        assert_eq!(partners[0].display_name, "bob");
    }

    #[tokio::test]
    async fn second_accept_is_rejected() {
        let f = fixture().await;
        let invitation = invitation(&f).await;
        let key = f.handshake.accept(&invitation, 2, "bob").await.unwrap();

        assert!(matches!(
            f.handshake.accept(&invitation, 3, "carol").await,
            Err(CoreError::InvalidHandshakeState)
        ));
        assert_eq!(f.handshake.session_key(&invitation.secure_id).await.unwrap(), key);
    }

    #[tokio::test]
    async fn concurrent_accepts_yield_one_key() {
        let f = fixture().await;
        let invitation = invitation(&f).await;

        let (a, b) = tokio::join!(
            f.handshake.accept(&invitation, 2, "bob"),
            f.handshake.accept(&invitation, 3, "carol"),
        );
        let winners: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(f.handshake.session_key(&invitation.secure_id).await.unwrap(), winners[0]);
    }

    #[tokio::test]
    async fn self_invite_is_rejected() {
        let f = fixture().await;
        let invitation = invitation(&f).await;
        assert!(matches!(
            f.handshake.accept(&invitation, 1, "alice").await,
            Err(CoreError::SelfInviteRejected)
        ));
    }

    #[tokio::test]
    async fn accept_after_expiry_writes_nothing() {
        let f = fixture().await;
        let invitation = invitation(&f).await;
        let id = invitation.secure_id.clone();
        f.ledger.revoke(&id).await.unwrap();

        assert!(matches!(
            f.handshake.accept(&invitation, 2, "bob").await,
            Err(CoreError::InvalidHandshakeState)
        ));
        assert!(f.store.get(&keys::aes_key(&id)).await.unwrap().is_none());
        assert!(f.partners.partners(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn receive_without_blob() {
        let f = fixture().await;
        let id = SecureId::generate(&SystemEnv);
        assert!(matches!(
            f.handshake.receive(1, &id).await,
            Err(CoreError::EncryptedKeyMissing { .. })
        ));
        assert!(matches!(
            f.handshake.session_key(&id).await,
            Err(CoreError::SessionKeyMissing { .. })
        ));
    }

    #[tokio::test]
    async fn receive_detects_mismatch() {
        let f = fixture().await;
        let invitation = invitation(&f).await;
        let id = invitation.secure_id.clone();
        f.handshake.accept(&invitation, 2, "bob").await.unwrap();

        f.store.set(&keys::aes_key(&id), vec![0; 32], None).await.unwrap();
        assert!(matches!(f.handshake.receive(1, &id).await, Err(CoreError::KeyMismatch { .. })));
    }

    #[tokio::test]
    async fn tampered_blob_fails_to_decrypt() {
        let f = fixture().await;
        let invitation = invitation(&f).await;
        let id = invitation.secure_id.clone();
        f.handshake.accept(&invitation, 2, "bob").await.unwrap();

        let mut blob = f.store.get(&keys::encrypted_key(&id)).await.unwrap().unwrap();
        blob[0] ^= 0xFF;
        f.store.set(&keys::encrypted_key(&id), blob, None).await.unwrap();
        assert!(matches!(f.handshake.receive(1, &id).await, Err(CoreError::DecryptionFailure)));
    }
}
