//! Expiring single-use invitations.
//!
//! An invitation is two store entries written in one batch with the same
//! lifetime: the inviter record and the setup flag. The flag moves from
//! `in_progress` to `set_up` exactly once, by compare-and-set.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    UserId,
    config::ProtocolConfig,
    env::Environment,
    error::{CoreError, decode_cbor, encode_cbor},
    identity::IdentityManager,
    store::{
        SharedStore, Write,
        keys::{self, STATUS_IN_PROGRESS, STATUS_SET_UP},
    },
    token::SecureId,
};

/// Setup state of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationStatus {
    /// Waiting for the invitee
    InProgress,
    /// Handshake completed
    SetUp,
}

/// A resolved invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Invitation identifier, later the session identifier
    pub secure_id: SecureId,
    /// User who created the invitation
    pub inviter_id: UserId,
    /// Inviter's display name at creation time
    pub inviter_name: String,
    /// Inviter's public key (PEM)
    pub inviter_public_key: String,
}

/// Creates, resolves and completes invitations.
#[derive(Clone)]
pub struct InvitationLedger<E: Environment> {
    store: SharedStore,
    env: E,
    config: ProtocolConfig,
    identities: IdentityManager<E>,
}

impl<E: Environment> InvitationLedger<E> {
    /// Create a ledger.
    pub fn new(
        store: SharedStore,
        env: E,
        config: ProtocolConfig,
        identities: IdentityManager<E>,
    ) -> Self {
        Self { store, env, config, identities }
    }

    /// Issue a new invitation for `inviter`.
    ///
    /// # Errors
    ///
    /// `IdentityMissing` if the inviter has no identity yet.
    pub async fn create(&self, inviter: UserId, inviter_name: &str) -> Result<SecureId, CoreError> {
        let inviter_public_key = self.identities.public_key_pem(inviter).await?;
        let secure_id = SecureId::generate(&self.env);
        let invitation = Invitation {
            secure_id: secure_id.clone(),
            inviter_id: inviter,
            inviter_name: inviter_name.to_owned(),
            inviter_public_key,
        };

        let ttl = Some(self.config.invitation_ttl);
        self.store
            .apply(vec![
                Write::put(keys::inviter_data(&secure_id), encode_cbor(&invitation)?, ttl),
                Write::put(keys::conversation_setup(&secure_id), STATUS_IN_PROGRESS.to_vec(), ttl),
            ])
            .await?;

        info!(user_id = inviter, secure_id = %secure_id, "invitation created");
        Ok(secure_id)
    }

    /// Look up an invitation by its textual id.
    ///
    /// Malformed, unknown and expired ids are indistinguishable.
    pub async fn resolve(&self, secure_id: &str) -> Result<Invitation, CoreError> {
        let id = SecureId::parse(secure_id).ok_or(CoreError::InvalidOrExpired)?;
        let bytes =
            self.store.get(&keys::inviter_data(&id)).await?.ok_or(CoreError::InvalidOrExpired)?;
        decode_cbor(&bytes)
    }

    /// Current setup state, `None` once expired.
    pub async fn status(&self, secure_id: &SecureId) -> Result<Option<InvitationStatus>, CoreError> {
        let flag = self.store.get(&keys::conversation_setup(secure_id)).await?;
        Ok(match flag.as_deref() {
            Some(STATUS_IN_PROGRESS) => Some(InvitationStatus::InProgress),
            Some(STATUS_SET_UP) => Some(InvitationStatus::SetUp),
            Some(_) => return Err(CoreError::Codec("unknown conversation setup flag".into())),
            None => None,
        })
    }

    /// Transition `in_progress` to `set_up`.
    ///
    /// # Errors
    ///
    /// `AlreadyCompletedOrInvalid` if the flag is missing or already set.
    pub async fn mark_set_up(&self, secure_id: &SecureId) -> Result<(), CoreError> {
        let swapped = self
            .store
            .compare_and_set(
                &keys::conversation_setup(secure_id),
                STATUS_IN_PROGRESS,
                STATUS_SET_UP.to_vec(),
            )
            .await?;

        if !swapped {
            return Err(CoreError::AlreadyCompletedOrInvalid);
        }
        debug!(secure_id = %secure_id, "invitation set up");
        Ok(())
    }

    /// Drop the invitation record after a completed handshake.
    ///
    /// The setup flag is left to expire so a late accept still sees
    /// `set_up`.
    pub async fn consume(&self, secure_id: &SecureId) -> Result<(), CoreError> {
        self.store.delete(&keys::inviter_data(secure_id)).await?;
        Ok(())
    }

    /// Withdraw an invitation entirely.
    pub async fn revoke(&self, secure_id: &SecureId) -> Result<(), CoreError> {
        self.store
            .apply(vec![
                Write::delete(keys::inviter_data(secure_id)),
                Write::delete(keys::conversation_setup(secure_id)),
            ])
            .await?;
        info!(secure_id = %secure_id, "invitation revoked");
        Ok(())
    }
}
