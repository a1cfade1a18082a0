//! Two-sided conversation records.
//!
//! A session is stored twice, once in each participant's slot, and both
//! copies are always written or cleared in a single store batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    UserId,
    error::{CoreError, decode_cbor, encode_cbor},
    interaction::Role,
    store::{SharedStore, Write, keys},
    token::SecureId,
};

/// An established conversation between an inviter and an invitee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier, equal to the invitation's
    pub secure_id: SecureId,
    /// Inviter's user id
    pub inviter_id: UserId,
    /// Inviter's display name
    pub inviter_name: String,
    /// Invitee's user id
    pub invitee_id: UserId,
    /// Invitee's display name
    pub invitee_name: String,
}

impl Session {
    /// `user`'s role in this session.
    pub fn role(&self, user: UserId) -> Option<Role> {
        if user == self.inviter_id {
            Some(Role::Inviter)
        } else if user == self.invitee_id {
            Some(Role::Invitee)
        } else {
            None
        }
    }

    /// The other participant and their display name.
    pub fn counterpart(&self, user: UserId) -> Option<(UserId, &str)> {
        match self.role(user)? {
            Role::Inviter => Some((self.invitee_id, &self.invitee_name)),
            Role::Invitee => Some((self.inviter_id, &self.inviter_name)),
        }
    }

    /// `user`'s own display name in this session.
    pub fn display_name(&self, user: UserId) -> Option<&str> {
        match self.role(user)? {
            Role::Inviter => Some(&self.inviter_name),
            Role::Invitee => Some(&self.invitee_name),
        }
    }
}

/// Per-user active session slots.
#[derive(Clone)]
pub struct SessionStore {
    store: SharedStore,
}

impl SessionStore {
    /// Create a session store.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Write `session` into both `a`'s and `b`'s slot atomically.
    pub async fn set_symmetric(
        &self,
        a: UserId,
        b: UserId,
        session: &Session,
    ) -> Result<(), CoreError> {
        let encoded = encode_cbor(session)?;
        self.store
            .apply(vec![
                Write::put(keys::session(a), encoded.clone(), None),
                Write::put(keys::session(b), encoded, None),
            ])
            .await?;
        info!(secure_id = %session.secure_id, a, b, "session set for both participants");
        Ok(())
    }

    /// `user`'s active session.
    pub async fn get(&self, user: UserId) -> Result<Option<Session>, CoreError> {
        self.store.get(&keys::session(user)).await?.map(|bytes| decode_cbor(&bytes)).transpose()
    }

    /// `user`'s active session, checked against the counterpart's slot.
    ///
    /// # Errors
    ///
    /// `AsymmetricSession` if the counterpart holds a different session or
    /// none.
    pub async fn get_verified(&self, user: UserId) -> Result<Option<Session>, CoreError> {
        let Some(session) = self.get(user).await? else {
            return Ok(None);
        };
        let (other, _) = session.counterpart(user).ok_or(CoreError::AsymmetricSession)?;
        match self.get(other).await? {
            Some(theirs) if theirs == session => Ok(Some(session)),
            _ => Err(CoreError::AsymmetricSession),
        }
    }

    /// Clear `user`'s slot only.
    pub async fn clear(&self, user: UserId) -> Result<(), CoreError> {
        self.store.delete(&keys::session(user)).await?;
        debug!(user_id = user, "session slot cleared");
        Ok(())
    }

    /// First of `users` whose slot already holds a session.
    pub async fn occupied(&self, users: &[UserId]) -> Result<Option<UserId>, CoreError> {
        for &user in users {
            if self.store.get(&keys::session(user)).await?.is_some() {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    /// End `session` for both participants and drop its symmetric key.
    ///
    /// A slot that has since been taken by another session is left alone.
    pub async fn end(&self, session: &Session) -> Result<(), CoreError> {
        let mut writes = vec![Write::delete(keys::aes_key(&session.secure_id))];
        for user in [session.inviter_id, session.invitee_id] {
            match self.get(user).await? {
                Some(held) if held.secure_id != session.secure_id => {
                    debug!(user_id = user, held = %held.secure_id, "slot holds another session");
                },
                _ => writes.push(Write::delete(keys::session(user))),
            }
        }
        self.store.apply(writes).await?;
        info!(secure_id = %session.secure_id, "session ended");
        Ok(())
    }
}
