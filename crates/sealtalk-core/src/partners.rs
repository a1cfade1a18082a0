//! Long-term contact index for inviters.
//!
//! Each inviter owns a set of `"{secure_id}:{invitee_id}"` members. The
//! partner record behind a member expires on its own; dangling members are
//! pruned the next time the list is read.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    UserId,
    config::ProtocolConfig,
    error::{CoreError, decode_cbor, encode_cbor},
    store::{SharedStore, keys},
    token::SecureId,
};

/// A past conversation partner of an inviter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRecord {
    /// Conversation the partner joined
    pub secure_id: SecureId,
    /// The invitee
    pub invitee_id: UserId,
    /// Invitee's display name when they accepted
    pub display_name: String,
}

/// Index from inviters to their partners.
#[derive(Clone)]
pub struct PartnerIndex {
    store: SharedStore,
    config: ProtocolConfig,
}

fn member(secure_id: &SecureId, invitee: UserId) -> String {
    format!("{secure_id}:{invitee}")
}

fn parse_member(member: &str) -> Option<(SecureId, UserId)> {
    let (secure_id, invitee) = member.split_once(':')?;
    Some((SecureId::parse(secure_id)?, invitee.parse().ok()?))
}

impl PartnerIndex {
    /// Create an index.
    pub fn new(store: SharedStore, config: ProtocolConfig) -> Self {
        Self { store, config }
    }

    /// Remember that `invitee` joined `secure_id` created by `inviter`.
    pub async fn record_conversation(
        &self,
        inviter: UserId,
        secure_id: &SecureId,
        invitee: UserId,
    ) -> Result<(), CoreError> {
        self.store.set_add(&keys::inviter_conversations(inviter), &member(secure_id, invitee)).await?;
        Ok(())
    }

    /// Store the partner record with the partner lifetime.
    pub async fn store_partner(&self, record: &PartnerRecord) -> Result<(), CoreError> {
        self.store
            .set(
                &keys::conversation_invitee(&record.secure_id),
                encode_cbor(record)?,
                Some(self.config.partner_ttl),
            )
            .await?;
        Ok(())
    }

    /// Drop one conversation from the index.
    pub async fn forget(
        &self,
        inviter: UserId,
        secure_id: &SecureId,
        invitee: UserId,
    ) -> Result<(), CoreError> {
        self.store
            .set_remove(&keys::inviter_conversations(inviter), &member(secure_id, invitee))
            .await?;
        self.store.delete(&keys::conversation_invitee(secure_id)).await?;
        Ok(())
    }

    /// Live partners of `inviter`, pruning members whose record expired.
    pub async fn partners(&self, inviter: UserId) -> Result<Vec<PartnerRecord>, CoreError> {
        let index = keys::inviter_conversations(inviter);
        let mut partners = Vec::new();

        for entry in self.store.set_members(&index).await? {
            let record = match parse_member(&entry) {
                Some((secure_id, _)) => {
                    self.store.get(&keys::conversation_invitee(&secure_id)).await?
                },
                None => None,
            };

            match record {
                Some(bytes) => partners.push(decode_cbor(&bytes)?),
                None => {
                    debug!(user_id = inviter, member = %entry, "pruning expired partner");
                    self.store.set_remove(&index, &entry).await?;
                },
            }
        }

        Ok(partners)
    }

    /// Most recent live conversation between `inviter` and `invitee`.
    pub async fn find_conversation(
        &self,
        inviter: UserId,
        invitee: UserId,
    ) -> Result<Option<PartnerRecord>, CoreError> {
        Ok(self.partners(inviter).await?.into_iter().find(|p| p.invitee_id == invitee))
    }

    /// Forget every partner of `inviter`. Returns how many were dropped.
    pub async fn reset(&self, inviter: UserId) -> Result<usize, CoreError> {
        let index = keys::inviter_conversations(inviter);
        let members = self.store.set_members(&index).await?;

        for entry in &members {
            if let Some((secure_id, _)) = parse_member(entry) {
                self.store.delete(&keys::conversation_invitee(&secure_id)).await?;
            }
            self.store.set_remove(&index, entry).await?;
        }

        info!(user_id = inviter, dropped = members.len(), "partner list reset");
        Ok(members.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SystemEnv, testing};

    fn record(invitee: UserId, name: &str) -> PartnerRecord {
        PartnerRecord {
            secure_id: SecureId::generate(&SystemEnv),
            invitee_id: invitee,
            display_name: name.to_owned(),
        }
    }

    async fn add(index: &PartnerIndex, inviter: UserId, record: &PartnerRecord) {
        index.record_conversation(inviter, &record.secure_id, record.invitee_id).await.unwrap();
        index.store_partner(record).await.unwrap();
    }

    #[tokio::test]
    async fn lists_and_finds_partners() {
        let index = PartnerIndex::new(testing::store(), testing::config());
        let bob = record(2, "bob");
        let carol = record(3, "carol");
        add(&index, 1, &bob).await;
        add(&index, 1, &carol).await;

        let mut partners = index.partners(1).await.unwrap();
        partners.sort_by_key(|p| p.invitee_id);
        assert_eq!(partners, vec![bob.clone(), carol]);

        assert_eq!(index.find_conversation(1, 2).await.unwrap(), Some(bob));
        assert_eq!(index.find_conversation(1, 4).await.unwrap(), None);
        assert!(index.partners(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prunes_members_without_record() {
        let store = testing::store();
        let index = PartnerIndex::new(store.clone(), testing::config());
        let bob = record(2, "bob");
        add(&index, 1, &bob).await;
        store.delete(&keys::conversation_invitee(&bob.secure_id)).await.unwrap();
        store.set_add(&keys::inviter_conversations(1), "garbage").await.unwrap();

        assert!(index.partners(1).await.unwrap().is_empty());
        assert!(store.set_members(&keys::inviter_conversations(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_and_forget() {
        let index = PartnerIndex::new(testing::store(), testing::config());
        let bob = record(2, "bob");
        let carol = record(3, "carol");
        add(&index, 1, &bob).await;
        add(&index, 1, &carol).await;

        index.forget(1, &bob.secure_id, 2).await.unwrap();
        assert_eq!(index.partners(1).await.unwrap(), vec![carol]);

        assert_eq!(index.reset(1).await.unwrap(), 1);
        assert!(index.partners(1).await.unwrap().is_empty());
    }
}
