//! Event to action driver.
//!
//! Each event is handled independently; all coordination with the other
//! participant goes through the store. Handlers return the actions to
//! deliver, or an error that [`RelayService::process_event`] logs and turns
//! into a [`Notice`] for the acting user only.

use sealtalk_core::{
    ConversationAction, CoreError, Environment, Interaction, InvitationStatus, InviteAction,
    Protocol, Role, SecureAction, SecureId, Session, UserId,
};
use tracing::{debug, info, instrument};

use crate::{
    action::{Actor, Contact, Notice, RelayAction, RelayEvent},
    error::ServerError,
};

/// Hex digits of ciphertext shown before the decrypt button
const PREVIEW_LEN: usize = 10;

type Actions = Result<Vec<RelayAction>, ServerError>;

fn notify(to: UserId, notice: Notice) -> RelayAction {
    RelayAction::Notify { to, notice }
}

fn notice_for(error: &ServerError) -> Notice {
    match error {
        ServerError::Core(core) => match core {
            CoreError::IdentityMissing { .. } => Notice::StartFirst,
            CoreError::InvalidOrExpired => Notice::InvitationInvalid,
            CoreError::InvalidHandshakeState | CoreError::AlreadyCompletedOrInvalid => {
                Notice::InvitationUsed
            },
            CoreError::SelfInviteRejected => Notice::SelfInvite,
            CoreError::SessionKeyMissing { .. } | CoreError::AsymmetricSession => {
                Notice::SessionBroken
            },
            CoreError::Crypto(_) | CoreError::DecryptionFailure => Notice::MessageExpired,
            _ => Notice::InternalError,
        },
        ServerError::NoActiveSession | ServerError::SessionMismatch => Notice::NoActiveSession,
        ServerError::UnknownPartner { .. } => Notice::UnknownPartner,
        ServerError::AlreadyInSession { .. } => Notice::AlreadyInSession,
        ServerError::PartnerBusy { .. } => Notice::PartnerBusy,
        ServerError::Config(_) | ServerError::Io(_) => Notice::InternalError,
    }
}

/// Relay orchestration over a [`Protocol`].
#[derive(Clone)]
pub struct RelayService<E: Environment> {
    protocol: Protocol<E>,
}

impl<E: Environment> RelayService<E> {
    /// Create a service.
    pub fn new(protocol: Protocol<E>) -> Self {
        Self { protocol }
    }

    /// Underlying components.
    pub fn protocol(&self) -> &Protocol<E> {
        &self.protocol
    }

    /// Handle one event.
    ///
    /// Never fails: errors become a notice to the acting user.
    #[instrument(skip_all, fields(user_id = event.actor().id))]
    pub async fn process_event(&self, event: RelayEvent) -> Vec<RelayAction> {
        let actor = event.actor().clone();
        match self.handle(event).await {
            Ok(actions) => actions,
            Err(e) => {
                e.log(actor.id, "event failed");
                vec![notify(actor.id, notice_for(&e))]
            },
        }
    }

    async fn handle(&self, event: RelayEvent) -> Actions {
        match event {
            RelayEvent::Start { actor } => self.start(&actor).await,
            RelayEvent::OpenInvitation { actor, secure_id } => {
                self.open_invitation(&actor, &secure_id).await
            },
            RelayEvent::CreateInvitation { actor, invitee } => {
                self.create_invitation(&actor, invitee.as_ref()).await
            },
            RelayEvent::Pressed { actor, interaction } => self.pressed(&actor, interaction).await,
            RelayEvent::Text { actor, text } => self.relay_text(&actor, &text).await,
            RelayEvent::ProposeAbort { actor } => self.propose_abort(&actor).await,
        }
    }

    async fn pressed(&self, actor: &Actor, interaction: Interaction) -> Actions {
        match interaction {
            Interaction::Invitation { action: InviteAction::Accept, secure_id } => {
                self.accept(actor, &secure_id).await
            },
            Interaction::Invitation { action: InviteAction::Decline, secure_id } => {
                self.decline(actor, &secure_id).await
            },
            Interaction::Secure { role, action: SecureAction::Decrypt(key) } => {
                self.decrypt(actor, role, key.as_str()).await
            },
            Interaction::Secure { role, action: SecureAction::Abort(secure_id) } => {
                self.abort(actor, role, &secure_id).await
            },
            Interaction::Conversation { action, .. } => match action {
                ConversationAction::Prepare => self.contacts(actor).await,
                ConversationAction::Invite(invitee) => self.direct_chat(actor, invitee).await,
                ConversationAction::Cancel(secure_id) => self.cancel(actor, &secure_id).await,
                ConversationAction::Reset => self.reset(actor).await,
                ConversationAction::Input => self.create_invitation(actor, None).await,
                ConversationAction::Start(invitee) => self.open_session(actor, invitee).await,
            },
        }
    }

    async fn start(&self, actor: &Actor) -> Actions {
        if self.protocol.sessions.get(actor.id).await?.is_some() {
            info!(user_id = actor.id, "start while in session");
            return Ok(vec![notify(actor.id, Notice::AlreadyInSession)]);
        }

        self.protocol.identities.ensure(actor.id).await?;
        self.protocol.listener.start(actor.id).await?;
        Ok(vec![notify(actor.id, Notice::Welcome)])
    }

    async fn open_invitation(&self, actor: &Actor, secure_id: &str) -> Actions {
        let invitation = self.protocol.ledger.resolve(secure_id).await?;
        if invitation.inviter_id == actor.id {
            return Ok(vec![notify(actor.id, Notice::SelfInvite)]);
        }

        Ok(vec![invitation_prompt(actor.id, invitation.inviter_name, invitation.secure_id)])
    }

    async fn create_invitation(&self, actor: &Actor, invitee: Option<&Actor>) -> Actions {
        let secure_id = self.protocol.ledger.create(actor.id, &actor.name).await?;

        Ok(match invitee {
            None => vec![RelayAction::InviteLink { to: actor.id, secure_id }],
            Some(invitee) => vec![
                invitation_prompt(invitee.id, actor.name.clone(), secure_id),
                notify(actor.id, Notice::InvitationSent { invitee_name: invitee.name.clone() }),
            ],
        })
    }

    async fn accept(&self, actor: &Actor, secure_id: &SecureId) -> Actions {
        let invitation = self.protocol.ledger.resolve(secure_id.as_str()).await?;
        if invitation.inviter_id != actor.id {
            self.ensure_free(actor.id, invitation.inviter_id).await?;
        }
        self.protocol.handshake.accept(&invitation, actor.id, &actor.name).await?;

        let session = Session {
            secure_id: invitation.secure_id.clone(),
            inviter_id: invitation.inviter_id,
            inviter_name: invitation.inviter_name.clone(),
            invitee_id: actor.id,
            invitee_name: actor.name.clone(),
        };
        self.protocol.sessions.set_symmetric(session.inviter_id, actor.id, &session).await?;
        self.protocol.ledger.consume(secure_id).await?;

        info!(
            secure_id = %secure_id,
            inviter = session.inviter_id,
            invitee = actor.id,
            "invitation resolved"
        );
        Ok(vec![
            RelayAction::Prompt {
                to: session.inviter_id,
                notice: Notice::Accepted { invitee_name: actor.name.clone() },
                button: Interaction::Conversation {
                    role: Role::Inviter,
                    action: ConversationAction::Start(actor.id),
                },
            },
            notify(actor.id, Notice::AwaitingStart { inviter_name: session.inviter_name }),
        ])
    }

    async fn decline(&self, actor: &Actor, secure_id: &SecureId) -> Actions {
        let invitation = self.protocol.ledger.resolve(secure_id.as_str()).await?;
        if invitation.inviter_id == actor.id {
            return Ok(vec![notify(actor.id, Notice::SelfInvite)]);
        }
        self.protocol.ledger.revoke(secure_id).await?;

        let notice = Notice::Declined {
            inviter_name: invitation.inviter_name,
            invitee_name: actor.name.clone(),
        };
        Ok(vec![
            RelayAction::Prompt {
                to: invitation.inviter_id,
                notice: notice.clone(),
                button: Interaction::Conversation {
                    role: Role::Inviter,
                    action: ConversationAction::Cancel(secure_id.clone()),
                },
            },
            notify(actor.id, notice),
        ])
    }

    /// Withdraws a pending invitation. Sessions are only ended through abort.
    async fn cancel(&self, actor: &Actor, secure_id: &SecureId) -> Actions {
        match self.protocol.ledger.resolve(secure_id.as_str()).await {
            Ok(invitation) if invitation.inviter_id != actor.id => {
                return Err(ServerError::SessionMismatch);
            },
            Ok(_) => {
                let status = self.protocol.ledger.status(secure_id).await?;
                if status == Some(InvitationStatus::InProgress) {
                    self.protocol.ledger.revoke(secure_id).await?;
                }
            },
            // Declined or expired: nothing left to withdraw.
            Err(CoreError::InvalidOrExpired) => {},
            Err(e) => return Err(e.into()),
        }
        Ok(vec![notify(actor.id, Notice::InvitationWithdrawn)])
    }

    /// Fails unless neither party holds a session.
    async fn ensure_free(&self, actor: UserId, partner: UserId) -> Result<(), ServerError> {
        match self.protocol.sessions.occupied(&[actor, partner]).await? {
            None => Ok(()),
            Some(user_id) if user_id == actor => Err(ServerError::AlreadyInSession { user_id }),
            Some(user_id) => Err(ServerError::PartnerBusy { user_id }),
        }
    }

    async fn open_session(&self, actor: &Actor, invitee: UserId) -> Actions {
        let session = self.active_session(actor.id).await?;
        if session.inviter_id != actor.id || session.invitee_id != invitee {
            return Err(ServerError::SessionMismatch);
        }
        Ok(vec![
            notify(actor.id, Notice::SessionEstablished),
            notify(invitee, Notice::SessionEstablished),
        ])
    }

    async fn direct_chat(&self, actor: &Actor, invitee: UserId) -> Actions {
        let partner = self
            .protocol
            .partners
            .find_conversation(actor.id, invitee)
            .await?
            .ok_or(ServerError::UnknownPartner { invitee })?;
        self.ensure_free(actor.id, invitee).await?;

        let secure_id = self.protocol.ledger.create(actor.id, &actor.name).await?;
        let invitation = self.protocol.ledger.resolve(secure_id.as_str()).await?;
        self.protocol.handshake.accept(&invitation, invitee, &partner.display_name).await?;

        let session = Session {
            secure_id: secure_id.clone(),
            inviter_id: actor.id,
            inviter_name: actor.name.clone(),
            invitee_id: invitee,
            invitee_name: partner.display_name.clone(),
        };
        self.protocol.sessions.set_symmetric(actor.id, invitee, &session).await?;
        self.protocol.ledger.consume(&secure_id).await?;
        self.protocol.partners.forget(actor.id, &partner.secure_id, invitee).await?;

        info!(secure_id = %secure_id, inviter = actor.id, invitee, "direct chat established");
        Ok(vec![
            notify(actor.id, Notice::SessionEstablished),
            notify(invitee, Notice::SessionEstablished),
        ])
    }

    async fn contacts(&self, actor: &Actor) -> Actions {
        let contacts = self
            .protocol
            .partners
            .partners(actor.id)
            .await?
            .into_iter()
            .map(|partner| Contact {
                name: partner.display_name,
                button: Interaction::Conversation {
                    role: Role::Inviter,
                    action: ConversationAction::Invite(partner.invitee_id),
                },
            })
            .collect();

        Ok(vec![RelayAction::Contacts {
            to: actor.id,
            contacts,
            manual: Interaction::Conversation {
                role: Role::Invitee,
                action: ConversationAction::Input,
            },
        }])
    }

    async fn reset(&self, actor: &Actor) -> Actions {
        let dropped = self.protocol.partners.reset(actor.id).await?;
        Ok(vec![notify(actor.id, Notice::ContactsReset { dropped })])
    }

    async fn relay_text(&self, actor: &Actor, text: &str) -> Actions {
        let session = self
            .protocol
            .sessions
            .get_verified(actor.id)
            .await?
            .ok_or(ServerError::NoActiveSession)?;
        let (recipient, recipient_name) =
            session.counterpart(actor.id).ok_or(ServerError::SessionMismatch)?;
        let recipient_role = session.role(recipient).ok_or(ServerError::SessionMismatch)?;

        let key = self.protocol.handshake.session_key(&session.secure_id).await?;
        let ciphertext = self.protocol.cipher.encrypt(&key, text);
        let preview: String = hex::encode(&ciphertext).chars().take(PREVIEW_LEN).collect();
        let cache_key = self.protocol.cache.put(ciphertext).await?;

        debug!(secure_id = %session.secure_id, from = actor.id, to = recipient, "message relayed");
        Ok(vec![
            RelayAction::Ciphertext {
                to: recipient,
                sender_name: actor.name.clone(),
                preview,
                decrypt: Interaction::Secure {
                    role: recipient_role,
                    action: SecureAction::Decrypt(cache_key),
                },
            },
            notify(
                actor.id,
                Notice::Delivered {
                    sender_name: actor.name.clone(),
                    recipient_name: recipient_name.to_owned(),
                },
            ),
        ])
    }

    async fn decrypt(&self, actor: &Actor, role: Role, cache_key: &str) -> Actions {
        let session = self.active_session(actor.id).await?;
        if session.role(actor.id) != Some(role) {
            return Err(ServerError::SessionMismatch);
        }
        let (_, sender_name) = session.counterpart(actor.id).ok_or(ServerError::SessionMismatch)?;
        let key = self.protocol.handshake.session_key(&session.secure_id).await?;

        let plaintext = match self.protocol.cache.get(cache_key).await {
            Ok(blob) => self.protocol.cipher.decrypt(&key, &blob).ok(),
            Err(CoreError::InvalidOrExpired) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(match plaintext {
            Some(plaintext) => {
                info!(user_id = actor.id, secure_id = %session.secure_id, "message decrypted");
                vec![RelayAction::Reveal {
                    to: actor.id,
                    sender_name: sender_name.to_owned(),
                    plaintext,
                }]
            },
            None => {
                info!(user_id = actor.id, "message expired or corrupted");
                vec![notify(actor.id, Notice::MessageExpired)]
            },
        })
    }

    async fn propose_abort(&self, actor: &Actor) -> Actions {
        let session = self.active_session(actor.id).await?;
        let (other, _) = session.counterpart(actor.id).ok_or(ServerError::SessionMismatch)?;

        Ok([actor.id, other]
            .into_iter()
            .filter_map(|user| {
                let role = session.role(user)?;
                Some(RelayAction::AbortPrompt {
                    to: user,
                    abort: Interaction::Secure {
                        role,
                        action: SecureAction::Abort(session.secure_id.clone()),
                    },
                })
            })
            .collect())
    }

    async fn abort(&self, actor: &Actor, role: Role, secure_id: &SecureId) -> Actions {
        let session = self.active_session(actor.id).await?;
        if session.secure_id != *secure_id || session.role(actor.id) != Some(role) {
            return Err(ServerError::SessionMismatch);
        }
        self.protocol.sessions.end(&session).await?;

        let notice = Notice::SessionEnded {
            inviter_name: session.inviter_name.clone(),
            invitee_name: session.invitee_name.clone(),
        };
        Ok(vec![
            notify(session.inviter_id, notice.clone()),
            notify(session.invitee_id, notice),
        ])
    }

    async fn active_session(&self, user: UserId) -> Result<Session, ServerError> {
        self.protocol.sessions.get(user).await?.ok_or(ServerError::NoActiveSession)
    }
}

fn invitation_prompt(to: UserId, inviter_name: String, secure_id: SecureId) -> RelayAction {
    RelayAction::InvitationPrompt {
        to,
        inviter_name,
        accept: Interaction::Invitation {
            action: InviteAction::Accept,
            secure_id: secure_id.clone(),
        },
        decline: Interaction::Invitation { action: InviteAction::Decline, secure_id },
    }
}
