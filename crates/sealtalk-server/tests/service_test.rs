//! Relay service tests
//!
//! Drives full conversations through `RelayService::process_event` over an
//! in-memory store and checks the actions each participant would see.

use std::{sync::Arc, time::Duration};

use sealtalk_core::{
    ConversationAction, Interaction, InvitationStatus, InviteAction, MemoryStore, Protocol,
    ProtocolConfig, Role, SecureAction, SecureId, SystemEnv,
};
use sealtalk_server::{Actor, Notice, RelayAction, RelayEvent, RelayService};

const ALICE: u64 = 1;
const BOB: u64 = 2;

fn service() -> RelayService<SystemEnv> {
    let config = ProtocolConfig { rsa_bits: 1024, ..ProtocolConfig::default() };
    let store = Arc::new(MemoryStore::new(SystemEnv));
    RelayService::new(Protocol::new(store, SystemEnv, config, b"service test secret".to_vec()))
}

fn alice() -> Actor {
    Actor::new(ALICE, "alice")
}

fn bob() -> Actor {
    Actor::new(BOB, "bob")
}

fn press(actor: Actor, interaction: Interaction) -> RelayEvent {
    RelayEvent::Pressed { actor, interaction }
}

fn text(actor: Actor, text: &str) -> RelayEvent {
    RelayEvent::Text { actor, text: text.into() }
}

fn notice(to: u64, notice: Notice) -> RelayAction {
    RelayAction::Notify { to, notice }
}

async fn invite_link(service: &RelayService<SystemEnv>) -> SecureId {
    let actions =
        service.process_event(RelayEvent::CreateInvitation { actor: alice(), invitee: None }).await;
    match actions.as_slice() {
        [RelayAction::InviteLink { to: ALICE, secure_id }] => secure_id.clone(),
        other => panic!("expected invite link, got {other:?}"),
    }
}

/// Alice invites Bob by link and Bob accepts.
async fn connected() -> (RelayService<SystemEnv>, SecureId) {
    let service = service();
    assert_eq!(
        service.process_event(RelayEvent::Start { actor: alice() }).await,
        vec![notice(ALICE, Notice::Welcome)]
    );
    service.process_event(RelayEvent::Start { actor: bob() }).await;

    let secure_id = invite_link(&service).await;
    let opened = service
        .process_event(RelayEvent::OpenInvitation {
            actor: bob(),
            secure_id: secure_id.to_string(),
        })
        .await;
    let accept = match opened.as_slice() {
        [RelayAction::InvitationPrompt { to: BOB, inviter_name, accept, .. }] => {
            assert_eq!(inviter_name, "alice");
            accept.clone()
        },
        other => panic!("expected invitation prompt, got {other:?}"),
    };

    let accepted = service.process_event(press(bob(), accept)).await;
    assert_eq!(accepted, vec![
        RelayAction::Prompt {
            to: ALICE,
            notice: Notice::Accepted { invitee_name: "bob".into() },
            button: Interaction::Conversation {
                role: Role::Inviter,
                action: ConversationAction::Start(BOB),
            },
        },
        notice(BOB, Notice::AwaitingStart { inviter_name: "alice".into() }),
    ]);
    wait_for_listener_exit(&service, ALICE).await;

    (service, secure_id)
}

async fn wait_for_listener_exit(service: &RelayService<SystemEnv>, user: u64) {
    let registry = service.protocol().listener.registry();
    for _ in 0..200 {
        if !registry.is_running(user).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("listener for {user} never finished");
}

/// Sends `body` and returns the decrypt button the recipient gets.
async fn send(service: &RelayService<SystemEnv>, from: Actor, to: u64, body: &str) -> Interaction {
    let sender_id = from.id;
    let actions = service.process_event(text(from, body)).await;
    match actions.as_slice() {
        [
            RelayAction::Ciphertext { to: recipient, preview, decrypt, .. },
            RelayAction::Notify { to: sender, notice: Notice::Delivered { .. } },
        ] => {
            assert_eq!(*recipient, to);
            assert_eq!(*sender, sender_id);
            assert_eq!(preview.len(), 10);
            assert!(preview.chars().all(|c| c.is_ascii_hexdigit()));
            decrypt.clone()
        },
        other => panic!("expected ciphertext, got {other:?}"),
    }
}

#[tokio::test]
async fn link_invitation_then_messages_both_ways() {
    let (service, _) = connected().await;

    let started = service
        .process_event(press(alice(), Interaction::Conversation {
            role: Role::Inviter,
            action: ConversationAction::Start(BOB),
        }))
        .await;
    assert_eq!(started, vec![
        notice(ALICE, Notice::SessionEstablished),
        notice(BOB, Notice::SessionEstablished),
    ]);

    let decrypt = send(&service, alice(), BOB, "hello").await;
    assert!(matches!(decrypt, Interaction::Secure { role: Role::Invitee, .. }));
    assert_eq!(service.process_event(press(bob(), decrypt)).await, vec![RelayAction::Reveal {
        to: BOB,
        sender_name: "alice".into(),
        plaintext: "hello".into(),
    }]);

    let decrypt = send(&service, bob(), ALICE, "hi alice").await;
    assert!(matches!(decrypt, Interaction::Secure { role: Role::Inviter, .. }));
    assert_eq!(service.process_event(press(alice(), decrypt)).await, vec![RelayAction::Reveal {
        to: ALICE,
        sender_name: "bob".into(),
        plaintext: "hi alice".into(),
    }]);
}

#[tokio::test]
async fn decrypt_with_wrong_role_is_rejected() {
    let (service, _) = connected().await;

    let decrypt = send(&service, alice(), BOB, "secret").await;
    let Interaction::Secure { action, .. } = decrypt else { panic!("not a secure button") };
    let forged = Interaction::Secure { role: Role::Inviter, action };

    assert_eq!(service.process_event(press(bob(), forged)).await, vec![notice(
        BOB,
        Notice::NoActiveSession
    )]);
}

#[tokio::test]
async fn unknown_cache_key_reports_expired() {
    let (service, _) = connected().await;
    let key = sealtalk_core::CacheKey::parse("00000000000000000000000000000000").unwrap();

    let actions = service
        .process_event(press(bob(), Interaction::Secure {
            role: Role::Invitee,
            action: SecureAction::Decrypt(key),
        }))
        .await;
    assert_eq!(actions, vec![notice(BOB, Notice::MessageExpired)]);
}

#[tokio::test]
async fn start_during_session_is_refused() {
    let (service, _) = connected().await;
    assert_eq!(service.process_event(RelayEvent::Start { actor: bob() }).await, vec![notice(
        BOB,
        Notice::AlreadyInSession
    )]);
}

#[tokio::test]
async fn accepted_invitation_cannot_be_reused() {
    let (service, secure_id) = connected().await;
    let carol = Actor::new(3, "carol");
    service.process_event(RelayEvent::Start { actor: carol.clone() }).await;

    let actions = service
        .process_event(press(carol, Interaction::Invitation {
            action: InviteAction::Accept,
            secure_id,
        }))
        .await;
    assert_eq!(actions, vec![notice(3, Notice::InvitationInvalid)]);
}

#[tokio::test]
async fn text_without_session() {
    let service = service();
    assert_eq!(service.process_event(text(alice(), "anyone?")).await, vec![notice(
        ALICE,
        Notice::NoActiveSession
    )]);
}

#[tokio::test]
async fn invitation_requires_identity() {
    let service = service();
    let actions =
        service.process_event(RelayEvent::CreateInvitation { actor: alice(), invitee: None }).await;
    assert_eq!(actions, vec![notice(ALICE, Notice::StartFirst)]);
}

#[tokio::test]
async fn opening_own_invitation() {
    let service = service();
    service.process_event(RelayEvent::Start { actor: alice() }).await;
    let secure_id = invite_link(&service).await;

    let actions = service
        .process_event(RelayEvent::OpenInvitation {
            actor: alice(),
            secure_id: secure_id.to_string(),
        })
        .await;
    assert_eq!(actions, vec![notice(ALICE, Notice::SelfInvite)]);
}

#[tokio::test]
async fn garbage_link_is_invalid() {
    let service = service();
    let actions = service
        .process_event(RelayEvent::OpenInvitation { actor: bob(), secure_id: "nope".into() })
        .await;
    assert_eq!(actions, vec![notice(BOB, Notice::InvitationInvalid)]);
}

#[tokio::test]
async fn addressed_invitation_reaches_invitee() {
    let service = service();
    service.process_event(RelayEvent::Start { actor: alice() }).await;

    let actions = service
        .process_event(RelayEvent::CreateInvitation { actor: alice(), invitee: Some(bob()) })
        .await;
    match actions.as_slice() {
        [
            RelayAction::InvitationPrompt { to: BOB, inviter_name, .. },
            RelayAction::Notify { to: ALICE, notice: Notice::InvitationSent { invitee_name } },
        ] => {
            assert_eq!(inviter_name, "alice");
            assert_eq!(invitee_name, "bob");
        },
        other => panic!("unexpected actions {other:?}"),
    }
}

#[tokio::test]
async fn decline_then_cancel() {
    let service = service();
    service.process_event(RelayEvent::Start { actor: alice() }).await;
    let secure_id = invite_link(&service).await;

    let declined = service
        .process_event(press(bob(), Interaction::Invitation {
            action: InviteAction::Decline,
            secure_id: secure_id.clone(),
        }))
        .await;
    let expected_notice =
        Notice::Declined { inviter_name: "alice".into(), invitee_name: "bob".into() };
    let cancel = Interaction::Conversation {
        role: Role::Inviter,
        action: ConversationAction::Cancel(secure_id.clone()),
    };
    assert_eq!(declined, vec![
        RelayAction::Prompt { to: ALICE, notice: expected_notice.clone(), button: cancel.clone() },
        notice(BOB, expected_notice),
    ]);

    assert_eq!(service.process_event(press(alice(), cancel)).await, vec![notice(
        ALICE,
        Notice::InvitationWithdrawn
    )]);

    let reopened = service
        .process_event(RelayEvent::OpenInvitation {
            actor: bob(),
            secure_id: secure_id.to_string(),
        })
        .await;
    assert_eq!(reopened, vec![notice(BOB, Notice::InvitationInvalid)]);
}

#[tokio::test]
async fn abort_ends_session_for_both() {
    let (service, secure_id) = connected().await;

    let proposed = service.process_event(RelayEvent::ProposeAbort { actor: bob() }).await;
    assert_eq!(proposed, vec![
        RelayAction::AbortPrompt {
            to: BOB,
            abort: Interaction::Secure {
                role: Role::Invitee,
                action: SecureAction::Abort(secure_id.clone()),
            },
        },
        RelayAction::AbortPrompt {
            to: ALICE,
            abort: Interaction::Secure {
                role: Role::Inviter,
                action: SecureAction::Abort(secure_id.clone()),
            },
        },
    ]);

    let ended = service
        .process_event(press(alice(), Interaction::Secure {
            role: Role::Inviter,
            action: SecureAction::Abort(secure_id.clone()),
        }))
        .await;
    let expected = Notice::SessionEnded { inviter_name: "alice".into(), invitee_name: "bob".into() };
    assert_eq!(ended, vec![notice(ALICE, expected.clone()), notice(BOB, expected)]);

    assert_eq!(service.process_event(text(bob(), "still there?")).await, vec![notice(
        BOB,
        Notice::NoActiveSession
    )]);
    assert!(service.protocol().handshake.session_key(&secure_id).await.is_err());
}

#[tokio::test]
async fn accepting_while_inviter_is_busy_keeps_both_sessions_intact() {
    let (service, first) = connected().await;
    let carol = Actor::new(3, "carol");
    service.process_event(RelayEvent::Start { actor: carol.clone() }).await;
    let second = invite_link(&service).await;

    let actions = service
        .process_event(press(carol, Interaction::Invitation {
            action: InviteAction::Accept,
            secure_id: second.clone(),
        }))
        .await;
    assert_eq!(actions, vec![notice(3, Notice::PartnerBusy)]);

    let sessions = &service.protocol().sessions;
    assert_eq!(sessions.get(3).await.unwrap(), None);
    assert_eq!(sessions.get_verified(ALICE).await.unwrap().unwrap().secure_id, first);
    assert_eq!(
        service.protocol().ledger.status(&second).await.unwrap(),
        Some(InvitationStatus::InProgress)
    );

    let ended = service
        .process_event(press(bob(), Interaction::Secure {
            role: Role::Invitee,
            action: SecureAction::Abort(first.clone()),
        }))
        .await;
    let expected = Notice::SessionEnded { inviter_name: "alice".into(), invitee_name: "bob".into() };
    assert_eq!(ended, vec![notice(ALICE, expected.clone()), notice(BOB, expected)]);
    assert_eq!(sessions.get(ALICE).await.unwrap(), None);
    assert_eq!(sessions.get(BOB).await.unwrap(), None);
}

#[tokio::test]
async fn direct_chat_during_session_is_refused() {
    let (service, secure_id) = connected().await;

    let actions = service
        .process_event(press(alice(), Interaction::Conversation {
            role: Role::Inviter,
            action: ConversationAction::Invite(BOB),
        }))
        .await;
    assert_eq!(actions, vec![notice(ALICE, Notice::AlreadyInSession)]);
    assert_eq!(
        service.protocol().sessions.get_verified(BOB).await.unwrap().unwrap().secure_id,
        secure_id
    );
}

#[tokio::test]
async fn cancel_with_active_session_id_leaves_session_alone() {
    let (service, secure_id) = connected().await;

    let actions = service
        .process_event(press(alice(), Interaction::Conversation {
            role: Role::Inviter,
            action: ConversationAction::Cancel(secure_id.clone()),
        }))
        .await;
    assert_eq!(actions, vec![notice(ALICE, Notice::InvitationWithdrawn)]);

    let sessions = &service.protocol().sessions;
    assert_eq!(sessions.get_verified(ALICE).await.unwrap().unwrap().secure_id, secure_id);
    assert_eq!(sessions.get_verified(BOB).await.unwrap().unwrap().secure_id, secure_id);
    send(&service, bob(), ALICE, "still here").await;
}

#[tokio::test]
async fn only_the_inviter_can_cancel() {
    let service = service();
    service.process_event(RelayEvent::Start { actor: alice() }).await;
    let secure_id = invite_link(&service).await;

    let actions = service
        .process_event(press(bob(), Interaction::Conversation {
            role: Role::Inviter,
            action: ConversationAction::Cancel(secure_id.clone()),
        }))
        .await;
    assert_eq!(actions, vec![notice(BOB, Notice::NoActiveSession)]);

    let reopened = service
        .process_event(RelayEvent::OpenInvitation {
            actor: bob(),
            secure_id: secure_id.to_string(),
        })
        .await;
    assert!(matches!(reopened.as_slice(), [RelayAction::InvitationPrompt { to: BOB, .. }]));
}

#[tokio::test]
async fn abort_with_stale_session_id_is_rejected() {
    let (service, _) = connected().await;
    let stale = SecureId::parse("ffffffffffffffffffffffffffffffff").unwrap();

    let actions = service
        .process_event(press(alice(), Interaction::Secure {
            role: Role::Inviter,
            action: SecureAction::Abort(stale),
        }))
        .await;
    assert_eq!(actions, vec![notice(ALICE, Notice::NoActiveSession)]);
}

#[tokio::test]
async fn contacts_then_direct_chat() {
    let (service, secure_id) = connected().await;
    service
        .process_event(press(alice(), Interaction::Secure {
            role: Role::Inviter,
            action: SecureAction::Abort(secure_id),
        }))
        .await;

    let contacts = service
        .process_event(press(alice(), Interaction::Conversation {
            role: Role::Inviter,
            action: ConversationAction::Prepare,
        }))
        .await;
    let button = match contacts.as_slice() {
        [RelayAction::Contacts { to: ALICE, contacts, manual }] => {
            assert_eq!(*manual, Interaction::Conversation {
                role: Role::Invitee,
                action: ConversationAction::Input,
            });
            assert_eq!(contacts.len(), 1);
            assert_eq!(contacts[0].name, "bob");
            contacts[0].button.clone()
        },
        other => panic!("expected contacts, got {other:?}"),
    };

    assert_eq!(service.process_event(press(alice(), button)).await, vec![
        notice(ALICE, Notice::SessionEstablished),
        notice(BOB, Notice::SessionEstablished),
    ]);

    let decrypt = send(&service, bob(), ALICE, "welcome back").await;
    assert_eq!(service.process_event(press(alice(), decrypt)).await, vec![RelayAction::Reveal {
        to: ALICE,
        sender_name: "bob".into(),
        plaintext: "welcome back".into(),
    }]);

    let partners = service.protocol().partners.partners(ALICE).await.unwrap();
    assert_eq!(partners.len(), 1);
}

#[tokio::test]
async fn direct_chat_with_stranger() {
    let service = service();
    service.process_event(RelayEvent::Start { actor: alice() }).await;

    let actions = service
        .process_event(press(alice(), Interaction::Conversation {
            role: Role::Inviter,
            action: ConversationAction::Invite(99),
        }))
        .await;
    assert_eq!(actions, vec![notice(ALICE, Notice::UnknownPartner)]);
}

#[tokio::test]
async fn reset_forgets_partners() {
    let (service, _) = connected().await;

    let actions = service
        .process_event(press(alice(), Interaction::Conversation {
            role: Role::Inviter,
            action: ConversationAction::Reset,
        }))
        .await;
    assert_eq!(actions, vec![notice(ALICE, Notice::ContactsReset { dropped: 1 })]);
    assert!(service.protocol().partners.partners(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn manual_input_creates_link() {
    let service = service();
    service.process_event(RelayEvent::Start { actor: alice() }).await;

    let actions = service
        .process_event(press(alice(), Interaction::Conversation {
            role: Role::Invitee,
            action: ConversationAction::Input,
        }))
        .await;
    assert!(matches!(actions.as_slice(), [RelayAction::InviteLink { to: ALICE, .. }]));
}
