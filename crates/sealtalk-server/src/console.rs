//! Line-oriented console driver.
//!
//! Each input line is `<user_id> <name> <input>`, where input is a command or
//! free text:
//!
//! ```text
//! /start                  bootstrap identity and listener
//! /start <secure_id>      open an invitation link
//! /invite                 create an invitation link
//! /invite <id> <name>     invite a known user directly
//! /abort                  propose ending the session
//! /press <payload>        press a button
//! anything else           send as a message
//! ```

use sealtalk_core::Interaction;

use crate::action::{Actor, RelayAction, RelayEvent};

/// Result of parsing one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// A well-formed event
    Event(RelayEvent),
    /// Blank line
    Empty,
    /// Malformed line
    Invalid {
        /// What was wrong
        error: String,
    },
}

fn invalid(error: impl Into<String>) -> ConsoleInput {
    ConsoleInput::Invalid { error: error.into() }
}

/// Parse a console line.
pub fn parse(line: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }

    let mut head = line.splitn(3, char::is_whitespace);
    let Some(Ok(id)) = head.next().map(str::parse::<u64>) else {
        return invalid("Usage: <user_id> <name> <input>");
    };
    let Some(name) = head.next().filter(|n| !n.is_empty()) else {
        return invalid("Missing name");
    };
    let actor = Actor::new(id, name.trim_start_matches('@'));
    let input = head.next().unwrap_or_default().trim();

    let Some(command) = input.strip_prefix('/') else {
        return if input.is_empty() {
            invalid("Empty message")
        } else {
            ConsoleInput::Event(RelayEvent::Text { actor, text: input.to_owned() })
        };
    };

    let parts: Vec<&str> = command.split_whitespace().collect();
    let event = match parts.as_slice() {
        ["start"] => RelayEvent::Start { actor },
        ["start", secure_id] => {
            RelayEvent::OpenInvitation { actor, secure_id: (*secure_id).to_owned() }
        },
        ["invite"] => RelayEvent::CreateInvitation { actor, invitee: None },
        ["invite", id, name] => match id.parse::<u64>() {
            Ok(id) => RelayEvent::CreateInvitation {
                actor,
                invitee: Some(Actor::new(id, name.trim_start_matches('@'))),
            },
            Err(_) => return invalid("Invalid user ID"),
        },
        ["invite", ..] => return invalid("Usage: /invite [<user_id> <name>]"),
        ["abort"] => RelayEvent::ProposeAbort { actor },
        ["press", payload] => match Interaction::parse(payload) {
            Ok(interaction) => RelayEvent::Pressed { actor, interaction },
            Err(e) => return invalid(format!("Invalid payload: {e}")),
        },
        ["press", ..] => return invalid("Usage: /press <payload>"),
        _ => return invalid(format!("Unknown command: /{command}")),
    };
    ConsoleInput::Event(event)
}

/// Render an action as one output line.
pub fn render(action: &RelayAction) -> String {
    let to = action.recipient();
    let body = match action {
        RelayAction::Notify { notice, .. } => notice.to_string(),
        RelayAction::Prompt { notice, button, .. } => format!("{notice} [{button}]"),
        RelayAction::InvitationPrompt { inviter_name, accept, decline, .. } => format!(
            "@{inviter_name} invites you to SealTalk. Accept? [accept: {accept}] [decline: {decline}]"
        ),
        RelayAction::InviteLink { secure_id, .. } => {
            format!("Share this invitation: /start {secure_id}")
        },
        RelayAction::Ciphertext { sender_name, preview, decrypt, .. } => {
            format!("@{sender_name} {preview}.. [decrypt: {decrypt}]")
        },
        RelayAction::Reveal { sender_name, plaintext, .. } => format!("@{sender_name}: {plaintext}"),
        RelayAction::AbortPrompt { abort, .. } => format!("End SealTalk? [abort: {abort}]"),
        RelayAction::Contacts { contacts, manual, .. } => {
            let mut line = if contacts.is_empty() {
                String::from("No chats yet. Invite someone:")
            } else {
                String::from("Pick a contact or invite someone new:")
            };
            for contact in contacts {
                line.push_str(&format!(" [{}: {}]", contact.name, contact.button));
            }
            line.push_str(&format!(" [manual: {manual}]"));
            line
        },
    };
    format!("[to {to}] {body}")
}

#[cfg(test)]
mod tests {
    use sealtalk_core::{ConversationAction, Role, SecureAction, SecureId};

    use super::*;
    use crate::action::{Contact, Notice};

    const ID: &str = "0123456789abcdef0123456789abcdef";

    fn actor() -> Actor {
        Actor::new(1, "alice")
    }

    #[test]
    fn parse_commands() {
        assert_eq!(parse("1 alice /start"), ConsoleInput::Event(RelayEvent::Start { actor: actor() }));
        assert_eq!(
            parse(&format!("1 @alice /start {ID}")),
            ConsoleInput::Event(RelayEvent::OpenInvitation { actor: actor(), secure_id: ID.into() })
        );
        assert_eq!(
            parse("1 alice /invite 2 @bob"),
            ConsoleInput::Event(RelayEvent::CreateInvitation {
                actor: actor(),
                invitee: Some(Actor::new(2, "bob")),
            })
        );
        assert_eq!(
            parse("1 alice /press conv:ir:prepare"),
            ConsoleInput::Event(RelayEvent::Pressed {
                actor: actor(),
                interaction: Interaction::Conversation {
                    role: Role::Inviter,
                    action: ConversationAction::Prepare,
                },
            })
        );
        assert_eq!(
            parse("1 alice hello there"),
            ConsoleInput::Event(RelayEvent::Text { actor: actor(), text: "hello there".into() })
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse("   "), ConsoleInput::Empty);
        assert!(matches!(parse("alice /start"), ConsoleInput::Invalid { .. }));
        assert!(matches!(parse("1"), ConsoleInput::Invalid { .. }));
        assert!(matches!(parse("1 alice"), ConsoleInput::Invalid { .. }));
        assert!(matches!(parse("1 alice /invite x bob"), ConsoleInput::Invalid { .. }));
        assert!(matches!(parse("1 alice /press nope"), ConsoleInput::Invalid { .. }));
        assert!(matches!(parse("1 alice /frobnicate"), ConsoleInput::Invalid { .. }));
    }

    #[test]
    fn render_notice() {
        let action = RelayAction::Notify { to: 2, notice: Notice::MessageExpired };
        insta::assert_snapshot!(render(&action), @"[to 2] Message expired or corrupted.");
    }

    #[test]
    fn render_invitation_prompt() {
        let secure_id = SecureId::parse(ID).unwrap();
        let action = RelayAction::InvitationPrompt {
            to: 2,
            inviter_name: "alice".into(),
            accept: Interaction::Invitation {
                action: sealtalk_core::InviteAction::Accept,
                secure_id: secure_id.clone(),
            },
            decline: Interaction::Invitation {
                action: sealtalk_core::InviteAction::Decline,
                secure_id,
            },
        };
        insta::assert_snapshot!(
            render(&action),
            @"[to 2] @alice invites you to SealTalk. Accept? [accept: invite:accept:0123456789abcdef0123456789abcdef] [decline: invite:decline:0123456789abcdef0123456789abcdef]"
        );
    }

    #[test]
    fn render_ciphertext_and_abort() {
        let secure_id = SecureId::parse(ID).unwrap();
        let ciphertext = RelayAction::Ciphertext {
            to: 2,
            sender_name: "alice".into(),
            preview: "a1b2c3d4e5".into(),
            decrypt: Interaction::Secure {
                role: Role::Invitee,
                action: SecureAction::Decrypt(sealtalk_core::CacheKey::parse(ID).unwrap()),
            },
        };
        insta::assert_snapshot!(
            render(&ciphertext),
            @"[to 2] @alice a1b2c3d4e5.. [decrypt: sec:ie:decrypt:0123456789abcdef0123456789abcdef]"
        );

        let abort = RelayAction::AbortPrompt {
            to: 1,
            abort: Interaction::Secure { role: Role::Inviter, action: SecureAction::Abort(secure_id) },
        };
        insta::assert_snapshot!(
            render(&abort),
            @"[to 1] End SealTalk? [abort: sec:ir:abort:0123456789abcdef0123456789abcdef]"
        );
    }

    #[test]
    fn render_contacts() {
        let action = RelayAction::Contacts {
            to: 1,
            contacts: vec![Contact {
                name: "bob".into(),
                button: Interaction::Conversation {
                    role: Role::Inviter,
                    action: ConversationAction::Invite(2),
                },
            }],
            manual: Interaction::Conversation { role: Role::Invitee, action: ConversationAction::Input },
        };
        insta::assert_snapshot!(
            render(&action),
            @"[to 1] Pick a contact or invite someone new: [bob: conv:ir:invite:2] [manual: conv:ie:input]"
        );
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_lines_never_panic(line in ".{0,80}") {
            let _ = parse(&line);
        }

        #[test]
        fn plain_text_is_relayed_verbatim(text in "[a-z][a-z ]{0,40}[a-z]") {
            let parsed = parse(&format!("7 carol {text}"));
            proptest::prop_assert_eq!(
                parsed,
                ConsoleInput::Event(RelayEvent::Text { actor: Actor::new(7, "carol"), text })
            );
        }
    }
}
