//! Inbound events, outbound actions and the notice lexicon.

use std::fmt;

use sealtalk_core::{Interaction, SecureId, UserId};

/// A platform user acting in an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Platform user id
    pub id: UserId,
    /// Display name (handle)
    pub name: String,
}

impl Actor {
    /// Create an actor.
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Something a user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Plain `/start`: bootstrap identity and listener
    Start {
        /// Sender
        actor: Actor,
    },
    /// `/start {secure_id}` from an invitation link
    OpenInvitation {
        /// Sender
        actor: Actor,
        /// Raw link payload
        secure_id: String,
    },
    /// Create an invitation, as a link or addressed to a resolved user
    CreateInvitation {
        /// Inviter
        actor: Actor,
        /// Invitee, if the transport could resolve one
        invitee: Option<Actor>,
    },
    /// A button was pressed
    Pressed {
        /// Presser
        actor: Actor,
        /// Decoded payload
        interaction: Interaction,
    },
    /// Free text
    Text {
        /// Sender
        actor: Actor,
        /// Message body
        text: String,
    },
    /// `/abort`
    ProposeAbort {
        /// Sender
        actor: Actor,
    },
}

impl RelayEvent {
    /// The user who caused this event.
    pub fn actor(&self) -> &Actor {
        match self {
            Self::Start { actor }
            | Self::OpenInvitation { actor, .. }
            | Self::CreateInvitation { actor, .. }
            | Self::Pressed { actor, .. }
            | Self::Text { actor, .. }
            | Self::ProposeAbort { actor } => actor,
        }
    }
}

/// One entry of the contact picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Partner display name
    pub name: String,
    /// Button starting a chat with this partner
    pub button: Interaction,
}

/// Something the transport must deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Plain notice
    Notify {
        /// Recipient
        to: UserId,
        /// What to say
        notice: Notice,
    },
    /// Notice with one button
    Prompt {
        /// Recipient
        to: UserId,
        /// What to say
        notice: Notice,
        /// Attached button
        button: Interaction,
    },
    /// Accept/decline question for an invitee
    InvitationPrompt {
        /// Invitee
        to: UserId,
        /// Who is inviting
        inviter_name: String,
        /// Accept button
        accept: Interaction,
        /// Decline button
        decline: Interaction,
    },
    /// Shareable invitation link for the inviter
    InviteLink {
        /// Inviter
        to: UserId,
        /// Link payload
        secure_id: SecureId,
    },
    /// Relayed ciphertext with a decrypt button
    Ciphertext {
        /// Recipient
        to: UserId,
        /// Author display name
        sender_name: String,
        /// Leading hex digits of the ciphertext
        preview: String,
        /// Decrypt button
        decrypt: Interaction,
    },
    /// Decrypted message, shown only to the presser
    Reveal {
        /// Presser
        to: UserId,
        /// Author display name
        sender_name: String,
        /// Decrypted text
        plaintext: String,
    },
    /// Confirmation button for ending a session
    AbortPrompt {
        /// Recipient
        to: UserId,
        /// Abort button, tagged with the recipient's role
        abort: Interaction,
    },
    /// Contact picker
    Contacts {
        /// Inviter
        to: UserId,
        /// Known partners
        contacts: Vec<Contact>,
        /// Button for inviting someone new
        manual: Interaction,
    },
}

impl RelayAction {
    /// Recipient of this action.
    pub fn recipient(&self) -> UserId {
        match self {
            Self::Notify { to, .. }
            | Self::Prompt { to, .. }
            | Self::InvitationPrompt { to, .. }
            | Self::InviteLink { to, .. }
            | Self::Ciphertext { to, .. }
            | Self::Reveal { to, .. }
            | Self::AbortPrompt { to, .. }
            | Self::Contacts { to, .. } => *to,
        }
    }
}

/// User-facing texts.
///
/// Internal error details never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Greeting after `/start`
    Welcome,
    /// `/start` while a session is active
    AlreadyInSession,
    /// Action needs an identity
    StartFirst,
    /// Link unknown or expired
    InvitationInvalid,
    /// Invitation already accepted
    InvitationUsed,
    /// Own invitation opened
    SelfInvite,
    /// Invitation delivered to a resolved user
    InvitationSent {
        /// Invitee
        invitee_name: String,
    },
    /// Invitee accepted; inviter should press start
    Accepted {
        /// Invitee
        invitee_name: String,
    },
    /// Invitee waits for the inviter to start
    AwaitingStart {
        /// Inviter
        inviter_name: String,
    },
    /// Invitation declined
    Declined {
        /// Inviter
        inviter_name: String,
        /// Invitee
        invitee_name: String,
    },
    /// Invitation withdrawn
    InvitationWithdrawn,
    /// Both sides may talk
    SessionEstablished,
    /// Ciphertext relayed
    Delivered {
        /// Sender
        sender_name: String,
        /// Recipient
        recipient_name: String,
    },
    /// Cached ciphertext gone or undecryptable
    MessageExpired,
    /// No session for this action
    NoActiveSession,
    /// Session ended for both
    SessionEnded {
        /// Inviter
        inviter_name: String,
        /// Invitee
        invitee_name: String,
    },
    /// Contact list had no such partner
    UnknownPartner,
    /// The other party is already in a session
    PartnerBusy,
    /// Contact list cleared
    ContactsReset {
        /// Number of partners dropped
        dropped: usize,
    },
    /// Session state is inconsistent
    SessionBroken,
    /// Anything else
    InternalError,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome => f.write_str("Welcome to SealTalk!"),
            Self::AlreadyInSession => f.write_str("You are already in an active session."),
            Self::StartFirst => f.write_str("Send /start first."),
            Self::InvitationInvalid => f.write_str("This invitation is invalid or has expired."),
            Self::InvitationUsed => f.write_str("This invitation has already been used."),
            Self::SelfInvite => f.write_str("You cannot use your own invitation."),
            Self::InvitationSent { invitee_name } => {
                write!(f, "Invitation sent to @{invitee_name}.")
            },
            Self::Accepted { invitee_name } => {
                write!(f, "@{invitee_name} accepted your invitation! Press start to begin.")
            },
            Self::AwaitingStart { inviter_name } => {
                write!(f, "You accepted the invitation from @{inviter_name}. Waiting for the session to start.")
            },
            Self::Declined { inviter_name, invitee_name } => {
                write!(f, "SealTalk @{inviter_name}: invitation declined by @{invitee_name}.")
            },
            Self::InvitationWithdrawn => f.write_str("Invitation withdrawn."),
            Self::SessionEstablished => {
                f.write_str("Secure connection established. You can start talking.")
            },
            Self::Delivered { sender_name, recipient_name } => {
                write!(f, "@{sender_name}: sealed message to @{recipient_name} delivered.")
            },
            Self::MessageExpired => f.write_str("Message expired or corrupted."),
            Self::NoActiveSession => f.write_str("No active session."),
            Self::SessionEnded { inviter_name, invitee_name } => {
                write!(f, "SealTalk @{inviter_name} x @{invitee_name} ended.")
            },
            Self::UnknownPartner => f.write_str("No active chat with this contact."),
            Self::PartnerBusy => f.write_str("The other party is already in an active session."),
            Self::ContactsReset { dropped } => write!(f, "All chats deleted ({dropped})."),
            Self::SessionBroken => f.write_str("Session is broken. Use /abort and start over."),
            Self::InternalError => f.write_str("Something went wrong. Please try again."),
        }
    }
}
