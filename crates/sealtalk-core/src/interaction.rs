//! Typed button payloads.
//!
//! Inline buttons carry a short string that comes back verbatim when the
//! button is pressed. Payloads are decoded once, at the boundary, into
//! [`Interaction`]; handlers never see raw strings.
//!
//! Wire forms:
//!
//! ```text
//! invite:{accept|decline}:{secure_id}
//! sec:{ir|ie}:{decrypt|abort}:{cache_key|secure_id}
//! conv:{ir|ie}:{prepare|reset|input}
//! conv:{ir|ie}:{invite|start}:{user_id}
//! conv:{ir|ie}:cancel:{secure_id}
//! ```

use std::fmt;

use thiserror::Error;

use crate::{
    UserId,
    token::{CacheKey, SecureId},
};

/// Upper bound on an encoded payload, imposed by chat platforms
pub const MAX_PAYLOAD_LEN: usize = 64;

/// A participant's role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Created the invitation
    Inviter,
    /// Accepted the invitation
    Invitee,
}

impl Role {
    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inviter => "ir",
            Self::Invitee => "ie",
        }
    }

    /// The other role.
    pub fn opposite(self) -> Self {
        match self {
            Self::Inviter => Self::Invitee,
            Self::Invitee => Self::Inviter,
        }
    }

    fn parse(s: &str) -> Result<Self, InteractionError> {
        match s {
            "ir" => Ok(Self::Inviter),
            "ie" => Ok(Self::Invitee),
            other => Err(InteractionError::UnknownRole(other.to_owned())),
        }
    }
}

/// Invitee's answer to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteAction {
    /// Join
    Accept,
    /// Refuse
    Decline,
}

/// Actions inside an established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecureAction {
    /// Reveal a relayed message
    Decrypt(CacheKey),
    /// End the session
    Abort(SecureId),
}

/// Menu and setup actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    /// Open the contact picker
    Prepare,
    /// Start a session with a known partner
    Invite(UserId),
    /// Withdraw a declined invitation
    Cancel(SecureId),
    /// Forget all partners
    Reset,
    /// Ask for a partner by handle
    Input,
    /// Open an accepted session
    Start(UserId),
}

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// `invite:*`
    Invitation {
        /// Answer
        action: InviteAction,
        /// Invitation answered
        secure_id: SecureId,
    },
    /// `sec:*`
    Secure {
        /// Role of the presser
        role: Role,
        /// What to do
        action: SecureAction,
    },
    /// `conv:*`
    Conversation {
        /// Role of the presser
        role: Role,
        /// What to do
        action: ConversationAction,
    },
}

/// Why a payload was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InteractionError {
    /// Payload exceeds [`MAX_PAYLOAD_LEN`]
    #[error("payload longer than {MAX_PAYLOAD_LEN} bytes")]
    TooLong,
    /// First segment is not a known family
    #[error("unknown payload prefix: {0}")]
    UnknownPrefix(String),
    /// Role segment is not `ir` or `ie`
    #[error("unknown role: {0}")]
    UnknownRole(String),
    /// Action segment is not valid for the family
    #[error("unknown action: {0}")]
    UnknownAction(String),
    /// Action requires a value
    #[error("missing value")]
    MissingValue,
    /// Action takes no value or too many segments
    #[error("unexpected trailing value")]
    UnexpectedValue,
    /// Value is malformed
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

fn secure_id(value: Option<&str>) -> Result<SecureId, InteractionError> {
    let value = value.ok_or(InteractionError::MissingValue)?;
    SecureId::parse(value).ok_or_else(|| InteractionError::InvalidValue(value.to_owned()))
}

fn cache_key(value: Option<&str>) -> Result<CacheKey, InteractionError> {
    let value = value.ok_or(InteractionError::MissingValue)?;
    CacheKey::parse(value).ok_or_else(|| InteractionError::InvalidValue(value.to_owned()))
}

fn user_id(value: Option<&str>) -> Result<UserId, InteractionError> {
    let value = value.ok_or(InteractionError::MissingValue)?;
    value.parse().map_err(|_| InteractionError::InvalidValue(value.to_owned()))
}

fn no_value<T>(value: Option<&str>, action: T) -> Result<T, InteractionError> {
    match value {
        None => Ok(action),
        Some(_) => Err(InteractionError::UnexpectedValue),
    }
}

impl Interaction {
    /// Decode a payload.
    pub fn parse(payload: &str) -> Result<Self, InteractionError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(InteractionError::TooLong);
        }

        let mut parts = payload.split(':');
        let prefix = parts.next().unwrap_or_default();

        let interaction = match prefix {
            "invite" => {
                let action = match parts.next().unwrap_or_default() {
                    "accept" => InviteAction::Accept,
                    "decline" => InviteAction::Decline,
                    other => return Err(InteractionError::UnknownAction(other.to_owned())),
                };
                Self::Invitation { action, secure_id: secure_id(parts.next())? }
            },
            "sec" => {
                let role = Role::parse(parts.next().unwrap_or_default())?;
                let action = match parts.next().unwrap_or_default() {
                    "decrypt" => SecureAction::Decrypt(cache_key(parts.next())?),
                    "abort" => SecureAction::Abort(secure_id(parts.next())?),
                    other => return Err(InteractionError::UnknownAction(other.to_owned())),
                };
                Self::Secure { role, action }
            },
            "conv" => {
                let role = Role::parse(parts.next().unwrap_or_default())?;
                let verb = parts.next().unwrap_or_default();
                let value = parts.next();
                let action = match verb {
                    "prepare" => no_value(value, ConversationAction::Prepare)?,
                    "reset" => no_value(value, ConversationAction::Reset)?,
                    "input" => no_value(value, ConversationAction::Input)?,
                    "invite" => ConversationAction::Invite(user_id(value)?),
                    "start" => ConversationAction::Start(user_id(value)?),
                    "cancel" => ConversationAction::Cancel(secure_id(value)?),
                    other => return Err(InteractionError::UnknownAction(other.to_owned())),
                };
                Self::Conversation { role, action }
            },
            other => return Err(InteractionError::UnknownPrefix(other.to_owned())),
        };

        if parts.next().is_some() {
            return Err(InteractionError::UnexpectedValue);
        }
        Ok(interaction)
    }

    /// Encode to the wire form accepted by [`Interaction::parse`].
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invitation { action, secure_id } => {
                let action = match action {
                    InviteAction::Accept => "accept",
                    InviteAction::Decline => "decline",
                };
                write!(f, "invite:{action}:{secure_id}")
            },
            Self::Secure { role, action } => {
                let role = role.as_str();
                match action {
                    SecureAction::Decrypt(key) => write!(f, "sec:{role}:decrypt:{key}"),
                    SecureAction::Abort(id) => write!(f, "sec:{role}:abort:{id}"),
                }
            },
            Self::Conversation { role, action } => {
                let role = role.as_str();
                match action {
                    ConversationAction::Prepare => write!(f, "conv:{role}:prepare"),
                    ConversationAction::Reset => write!(f, "conv:{role}:reset"),
                    ConversationAction::Input => write!(f, "conv:{role}:input"),
                    ConversationAction::Invite(user) => write!(f, "conv:{role}:invite:{user}"),
                    ConversationAction::Start(user) => write!(f, "conv:{role}:start:{user}"),
                    ConversationAction::Cancel(id) => write!(f, "conv:{role}:cancel:{id}"),
                }
            },
        }
    }
}
