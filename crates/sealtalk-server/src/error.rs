//! Server error types.

use sealtalk_core::{CoreError, UserId};
use thiserror::Error;

/// Errors raised while handling an event or starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Protocol failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The user has no active session
    #[error("no active session")]
    NoActiveSession,

    /// The inviter has no live conversation with this user
    #[error("no known conversation with user {invitee}")]
    UnknownPartner {
        /// Requested partner
        invitee: UserId,
    },

    /// The acting user already holds a session
    #[error("user {user_id} is already in a session")]
    AlreadyInSession {
        /// Busy user
        user_id: UserId,
    },

    /// The other party already holds a session
    #[error("partner {user_id} is already in a session")]
    PartnerBusy {
        /// Busy partner
        user_id: UserId,
    },

    /// The pressed button refers to another session or role
    #[error("button does not match the active session")]
    SessionMismatch,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure in the driver
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Log this error with the acting user attached.
    pub fn log(&self, user_id: UserId, context: &str) {
        match self {
            Self::Core(e) => e.log(user_id, context),
            Self::Config(_) | Self::Io(_) => tracing::error!(user_id, error = %self, "{context}"),
            _ => tracing::info!(user_id, error = %self, "{context}"),
        }
    }
}
