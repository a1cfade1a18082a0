//! Error types for the protocol core.

use sealtalk_crypto::CryptoError;
use thiserror::Error;
use tracing::{Level, error, info, warn};

/// Errors raised by a [`Store`](crate::Store) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A set operation was applied to a plain value or vice versa
    #[error("operation against a key holding the wrong kind of value: {key}")]
    WrongType {
        /// Offending key
        key: String,
    },

    /// A persisted entry could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// The backing storage failed
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors raised by protocol operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The user has no identity; `/start` has not been run
    #[error("no identity for user {user_id}")]
    IdentityMissing {
        /// User without an identity
        user_id: u64,
    },

    /// Invitation or cached payload is unknown, malformed or expired
    #[error("invalid or expired")]
    InvalidOrExpired,

    /// Invitation is not in the state the handshake requires
    #[error("invitation is not awaiting a handshake")]
    InvalidHandshakeState,

    /// The handshake already completed or the invitation vanished
    #[error("handshake already completed or invalid")]
    AlreadyCompletedOrInvalid,

    /// The sealed private key could not be opened
    #[error("wrong passphrase for sealed private key")]
    WrongPassphrase,

    /// RSA unwrapping failed
    #[error("failed to decrypt wrapped session key")]
    DecryptionFailure,

    /// A user tried to accept their own invitation
    #[error("cannot accept own invitation")]
    SelfInviteRejected,

    /// The wrapped key blob was not found when the listener looked for it
    #[error("encrypted session key missing for {secure_id}")]
    EncryptedKeyMissing {
        /// Session whose blob is missing
        secure_id: String,
    },

    /// The session has no symmetric key
    #[error("session key missing for {secure_id}")]
    SessionKeyMissing {
        /// Session without a key
        secure_id: String,
    },

    /// Unwrapped key disagrees with the key stored by the invitee
    #[error("unwrapped key does not match stored key for {secure_id}")]
    KeyMismatch {
        /// Session with conflicting keys
        secure_id: String,
    },

    /// Only one participant's session slot is populated
    #[error("session slots are not symmetric")]
    AsymmetricSession,

    /// Primitive failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A record could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// A blocking task panicked or was cancelled
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl CoreError {
    /// Whether retrying the same request can never succeed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Store(StoreError::Backend(_)) | Self::TaskFailed(_))
    }

    /// Log level for this error.
    ///
    /// Integrity failures are errors; user mistakes and expiry are routine.
    pub fn severity(&self) -> Level {
        match self {
            Self::WrongPassphrase
            | Self::KeyMismatch { .. }
            | Self::AsymmetricSession
            | Self::Codec(_)
            | Self::TaskFailed(_)
            | Self::Store(_) => Level::ERROR,
            Self::DecryptionFailure | Self::EncryptedKeyMissing { .. } | Self::Crypto(_) => {
                Level::WARN
            },
            Self::IdentityMissing { .. }
            | Self::InvalidOrExpired
            | Self::InvalidHandshakeState
            | Self::AlreadyCompletedOrInvalid
            | Self::SelfInviteRejected
            | Self::SessionKeyMissing { .. } => Level::INFO,
        }
    }

    /// Log this error at its [`severity`](Self::severity).
    pub fn log(&self, user_id: u64, context: &str) {
        let level = self.severity();
        if level == Level::ERROR {
            error!(user_id, error = %self, "{context}");
        } else if level == Level::WARN {
            warn!(user_id, error = %self, "{context}");
        } else {
            info!(user_id, error = %self, "{context}");
        }
    }
}

pub(crate) fn encode_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| CoreError::Codec(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    ciborium::de::from_reader(bytes).map_err(|e| CoreError::Codec(e.to_string()))
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> CoreError {
    CoreError::TaskFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_failures_log_at_error() {
        assert_eq!(CoreError::WrongPassphrase.severity(), Level::ERROR);
        assert_eq!(
            CoreError::KeyMismatch { secure_id: "x".into() }.severity(),
            Level::ERROR
        );
        assert_eq!(CoreError::InvalidOrExpired.severity(), Level::INFO);
    }

    #[test]
    fn backend_errors_are_transient() {
        assert!(!CoreError::Store(StoreError::Backend("io".into())).is_terminal());
        assert!(CoreError::InvalidOrExpired.is_terminal());
        assert!(CoreError::Store(StoreError::WrongType { key: "k".into() }).is_terminal());
    }
}
