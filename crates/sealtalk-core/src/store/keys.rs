//! Store key names.

use crate::{UserId, token::SecureId};

/// Value of the setup flag while the invitee has not accepted yet
pub const STATUS_IN_PROGRESS: &[u8] = b"in_progress";

/// Value of the setup flag once the handshake completed
pub const STATUS_SET_UP: &[u8] = b"set_up";

/// Invitation record
pub fn inviter_data(id: &SecureId) -> String {
    format!("{id}:inviter_data")
}

/// Invitation setup flag
pub fn conversation_setup(id: &SecureId) -> String {
    format!("{id}:conversation_setup")
}

/// Symmetric session key
pub fn aes_key(id: &SecureId) -> String {
    format!("aes_key:{id}")
}

/// RSA-wrapped session key awaiting the inviter
pub fn encrypted_key(id: &SecureId) -> String {
    format!("{id}:encrypted_key")
}

/// Cached payload
pub fn cache(key: &str) -> String {
    format!("cache:{key}")
}

/// User identity
pub fn user_keys(user: UserId) -> String {
    format!("user:{user}:keys")
}

/// Set of `"{secure_id}:{invitee_id}"` for an inviter
pub fn inviter_conversations(user: UserId) -> String {
    format!("inviter_conversations:{user}")
}

/// Partner record
pub fn conversation_invitee(id: &SecureId) -> String {
    format!("conversation_invitee:{id}")
}

/// Per-user notification channel
pub fn notifications(user: UserId) -> String {
    format!("conversation:notifications:{user}")
}

/// Active session slot
pub fn session(user: UserId) -> String {
    format!("session:{user}")
}
