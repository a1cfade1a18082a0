//! Random 128-bit tokens rendered as lowercase hex.
//!
//! Two token kinds exist: [`SecureId`] names an invitation and the session it
//! becomes, [`CacheKey`] names a cached ciphertext. Both are unguessable and
//! short enough to fit in a 64-byte callback payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::env::Environment;

/// Token length in bytes
pub const TOKEN_BYTES: usize = 16;

/// Token length when rendered as hex
pub const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

fn parse_token(s: &str) -> Option<String> {
    let well_formed = s.len() == TOKEN_HEX_LEN
        && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    well_formed.then(|| s.to_owned())
}

macro_rules! token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Draw a fresh token from the environment RNG.
            pub fn generate<E: Environment>(env: &E) -> Self {
                let bytes: [u8; TOKEN_BYTES] = env.random_array();
                Self(hex::encode(bytes))
            }

            /// Parse a token, accepting only 32 lowercase hex characters.
            pub fn parse(s: &str) -> Option<Self> {
                parse_token(s).map(Self)
            }

            /// Hex representation.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

token! {
    /// Invitation and session identifier.
    SecureId
}

token! {
    /// Short reference to a cached payload.
    CacheKey
}
