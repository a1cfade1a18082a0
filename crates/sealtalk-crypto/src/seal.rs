//! Sealing of identity private keys at rest.
//!
//! Layout of a sealed key:
//!
//! ```text
//! iterations (u32 BE) || salt (16) || tag (32) || iv (16) || AES-256-CFB(PKCS#8 PEM)
//! ```
//!
//! PBKDF2-HMAC-SHA256 over the passphrase and salt yields 64 bytes. The first
//! 32 are stored as a verification tag, the last 32 encrypt the PEM with the
//! relay cipher. Opening re-derives both halves and compares the tag in
//! constant time before touching the ciphertext.

use hmac::{Hmac, Mac, digest::KeyInit};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    error::CryptoError,
    identity::PrivateKey,
    key::{KEY_SIZE, SymmetricKey},
    relay::{self, IV_SIZE},
};

/// Salt size in bytes
pub const SALT_SIZE: usize = 16;

/// Lowest accepted PBKDF2 iteration count
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

const TAG_SIZE: usize = 32;
const HEADER_SIZE: usize = 4 + SALT_SIZE + TAG_SIZE;

/// Derive the per-user passphrase from the server secret.
///
/// `hex(HMAC-SHA256(secret, user_id))`. Without the secret the passphrase of
/// one user says nothing about another's.
pub fn derive_passphrase(secret: &[u8], user_id: u64) -> Result<Zeroizing<String>, CryptoError> {
    let mut mac = <Hmac<Sha256> as KeyInit>::new_from_slice(secret)
        .map_err(|_| CryptoError::InvalidKeyLength { expected: 64, actual: secret.len() })?;
    mac.update(&user_id.to_be_bytes());
    Ok(Zeroizing::new(hex::encode(mac.finalize().into_bytes())))
}

fn derive(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
) -> (Zeroizing<[u8; TAG_SIZE]>, SymmetricKey) {
    let mut okm = Zeroizing::new([0u8; TAG_SIZE + KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut okm[..]);

    let mut tag = Zeroizing::new([0u8; TAG_SIZE]);
    tag.copy_from_slice(&okm[..TAG_SIZE]);
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&okm[TAG_SIZE..]);

    (tag, SymmetricKey::from_bytes(key))
}

/// Seal a private key under `passphrase`.
///
/// # Errors
///
/// `MalformedSealedKey` if `iterations` is below [`MIN_PBKDF2_ITERATIONS`];
/// `Pem` if the key cannot be encoded.
pub fn seal_private_key(
    key: &PrivateKey,
    passphrase: &[u8],
    salt: [u8; SALT_SIZE],
    iv: [u8; IV_SIZE],
    iterations: u32,
) -> Result<Vec<u8>, CryptoError> {
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(CryptoError::MalformedSealedKey);
    }

    let pem = key.to_pem()?;
    let (tag, enc_key) = derive(passphrase, &salt, iterations);
    let ciphertext = relay::encrypt_message(&enc_key, &pem, iv);

    let mut sealed = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    sealed.extend_from_slice(&iterations.to_be_bytes());
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&tag[..]);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a key sealed by [`seal_private_key`].
///
/// # Errors
///
/// - `MalformedSealedKey` for truncated input or a too-low iteration count
/// - `WrongPassphrase` if the derived tag does not match
/// - `Pem` if the decrypted document is not a PKCS#8 RSA key
pub fn open_private_key(sealed: &[u8], passphrase: &[u8]) -> Result<PrivateKey, CryptoError> {
    if sealed.len() < HEADER_SIZE + IV_SIZE {
        return Err(CryptoError::MalformedSealedKey);
    }

    let (iterations, rest) = sealed.split_at(4);
    let iterations =
        u32::from_be_bytes([iterations[0], iterations[1], iterations[2], iterations[3]]);
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(CryptoError::MalformedSealedKey);
    }

    let (salt, rest) = rest.split_at(SALT_SIZE);
    let (stored_tag, ciphertext) = rest.split_at(TAG_SIZE);

    let (tag, enc_key) = derive(passphrase, salt, iterations);
    if !bool::from(tag[..].ct_eq(stored_tag)) {
        return Err(CryptoError::WrongPassphrase);
    }

    let pem = Zeroizing::new(
        relay::decrypt_message(&enc_key, ciphertext).map_err(|_| CryptoError::MalformedSealedKey)?,
    );
    PrivateKey::from_pem(&pem)
}
