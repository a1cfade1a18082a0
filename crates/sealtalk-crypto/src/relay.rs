//! Per-message relay encryption.
//!
//! Wire format: `iv (16 bytes) || AES-256-CFB(PKCS#7(plaintext))`.
//!
//! The IV is supplied by the caller and must be fresh random bytes for every
//! call. Reusing an IV with the same key reveals the XOR of the two
//! plaintexts' first blocks.

use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit, generic_array::GenericArray};

use crate::{error::CryptoError, key::SymmetricKey, padding};

/// IV size in bytes
pub const IV_SIZE: usize = 16;

/// AES block size in bytes (padding granularity)
pub const BLOCK_SIZE: usize = 16;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Encrypt a UTF-8 message under the conversation key.
///
/// Output length is `IV_SIZE + (len / 16 + 1) * 16`.
pub fn encrypt_message(key: &SymmetricKey, plaintext: &str, iv: [u8; IV_SIZE]) -> Vec<u8> {
    let mut buf = plaintext.as_bytes().to_vec();
    padding::pad(&mut buf);

    Aes256CfbEnc::new(GenericArray::from_slice(key.as_bytes()), GenericArray::from_slice(&iv))
        .encrypt(&mut buf);

    let mut out = Vec::with_capacity(IV_SIZE + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    out
}

/// Decrypt an IV-prefixed ciphertext produced by [`encrypt_message`].
///
/// # Errors
///
/// - `CiphertextTooShort` if the input cannot hold an IV
/// - `InvalidPadding` if the decrypted body is not valid PKCS#7
/// - `InvalidUtf8` if the unpadded body is not UTF-8
pub fn decrypt_message(key: &SymmetricKey, data: &[u8]) -> Result<String, CryptoError> {
    if data.len() < IV_SIZE {
        return Err(CryptoError::CiphertextTooShort { len: data.len() });
    }

    let (iv, ciphertext) = data.split_at(IV_SIZE);
    let mut buf = ciphertext.to_vec();

    Aes256CfbDec::new(GenericArray::from_slice(key.as_bytes()), GenericArray::from_slice(iv))
        .decrypt(&mut buf);

    let len = padding::unpad(&buf)?;
    buf.truncate(len);

    String::from_utf8(buf).map_err(|_| CryptoError::InvalidUtf8)
}
