//! PKCS#7 padding to the AES block size.

use crate::{error::CryptoError, relay::BLOCK_SIZE};

/// Pad `data` in place to a multiple of [`BLOCK_SIZE`].
///
/// Always appends between 1 and `BLOCK_SIZE` bytes, so already aligned input
/// gains a full block.
pub fn pad(data: &mut Vec<u8>) {
    let pad_len = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    data.resize(data.len() + pad_len, pad_len as u8);
}

/// Validate the padding of `data` and return the unpadded length.
///
/// # Errors
///
/// `InvalidPadding` if `data` is empty, not block aligned, or the trailing
/// bytes are not a valid PKCS#7 run.
pub fn unpad(data: &[u8]) -> Result<usize, CryptoError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidPadding);
    }

    let pad_len = data[data.len() - 1] as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE {
        return Err(CryptoError::InvalidPadding);
    }

    let body_len = data.len() - pad_len;
    if data[body_len..].iter().any(|&b| b as usize != pad_len) {
        return Err(CryptoError::InvalidPadding);
    }

    Ok(body_len)
}
