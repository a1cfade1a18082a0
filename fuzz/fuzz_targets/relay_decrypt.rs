#![no_main]

use libfuzzer_sys::fuzz_target;
use sealtalk_crypto::{IV_SIZE, KEY_SIZE, SymmetricKey, decrypt_message, encrypt_message};

fuzz_target!(|data: &[u8]| {
    if data.len() < KEY_SIZE {
        return;
    }
    let (key_bytes, ciphertext) = data.split_at(KEY_SIZE);
    let Ok(key) = SymmetricKey::from_slice(key_bytes) else {
        return;
    };

    // Arbitrary input must never panic; anything that decrypts re-encrypts
    // to the same plaintext.
    if let Ok(plaintext) = decrypt_message(&key, ciphertext) {
        let iv = ciphertext[..IV_SIZE].try_into().unwrap_or([0u8; IV_SIZE]);
        let again = encrypt_message(&key, &plaintext, iv);
        assert_eq!(decrypt_message(&key, &again).as_deref(), Ok(plaintext.as_str()));
    }
});
