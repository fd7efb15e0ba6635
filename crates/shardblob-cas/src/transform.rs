//! Reversible transform pipeline: compress then encrypt.
//!
//! Sealed layout on disk:
//!
//! ```text
//! unencrypted: gzip(plaintext)
//! encrypted:   nonce (12 bytes) || aes-256-gcm(gzip(plaintext)) || tag (16 bytes)
//! ```
//!
//! Encryption draws a fresh random nonce per call, so sealing the same plaintext
//! twice gives different bytes. Ids are therefore never derived from sealed output.

use std::io::{Read, Write};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::key::StoreKey;
use crate::{CasError, Result};

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Default gzip level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Gzip-compress `data`. Empty input produces a valid (non-empty) empty stream.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`compress`]. Malformed streams fail with `CorruptData`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(CasError::CorruptData("empty gzip stream".to_string()));
    }
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CasError::CorruptData(format!("gzip decode failed: {}", e)))?;
    Ok(out)
}

/// Encrypt with AES-256-GCM under a fresh random nonce, prepended to the output.
pub fn encrypt(data: &[u8], key: &StoreKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce_bytes)
        .map_err(|e| CasError::KeyDerivation(format!("Failed to generate nonce: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|_| CasError::CorruptData("payload too large to encrypt".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`encrypt`].
///
/// A wrong key, tampered bytes, or input shorter than a nonce all fail with
/// `AuthenticationFailure`; nothing is ever passed through undecrypted.
pub fn decrypt(data: &[u8], key: &StoreKey) -> Result<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(CasError::AuthenticationFailure);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CasError::AuthenticationFailure)
}

/// Write direction: compress, then encrypt when a key is configured.
pub fn seal(plaintext: &[u8], key: Option<&StoreKey>, level: u32) -> Result<Vec<u8>> {
    let compressed = compress(plaintext, level)?;
    match key {
        Some(key) => encrypt(&compressed, key),
        None => Ok(compressed),
    }
}

/// Read direction: decrypt when a key is configured, then decompress.
pub fn open(sealed: &[u8], key: Option<&StoreKey>) -> Result<Vec<u8>> {
    match key {
        Some(key) => decompress(&decrypt(sealed, key)?),
        None => decompress(sealed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_LENGTH;

    fn key(byte: u8) -> StoreKey {
        StoreKey::from_bytes([byte; KEY_LENGTH])
    }

    #[test]
    fn test_seal_open_round_trip_plain() {
        let data = b"Hello, shardblob! Hello, shardblob! Hello, shardblob!";
        let sealed = seal(data, None, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_ne!(sealed.as_slice(), data.as_slice());
        assert_eq!(open(&sealed, None).unwrap(), data);
    }

    #[test]
    fn test_seal_open_round_trip_encrypted() {
        let k = key(0x42);
        let data = b"supersecretblob";
        let sealed = seal(data, Some(&k), DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(open(&sealed, Some(&k)).unwrap(), data);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let compressed = compress(b"", DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(!compressed.is_empty());

        let k = key(1);
        for key in [None, Some(&k)] {
            let sealed = seal(b"", key, DEFAULT_COMPRESSION_LEVEL).unwrap();
            assert!(open(&sealed, key).unwrap().is_empty());
        }
    }

    #[test]
    fn test_large_payload_round_trip() {
        let k = key(9);
        let data = vec![0x5Au8; 1024 * 1024];
        let sealed = seal(&data, Some(&k), 1).unwrap();
        assert!(sealed.len() < data.len());
        assert_eq!(open(&sealed, Some(&k)).unwrap(), data);
    }

    #[test]
    fn test_encryption_not_deterministic() {
        let k = key(3);
        let a = seal(b"same plaintext", Some(&k), 6).unwrap();
        let b = seal(b"same plaintext", Some(&k), 6).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_wrong_key_is_auth_failure() {
        let sealed = seal(b"secret data", Some(&key(1)), 6).unwrap();
        let result = open(&sealed, Some(&key(2)));
        assert!(matches!(result, Err(CasError::AuthenticationFailure)));
    }

    #[test]
    fn test_tampered_ciphertext_is_auth_failure() {
        let k = key(5);
        let mut sealed = seal(b"secret data", Some(&k), 6).unwrap();
        let mid = sealed.len() / 2;
        sealed[mid] ^= 0xFF;
        assert!(matches!(
            open(&sealed, Some(&k)),
            Err(CasError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_short_ciphertext_is_rejected() {
        let k = key(5);
        assert!(matches!(
            decrypt(&[0u8; NONCE_SIZE - 1], &k),
            Err(CasError::AuthenticationFailure)
        ));
        assert!(matches!(
            decrypt(&[0u8; NONCE_SIZE + TAG_SIZE - 1], &k),
            Err(CasError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_ciphertext_layout() {
        let k = key(7);
        let compressed = compress(b"layout", 6).unwrap();
        let sealed = encrypt(&compressed, &k).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + compressed.len() + TAG_SIZE);
    }

    #[test]
    fn test_malformed_gzip_is_corrupt_data() {
        assert!(matches!(
            decompress(b"definitely not gzip"),
            Err(CasError::CorruptData(_))
        ));
        assert!(matches!(decompress(b""), Err(CasError::CorruptData(_))));
    }

    #[test]
    fn test_plain_store_reading_encrypted_bytes_is_corrupt() {
        let sealed = seal(b"secret", Some(&key(8)), 6).unwrap();
        assert!(matches!(open(&sealed, None), Err(CasError::CorruptData(_))));
    }
}
