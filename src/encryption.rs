// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! At-rest encryption for secret values and challenge keys.
//!
//! A single AES-256-GCM key protects everything the service persists. The
//! key lives in a file under the data root; the first process to start
//! generates and publishes it atomically, every later start (and every
//! process that lost the race) reads it back.
//! Failing to obtain the key is fatal at bootstrap.
//!
//! Ciphertexts are stored as `base64(nonce || ciphertext || tag)` with a
//! fresh random 96-bit nonce per encryption.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64ct::{Base64, Encoding};
use rand::RngCore;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("failed to access key file {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("key file {} holds {actual} bytes, expected 32", path.display())]
    InvalidKeySize { path: PathBuf, actual: usize },

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: {0}")]
    Decrypt(&'static str),
}

/// Process-wide symmetric cipher.
pub struct EncryptionService {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

impl EncryptionService {
    /// Load the key at `path`, generating and persisting it if absent.
    pub fn load_or_create(path: &Path) -> Result<Self, EncryptionError> {
        let key_file_error = |source| EncryptionError::KeyFile {
            path: path.to_path_buf(),
            source,
        };

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(key_file_error)?;
            }
            match create_key_file(path) {
                Ok(key) => {
                    tracing::info!(path = %path.display(), "Generated new at-rest encryption key");
                    return Ok(Self { key });
                }
                // Another process won the race; use its key.
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(key_file_error(e)),
            }
        }

        let bytes = Zeroizing::new(fs::read(path).map_err(key_file_error)?);
        if bytes.len() != KEY_SIZE {
            return Err(EncryptionError::InvalidKeySize {
                path: path.to_path_buf(),
                actual: bytes.len(),
            });
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&bytes);
        tracing::info!(path = %path.display(), "Loaded at-rest encryption key");
        Ok(Self { key })
    }

    /// Build a service from raw key bytes.
    pub fn from_key(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Encrypt a UTF-8 value.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| EncryptionError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(Base64::encode_string(&sealed))
    }

    /// Decrypt a value produced by [`EncryptionService::encrypt`].
    ///
    /// Fails on malformed encoding, truncated input or authentication failure;
    /// never returns corrupted plaintext.
    pub fn decrypt(&self, sealed: &str) -> Result<String, EncryptionError> {
        let bytes = Base64::decode_vec(sealed)
            .map_err(|_| EncryptionError::Decrypt("invalid encoding"))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(EncryptionError::Decrypt("ciphertext too short"));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()));
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| EncryptionError::Decrypt("authentication failed"))?,
        );

        String::from_utf8(plaintext.to_vec()).map_err(|_| EncryptionError::Decrypt("invalid UTF-8"))
    }
}

/// Generate a key and publish it at `path` unless a key already exists there.
///
/// The key is written to a private temp file first and then hard-linked into
/// place, so `path` never holds a partial key. Fails with `AlreadyExists` when
/// another process published first.
fn create_key_file(path: &Path) -> std::io::Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(key.as_mut());

    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    let published = write_new(&temp_path, key.as_slice())
        .and_then(|()| fs::hard_link(&temp_path, path));
    // The temp file is only a staging name; the published link keeps the data.
    let _ = fs::remove_file(&temp_path);
    published.map(|()| key)
}

fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn test_service() -> EncryptionService {
        EncryptionService::from_key([7u8; KEY_SIZE])
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let service = test_service();
        let sealed = service.encrypt("dataset-key-0x01").unwrap();
        assert_ne!(sealed, "dataset-key-0x01");
        assert_eq!(service.decrypt(&sealed).unwrap(), "dataset-key-0x01");
    }

    #[test]
    fn nonces_are_fresh_per_encryption() {
        let service = test_service();
        let a = service.encrypt("same").unwrap();
        let b = service.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let service = test_service();
        let sealed = service.encrypt("secret").unwrap();
        let mut bytes = Base64::decode_vec(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = Base64::encode_string(&bytes);

        assert!(matches!(
            service.decrypt(&tampered),
            Err(EncryptionError::Decrypt(_))
        ));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let sealed = test_service().encrypt("secret").unwrap();
        let other = EncryptionService::from_key([9u8; KEY_SIZE]);
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn malformed_input_is_rejected() {
        let service = test_service();
        assert!(service.decrypt("not base64 !!").is_err());
        assert!(service.decrypt(&Base64::encode_string(&[0u8; 4])).is_err());
    }

    #[test]
    fn key_file_is_created_then_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys/aes.key");

        let first = EncryptionService::load_or_create(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), KEY_SIZE);
        let sealed = first.encrypt("persisted").unwrap();

        let second = EncryptionService::load_or_create(&path).unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap(), "persisted");
    }

    #[test]
    fn truncated_key_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aes.key");
        fs::write(&path, [1u8; 10]).unwrap();

        assert!(matches!(
            EncryptionService::load_or_create(&path),
            Err(EncryptionError::InvalidKeySize { actual: 10, .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("aes.key");
        EncryptionService::load_or_create(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn largest_secret_round_trips() {
        let service = test_service();
        // 4096 bytes as single-byte and as two-byte characters.
        for value in ["a".repeat(4096), "é".repeat(2048)] {
            assert_eq!(value.len(), 4096);
            let sealed = service.encrypt(&value).unwrap();
            assert_eq!(service.decrypt(&sealed).unwrap(), value);
        }
    }

    #[test]
    fn race_loser_reads_the_published_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aes.key");
        let winner = EncryptionService::load_or_create(&path).unwrap();

        let error = create_key_file(&path).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AlreadyExists);

        let loser = EncryptionService::load_or_create(&path).unwrap();
        let sealed = winner.encrypt("shared").unwrap();
        assert_eq!(loser.decrypt(&sealed).unwrap(), "shared");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn concurrent_first_start_agrees_on_one_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys/aes.key");
        let barrier = std::sync::Barrier::new(8);

        let services: Vec<EncryptionService> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        EncryptionService::load_or_create(&path).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let sealed = services[0].encrypt("shared").unwrap();
        for service in &services {
            assert_eq!(service.decrypt(&sealed).unwrap(), "shared");
        }
        let entries = fs::read_dir(dir.path().join("keys")).unwrap().count();
        assert_eq!(entries, 1);
    }

    fn secret_up_to_limit() -> impl Strategy<Value = String> {
        prop::collection::vec(any::<u8>(), 0..=4096)
            .prop_map(|bytes| bytes.into_iter().map(|b| char::from(b & 0x7f)).collect())
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(value in secret_up_to_limit()) {
            let service = test_service();
            let sealed = service.encrypt(&value).unwrap();
            prop_assert_eq!(service.decrypt(&sealed).unwrap(), value);
        }

        #[test]
        fn decrypt_inverts_encrypt_multibyte(value in "\\PC{0,1024}") {
            let service = test_service();
            let sealed = service.encrypt(&value).unwrap();
            prop_assert_eq!(service.decrypt(&sealed).unwrap(), value);
        }
    }
}
