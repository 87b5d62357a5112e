// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Stores
//!
//! Three families of secrets share one contract ([`SecretStore`]):
//!
//! - `web3`: one secret per on-chain address (dataset keys)
//! - `web2`: named secrets grouped per owner address (result keys, storage tokens)
//! - `compute`: secrets bound to an application and an owner role
//!
//! Values are encrypted before they reach the database and are immutable
//! once written, except for web2 secrets which support `update`.
//!
//! ## Sections
//!
//! - [`Secret`] record and input validation
//! - [`SecretStore`] contract
//! - [`cache::ExistenceCache`] process-local presence cache

pub mod cache;
pub mod compute;
pub mod count;
pub mod provisioning;
pub mod web2;
pub mod web3;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encryption::EncryptionService;
use crate::error::{SmsError, SmsResult};

pub use cache::ExistenceCache;
pub use compute::{
    OnChainObjectType, SecretOwnerRole, TeeTaskComputeSecretHeader, TeeTaskComputeSecretService,
};
pub use count::TeeTaskComputeSecretCountService;
pub use provisioning::SecretProvisioningService;
pub use web2::{Web2Secrets, Web2SecretService};
pub use web3::Web3SecretService;

/// Maximum size of a secret value, in UTF-8 bytes.
pub const SECRET_MAX_SIZE: usize = 4096;

/// Maximum length of a requester-chosen secret key.
pub const SECRET_KEY_MAX_LENGTH: usize = 64;

// =============================================================================
// Secret
// =============================================================================

/// A named value, either as plaintext or in its persisted encrypted form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub key: String,
    pub value: String,
    pub is_encrypted: bool,
}

impl Secret {
    pub fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_encrypted: false,
        }
    }

    /// Value with surrounding whitespace removed.
    pub fn trimmed_value(&self) -> &str {
        self.value.trim()
    }

    /// Encrypted copy of this secret. Already-encrypted secrets are returned as-is.
    pub fn encrypted(self, encryption: &EncryptionService) -> SmsResult<Self> {
        if self.is_encrypted {
            return Ok(self);
        }
        Ok(Self {
            value: encryption.encrypt(&self.value)?,
            is_encrypted: true,
            key: self.key,
        })
    }

    /// Decrypted copy of this secret. Plaintext secrets are returned as-is.
    pub fn decrypted(self, encryption: &EncryptionService) -> SmsResult<Self> {
        if !self.is_encrypted {
            return Ok(self);
        }
        Ok(Self {
            value: encryption.decrypt(&self.value)?,
            is_encrypted: false,
            key: self.key,
        })
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.is_encrypted {
            self.value.as_str()
        } else {
            "<redacted>"
        };
        f.debug_struct("Secret")
            .field("key", &self.key)
            .field("value", &value)
            .field("is_encrypted", &self.is_encrypted)
            .finish()
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Reject values larger than [`SECRET_MAX_SIZE`] UTF-8 bytes.
pub fn validate_secret_size(value: &str) -> SmsResult<()> {
    if value.len() > SECRET_MAX_SIZE {
        return Err(SmsError::validation(format!(
            "secret size should not exceed {SECRET_MAX_SIZE} bytes"
        )));
    }
    Ok(())
}

/// Requester secret keys: 1 to 64 characters from `[A-Za-z0-9-]`.
pub fn validate_secret_key(key: &str) -> SmsResult<()> {
    let valid = !key.is_empty()
        && key.len() <= SECRET_KEY_MAX_LENGTH
        && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if !valid {
        return Err(SmsError::validation(
            "secret key must match [a-zA-Z0-9-]{1,64}",
        ));
    }
    Ok(())
}

// =============================================================================
// Store Contract
// =============================================================================

/// Operations shared by every secret family.
pub trait SecretStore {
    /// Identifier of a secret within this store.
    type Key: ?Sized;

    /// Fetch a secret, decrypted on request.
    fn get_secret(&self, key: &Self::Key, decrypt: bool) -> SmsResult<Option<Secret>>;

    /// Encrypt and persist a new secret.
    ///
    /// Returns `None` without touching the store when a secret already exists
    /// under `key`.
    fn add_secret(&self, key: &Self::Key, plaintext: &str) -> SmsResult<Option<Secret>>;

    /// Whether a secret exists. Served from the existence cache when possible.
    fn exists(&self, key: &Self::Key) -> SmsResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limit_counts_utf8_bytes() {
        assert!(validate_secret_size(&"a".repeat(SECRET_MAX_SIZE)).is_ok());
        assert!(validate_secret_size(&"a".repeat(SECRET_MAX_SIZE + 1)).is_err());
        // 2048 two-byte characters = 4096 bytes
        assert!(validate_secret_size(&"é".repeat(2048)).is_ok());
        assert!(validate_secret_size(&"é".repeat(2049)).is_err());
    }

    #[test]
    fn secret_key_format() {
        assert!(validate_secret_key("my-api-key-1").is_ok());
        assert!(validate_secret_key(&"a".repeat(SECRET_KEY_MAX_LENGTH)).is_ok());
        assert!(validate_secret_key("").is_err());
        assert!(validate_secret_key(&"a".repeat(SECRET_KEY_MAX_LENGTH + 1)).is_err());
        assert!(validate_secret_key("with_underscore").is_err());
        assert!(validate_secret_key("with space").is_err());
        assert!(validate_secret_key("clé").is_err());
    }

    #[test]
    fn encrypt_and_decrypt_preserve_key() {
        let encryption = EncryptionService::from_key([3u8; 32]);
        let secret = Secret::plain("name", "value");

        let sealed = secret.clone().encrypted(&encryption).unwrap();
        assert!(sealed.is_encrypted);
        assert_eq!(sealed.key, "name");
        assert_ne!(sealed.value, "value");

        let opened = sealed.decrypted(&encryption).unwrap();
        assert_eq!(opened, secret);
    }

    #[test]
    fn debug_hides_plaintext() {
        let secret = Secret::plain("name", "super-secret");
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn trimmed_value_strips_whitespace() {
        let secret = Secret::plain("k", "\ndatasetKey\n");
        assert_eq!(secret.trimmed_value(), "datasetKey");
    }
}
