// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compute secrets bound to an on-chain object and an owner role.
//!
//! A compute secret is addressed by the tuple
//! `(object type, object address, owner role, fixed owner, key)`:
//!
//! | Owner role | Object | Fixed owner | Key |
//! |------------|--------|-------------|-----|
//! | `APPLICATION_DEVELOPER` | app address | empty | index (`"0"`) |
//! | `REQUESTER` (indexed) | app address | requester address | index |
//! | `REQUESTER` (named) | empty | requester address | `[A-Za-z0-9-]{1,64}` |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::encryption::EncryptionService;
use crate::error::SmsResult;
use crate::storage::{SmsDatabase, COMPUTE_SECRETS};

use super::{ExistenceCache, Secret, SecretStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnChainObjectType {
    Application,
    Dataset,
    Workerpool,
}

impl OnChainObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnChainObjectType::Application => "APPLICATION",
            OnChainObjectType::Dataset => "DATASET",
            OnChainObjectType::Workerpool => "WORKERPOOL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecretOwnerRole {
    ApplicationDeveloper,
    Requester,
}

impl SecretOwnerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretOwnerRole::ApplicationDeveloper => "APPLICATION_DEVELOPER",
            SecretOwnerRole::Requester => "REQUESTER",
        }
    }
}

impl fmt::Display for SecretOwnerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a compute secret. Addresses are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeeTaskComputeSecretHeader {
    pub on_chain_object_type: OnChainObjectType,
    pub on_chain_object_address: String,
    pub secret_owner_role: SecretOwnerRole,
    pub fixed_secret_owner: String,
    pub key: String,
}

impl TeeTaskComputeSecretHeader {
    pub fn new(
        on_chain_object_type: OnChainObjectType,
        on_chain_object_address: &str,
        secret_owner_role: SecretOwnerRole,
        fixed_secret_owner: &str,
        key: impl Into<String>,
    ) -> Self {
        Self {
            on_chain_object_type,
            on_chain_object_address: on_chain_object_address.to_lowercase(),
            secret_owner_role,
            fixed_secret_owner: fixed_secret_owner.to_lowercase(),
            key: key.into(),
        }
    }

    /// Secret provided by the developer of `app_address`.
    pub fn app_developer(app_address: &str, index: u64) -> Self {
        Self::new(
            OnChainObjectType::Application,
            app_address,
            SecretOwnerRole::ApplicationDeveloper,
            "",
            index.to_string(),
        )
    }

    /// Secret provided by `requester` for `app_address`, bounded by the app's
    /// requester secret count.
    pub fn requester_for_app(app_address: &str, requester: &str, index: u64) -> Self {
        Self::new(
            OnChainObjectType::Application,
            app_address,
            SecretOwnerRole::Requester,
            requester,
            index.to_string(),
        )
    }

    /// Named secret provided by `requester`, usable with any app.
    pub fn requester_named(requester: &str, key: &str) -> Self {
        Self::new(
            OnChainObjectType::Application,
            "",
            SecretOwnerRole::Requester,
            requester,
            key,
        )
    }

    /// Database key: `type|address|role|owner|key`.
    pub fn storage_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.on_chain_object_type.as_str(),
            self.on_chain_object_address,
            self.secret_owner_role.as_str(),
            self.fixed_secret_owner,
            self.key
        )
    }
}

/// Persisted form: header plus encrypted value.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredComputeSecret {
    header: TeeTaskComputeSecretHeader,
    value: String,
}

pub struct TeeTaskComputeSecretService {
    db: Arc<SmsDatabase>,
    encryption: Arc<EncryptionService>,
    cache: ExistenceCache,
}

impl TeeTaskComputeSecretService {
    pub fn new(db: Arc<SmsDatabase>, encryption: Arc<EncryptionService>) -> Self {
        Self {
            db,
            encryption,
            cache: ExistenceCache::new(),
        }
    }

    pub fn is_secret_present(&self, header: &TeeTaskComputeSecretHeader) -> SmsResult<bool> {
        self.exists(header)
    }

    /// Encrypt and store a secret. Returns `false` if one already exists.
    pub fn encrypt_and_save_secret(
        &self,
        header: &TeeTaskComputeSecretHeader,
        plaintext: &str,
    ) -> SmsResult<bool> {
        Ok(self.add_secret(header, plaintext)?.is_some())
    }

    pub fn stored_count(&self) -> SmsResult<u64> {
        Ok(self.db.len(COMPUTE_SECRETS)?)
    }
}

impl SecretStore for TeeTaskComputeSecretService {
    type Key = TeeTaskComputeSecretHeader;

    fn get_secret(
        &self,
        header: &TeeTaskComputeSecretHeader,
        decrypt: bool,
    ) -> SmsResult<Option<Secret>> {
        let storage_key = header.storage_key();
        let stored: Option<StoredComputeSecret> = self.db.get(COMPUTE_SECRETS, &storage_key)?;
        let Some(stored) = stored else {
            return Ok(None);
        };
        let secret = Secret {
            key: storage_key,
            value: stored.value,
            is_encrypted: true,
        };
        if decrypt {
            Ok(Some(secret.decrypted(&self.encryption)?))
        } else {
            Ok(Some(secret))
        }
    }

    fn add_secret(
        &self,
        header: &TeeTaskComputeSecretHeader,
        plaintext: &str,
    ) -> SmsResult<Option<Secret>> {
        let storage_key = header.storage_key();
        if self.exists(header)? {
            tracing::debug!(
                secret_owner_role = %header.secret_owner_role,
                object_address = %header.on_chain_object_address,
                "Compute secret already exists"
            );
            return Ok(None);
        }

        let secret = Secret::plain(storage_key.as_str(), plaintext).encrypted(&self.encryption)?;
        let stored = StoredComputeSecret {
            header: header.clone(),
            value: secret.value.clone(),
        };
        let inserted = self.db.insert_if_absent(COMPUTE_SECRETS, &storage_key, &stored)?;
        self.cache.put(&storage_key, true);
        if !inserted {
            return Ok(None);
        }
        tracing::info!(
            secret_owner_role = %header.secret_owner_role,
            object_address = %header.on_chain_object_address,
            fixed_secret_owner = %header.fixed_secret_owner,
            key = %header.key,
            "Added new compute secret"
        );
        Ok(Some(secret))
    }

    fn exists(&self, header: &TeeTaskComputeSecretHeader) -> SmsResult<bool> {
        let storage_key = header.storage_key();
        self.cache
            .get_or_lookup(&storage_key, || Ok(self.db.contains(COMPUTE_SECRETS, &storage_key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{random_address, test_storage};

    #[test]
    fn header_lowercases_addresses() {
        let header = TeeTaskComputeSecretHeader::requester_for_app(
            "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa",
            "0xBBBBbbbbBBBBbbbbBBBBbbbbBBBBbbbbBBBBbbbb",
            0,
        );
        assert_eq!(
            header.storage_key(),
            "APPLICATION|0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa|REQUESTER|\
             0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb|0"
        );
    }

    #[test]
    fn headers_with_different_roles_do_not_collide() {
        let app = random_address();
        let developer = TeeTaskComputeSecretHeader::app_developer(&app, 0);
        let requester = TeeTaskComputeSecretHeader::requester_for_app(&app, "", 0);
        assert_ne!(developer.storage_key(), requester.storage_key());
    }

    #[test]
    fn save_then_read_back() {
        let storage = test_storage();
        let service =
            TeeTaskComputeSecretService::new(storage.db.clone(), storage.encryption.clone());
        let header = TeeTaskComputeSecretHeader::app_developer(&random_address(), 0);

        assert!(!service.is_secret_present(&header).unwrap());
        assert!(service.encrypt_and_save_secret(&header, "developer-secret").unwrap());
        assert!(service.is_secret_present(&header).unwrap());

        let raw = service.get_secret(&header, false).unwrap().unwrap();
        assert!(raw.is_encrypted);
        let plain = service.get_secret(&header, true).unwrap().unwrap();
        assert_eq!(plain.value, "developer-secret");
    }

    #[test]
    fn second_save_keeps_first_value() {
        let storage = test_storage();
        let service =
            TeeTaskComputeSecretService::new(storage.db.clone(), storage.encryption.clone());
        let header = TeeTaskComputeSecretHeader::requester_named(&random_address(), "api-key");

        assert!(service.encrypt_and_save_secret(&header, "first").unwrap());
        assert!(!service.encrypt_and_save_secret(&header, "second").unwrap());
        assert_eq!(service.get_secret(&header, true).unwrap().unwrap().value, "first");
        assert_eq!(service.stored_count().unwrap(), 1);
    }

    #[test]
    fn mixed_case_lookup_finds_secret() {
        let storage = test_storage();
        let service =
            TeeTaskComputeSecretService::new(storage.db.clone(), storage.encryption.clone());
        let requester = "0xCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCc";

        service
            .encrypt_and_save_secret(&TeeTaskComputeSecretHeader::requester_named(requester, "k"), "v")
            .unwrap();

        let lower = TeeTaskComputeSecretHeader::requester_named(&requester.to_lowercase(), "k");
        assert!(service.is_secret_present(&lower).unwrap());
    }

    #[test]
    fn roles_serialize_in_screaming_case() {
        assert_eq!(
            serde_json::to_string(&SecretOwnerRole::ApplicationDeveloper).unwrap(),
            "\"APPLICATION_DEVELOPER\""
        );
        assert_eq!(
            serde_json::to_string(&OnChainObjectType::Workerpool).unwrap(),
            "\"WORKERPOOL\""
        );
    }
}
