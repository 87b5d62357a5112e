// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Web2 secrets: named secrets grouped under an owner address.
//!
//! Holds result-encryption public keys and result-storage tokens. Each owner
//! has a single container record; names are unique within it. Unlike the
//! other families, web2 secrets may be updated in place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::encryption::EncryptionService;
use crate::error::SmsResult;
use crate::storage::{SmsDatabase, WEB2_SECRETS};

use super::{ExistenceCache, Secret, SecretStore};

/// Identifies a web2 secret: owner address plus secret name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Web2SecretKey {
    owner_address: String,
    name: String,
}

impl Web2SecretKey {
    pub fn new(owner_address: &str, name: impl Into<String>) -> Self {
        Self {
            owner_address: owner_address.to_lowercase(),
            name: name.into(),
        }
    }

    pub fn owner_address(&self) -> &str {
        &self.owner_address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn cache_key(&self) -> String {
        format!("{}|{}", self.owner_address, self.name)
    }
}

/// All web2 secrets of one owner, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Web2Secrets {
    pub owner_address: String,
    pub secrets: Vec<Secret>,
}

impl Web2Secrets {
    pub fn new(owner_address: &str) -> Self {
        Self {
            owner_address: owner_address.to_lowercase(),
            secrets: Vec::new(),
        }
    }

    pub fn get_secret(&self, name: &str) -> Option<&Secret> {
        self.secrets.iter().find(|secret| secret.key == name)
    }

    fn get_secret_mut(&mut self, name: &str) -> Option<&mut Secret> {
        self.secrets.iter_mut().find(|secret| secret.key == name)
    }
}

pub struct Web2SecretService {
    db: Arc<SmsDatabase>,
    encryption: Arc<EncryptionService>,
    cache: ExistenceCache,
}

impl Web2SecretService {
    pub fn new(db: Arc<SmsDatabase>, encryption: Arc<EncryptionService>) -> Self {
        Self {
            db,
            encryption,
            cache: ExistenceCache::new(),
        }
    }

    /// Container of an owner, values left encrypted.
    pub fn get_secrets(&self, owner_address: &str) -> SmsResult<Option<Web2Secrets>> {
        Ok(self.db.get(WEB2_SECRETS, &owner_address.to_lowercase())?)
    }

    /// Replace the value of an existing secret.
    ///
    /// Returns the stored (encrypted) secret, or `None` if there is no secret
    /// under `key`.
    pub fn update_secret(&self, key: &Web2SecretKey, plaintext: &str) -> SmsResult<Option<Secret>> {
        let replacement = Secret::plain(key.name(), plaintext).encrypted(&self.encryption)?;

        let updated = self.db.modify(
            WEB2_SECRETS,
            key.owner_address(),
            |current: Option<Web2Secrets>| {
                let Some(mut container) = current else {
                    return (None, None);
                };
                match container.get_secret_mut(key.name()) {
                    Some(existing) => {
                        *existing = replacement.clone();
                        (Some(container), Some(replacement))
                    }
                    None => (None, None),
                }
            },
        )?;

        if updated.is_some() {
            tracing::info!(
                owner_address = %key.owner_address(),
                secret_name = %key.name(),
                "Updated web2 secret"
            );
        }
        Ok(updated)
    }

    /// Number of owners with at least one web2 secret.
    pub fn stored_count(&self) -> SmsResult<u64> {
        Ok(self.db.len(WEB2_SECRETS)?)
    }
}

impl SecretStore for Web2SecretService {
    type Key = Web2SecretKey;

    fn get_secret(&self, key: &Web2SecretKey, decrypt: bool) -> SmsResult<Option<Secret>> {
        let secret = self
            .get_secrets(key.owner_address())?
            .and_then(|container| container.get_secret(key.name()).cloned());
        match secret {
            Some(secret) if decrypt => Ok(Some(secret.decrypted(&self.encryption)?)),
            other => Ok(other),
        }
    }

    fn add_secret(&self, key: &Web2SecretKey, plaintext: &str) -> SmsResult<Option<Secret>> {
        if self.exists(key)? {
            tracing::debug!(
                owner_address = %key.owner_address(),
                secret_name = %key.name(),
                "Web2 secret already exists"
            );
            return Ok(None);
        }

        let secret = Secret::plain(key.name(), plaintext).encrypted(&self.encryption)?;
        let added = self.db.modify(
            WEB2_SECRETS,
            key.owner_address(),
            |current: Option<Web2Secrets>| {
                let mut container =
                    current.unwrap_or_else(|| Web2Secrets::new(key.owner_address()));
                if container.get_secret(key.name()).is_some() {
                    return (None, None);
                }
                container.secrets.push(secret.clone());
                (Some(container), Some(secret))
            },
        )?;

        self.cache.put(&key.cache_key(), true);
        if added.is_some() {
            tracing::info!(
                owner_address = %key.owner_address(),
                secret_name = %key.name(),
                "Added new web2 secret"
            );
        }
        Ok(added)
    }

    fn exists(&self, key: &Web2SecretKey) -> SmsResult<bool> {
        self.cache.get_or_lookup(&key.cache_key(), || {
            Ok(self
                .get_secrets(key.owner_address())?
                .is_some_and(|container| container.get_secret(key.name()).is_some()))
        })
    }
}
