// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Web3 secrets: one immutable secret per on-chain address.
//!
//! Used for dataset encryption keys, keyed by the dataset address.

use std::sync::Arc;

use crate::encryption::EncryptionService;
use crate::error::SmsResult;
use crate::storage::{SmsDatabase, WEB3_SECRETS};

use super::{ExistenceCache, Secret, SecretStore};

pub struct Web3SecretService {
    db: Arc<SmsDatabase>,
    encryption: Arc<EncryptionService>,
    cache: ExistenceCache,
}

impl Web3SecretService {
    pub fn new(db: Arc<SmsDatabase>, encryption: Arc<EncryptionService>) -> Self {
        Self {
            db,
            encryption,
            cache: ExistenceCache::new(),
        }
    }

    /// Number of stored web3 secrets.
    pub fn stored_count(&self) -> SmsResult<u64> {
        Ok(self.db.len(WEB3_SECRETS)?)
    }
}

impl SecretStore for Web3SecretService {
    type Key = str;

    fn get_secret(&self, address: &str, decrypt: bool) -> SmsResult<Option<Secret>> {
        let address = address.to_lowercase();
        let secret: Option<Secret> = self.db.get(WEB3_SECRETS, &address)?;
        match secret {
            Some(secret) if decrypt => Ok(Some(secret.decrypted(&self.encryption)?)),
            other => Ok(other),
        }
    }

    fn add_secret(&self, address: &str, plaintext: &str) -> SmsResult<Option<Secret>> {
        let address = address.to_lowercase();
        if self.exists(&address)? {
            tracing::debug!(secret_address = %address, "Web3 secret already exists");
            return Ok(None);
        }

        let secret = Secret::plain(address.as_str(), plaintext).encrypted(&self.encryption)?;
        let inserted = self.db.insert_if_absent(WEB3_SECRETS, &address, &secret)?;
        self.cache.put(&address, true);
        if !inserted {
            return Ok(None);
        }
        tracing::info!(secret_address = %address, "Added new web3 secret");
        Ok(Some(secret))
    }

    fn exists(&self, address: &str) -> SmsResult<bool> {
        let address = address.to_lowercase();
        self.cache
            .get_or_lookup(&address, || Ok(self.db.contains(WEB3_SECRETS, &address)?))
    }
}
