// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-task enclave challenge credentials.
//!
//! Each task gets one ephemeral Ethereum key pair. The worker learns the
//! address (the "enclave challenge") and the enclave later uses the private
//! key to sign its results. The private key is encrypted at rest.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blockchain::{generate_credentials, EthereumCredentials};
use crate::encryption::EncryptionService;
use crate::error::SmsResult;
use crate::storage::{SmsDatabase, TEE_CHALLENGES};

#[derive(Debug, Clone, Serialize)]
pub struct TeeChallenge {
    pub id: Uuid,
    pub chain_task_id: String,
    pub credentials: EthereumCredentials,
    pub created_at: DateTime<Utc>,
}

/// Persisted form; the private key is encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTeeChallenge {
    id: Uuid,
    chain_task_id: String,
    address: String,
    public_key: String,
    encrypted_private_key: String,
    created_at: DateTime<Utc>,
}

pub struct TeeChallengeService {
    db: Arc<SmsDatabase>,
    encryption: Arc<EncryptionService>,
}

impl TeeChallengeService {
    pub fn new(db: Arc<SmsDatabase>, encryption: Arc<EncryptionService>) -> Self {
        Self { db, encryption }
    }

    /// Return the challenge of `chain_task_id`, creating it on request.
    ///
    /// Concurrent first calls with `generate_if_absent` all observe the same
    /// credentials: only one record is ever committed.
    pub fn get_or_create(
        &self,
        chain_task_id: &str,
        generate_if_absent: bool,
    ) -> SmsResult<Option<TeeChallenge>> {
        let chain_task_id = chain_task_id.to_lowercase();

        if let Some(stored) = self.db.get::<StoredTeeChallenge>(TEE_CHALLENGES, &chain_task_id)? {
            return self.open(stored).map(Some);
        }
        if !generate_if_absent {
            return Ok(None);
        }

        let candidate = self.seal(&chain_task_id, generate_credentials())?;
        let stored = self
            .db
            .get_or_insert_with(TEE_CHALLENGES, &chain_task_id, || Ok(candidate.clone()))?;
        if stored.id == candidate.id {
            tracing::info!(
                chain_task_id = %chain_task_id,
                enclave_challenge = %stored.address,
                "Created TEE challenge"
            );
        }
        self.open(stored).map(Some)
    }

    pub fn stored_count(&self) -> SmsResult<u64> {
        Ok(self.db.len(TEE_CHALLENGES)?)
    }

    fn seal(
        &self,
        chain_task_id: &str,
        credentials: EthereumCredentials,
    ) -> SmsResult<StoredTeeChallenge> {
        Ok(StoredTeeChallenge {
            id: Uuid::new_v4(),
            chain_task_id: chain_task_id.to_string(),
            address: credentials.address,
            public_key: credentials.public_key,
            encrypted_private_key: self.encryption.encrypt(&credentials.private_key)?,
            created_at: Utc::now(),
        })
    }

    fn open(&self, stored: StoredTeeChallenge) -> SmsResult<TeeChallenge> {
        let private_key = self.encryption.decrypt(&stored.encrypted_private_key)?;
        Ok(TeeChallenge {
            id: stored.id,
            chain_task_id: stored.chain_task_id,
            credentials: EthereumCredentials {
                address: stored.address,
                private_key,
                public_key: stored.public_key,
            },
            created_at: stored.created_at,
        })
    }
}
