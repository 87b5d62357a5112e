// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signature checks gating secret writes and key release.
//!
//! Every check fails closed: malformed hex, unknown tasks, storage errors
//! and recovery failures all answer `false`. Callers only ever see a
//! boolean; the failing step is logged at debug level.

use std::sync::Arc;

use alloy::primitives::Address;

use crate::blockchain::{parse_address, parse_b256, recover_personal_signer, ChainDirectory};
use crate::tee::challenge::TeeChallengeService;
use crate::tee::task::WorkerpoolAuthorization;

/// Why a key-release request was refused. Logged, never returned.
#[derive(Debug, thiserror::Error)]
enum AuthorizationIssue {
    #[error("malformed authorization fields")]
    Malformed,

    #[error("task unknown on chain")]
    UnknownTask,

    #[error("worker signature does not match worker address")]
    WorkerSignature,

    #[error("workerpool signature does not match workerpool owner")]
    WorkerpoolSignature,

    #[error("no TEE challenge on record for task")]
    MissingChallenge,

    #[error("enclave challenge does not match the one on record")]
    ChallengeMismatch,
}

pub struct AuthorizationService {
    chain: Arc<dyn ChainDirectory>,
    challenges: Arc<TeeChallengeService>,
}

impl AuthorizationService {
    pub fn new(chain: Arc<dyn ChainDirectory>, challenges: Arc<TeeChallengeService>) -> Self {
        Self { chain, challenges }
    }

    // ========== Write Gate ==========

    /// `signature` over `challenge` was produced by the on-chain owner of
    /// `object_address`.
    pub fn is_signed_by_owner(
        &self,
        challenge: &str,
        signature: &str,
        object_address: &str,
    ) -> bool {
        let Some(object) = parse_address(object_address) else {
            return false;
        };
        let Some(owner) = self.chain.owner_of(&object) else {
            tracing::debug!(object_address = %object, "No on-chain owner found");
            return false;
        };
        recovers_to(challenge, signature, owner)
    }

    /// `signature` over `challenge` was produced by `address` itself.
    pub fn is_signed_by_himself(&self, challenge: &str, signature: &str, address: &str) -> bool {
        match parse_address(address) {
            Some(address) => recovers_to(challenge, signature, address),
            None => false,
        }
    }

    // ========== Session Gate ==========

    /// Worker and workerpool both signed the authorization and its enclave
    /// challenge is the one issued for the task.
    pub fn is_authorized_to_get_keys(&self, authorization: &WorkerpoolAuthorization) -> bool {
        match self.check_authorization(authorization) {
            Ok(()) => true,
            Err(issue) => {
                tracing::debug!(
                    chain_task_id = %authorization.chain_task_id,
                    worker_address = %authorization.worker_address,
                    reason = %issue,
                    "Refused key release"
                );
                false
            }
        }
    }

    fn check_authorization(
        &self,
        authorization: &WorkerpoolAuthorization,
    ) -> Result<(), AuthorizationIssue> {
        let hash = authorization.hash().ok_or(AuthorizationIssue::Malformed)?;
        let chain_task_id =
            parse_b256(&authorization.chain_task_id).ok_or(AuthorizationIssue::Malformed)?;
        let worker =
            parse_address(&authorization.worker_address).ok_or(AuthorizationIssue::Malformed)?;
        let enclave =
            parse_address(&authorization.enclave_challenge).ok_or(AuthorizationIssue::Malformed)?;

        let task = self
            .chain
            .get_task(&chain_task_id)
            .ok_or(AuthorizationIssue::UnknownTask)?;

        if recover_personal_signer(hash.as_slice(), &authorization.worker_signature) != Some(worker) {
            return Err(AuthorizationIssue::WorkerSignature);
        }
        if recover_personal_signer(hash.as_slice(), &authorization.workerpool_signature)
            != Some(task.workerpool_owner)
        {
            return Err(AuthorizationIssue::WorkerpoolSignature);
        }

        let challenge = self
            .challenges
            .get_or_create(&authorization.chain_task_id, false)
            .ok()
            .flatten()
            .ok_or(AuthorizationIssue::MissingChallenge)?;
        if parse_address(&challenge.credentials.address) != Some(enclave) {
            return Err(AuthorizationIssue::ChallengeMismatch);
        }
        Ok(())
    }
}

/// Decode a 0x-hex challenge and check that `signature` over it recovers to `expected`.
fn recovers_to(challenge: &str, signature: &str, expected: Address) -> bool {
    let Ok(message) = alloy::hex::decode(challenge.trim()) else {
        return false;
    };
    recover_personal_signer(&message, signature) == Some(expected)
}
