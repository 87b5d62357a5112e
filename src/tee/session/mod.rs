// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # TEE Session Generation
//!
//! Single entry point for workers: given a workerpool authorization and the
//! task description, collect every secret the three enclaves need, render
//! the provider-specific session and post it to the session storage.
//!
//! ```text
//! authorize ─▶ session id ─▶ collect tokens ─▶ build (Scone | Gramine) ─▶ post
//! ```
//!
//! Nothing is retried; any failure aborts generation with a stable
//! [`TeeSessionGenerationError`] code.

pub mod base;
pub mod client;
pub mod gramine;
pub mod handler;
pub mod scone;

use std::fmt;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::auth::AuthorizationService;
use crate::blockchain::parse_b256;
use crate::error::{ErrorKind, SmsError};
use crate::tee::task::{
    TaskDescription, TeeSessionGenerationResponse, TeeSessionRequest, WorkerpoolAuthorization,
};

pub use base::{SecretEnclaveBase, SecretSessionBase, SecretSessionBaseService};
pub use handler::TeeSessionHandler;

const SESSION_ID_RANDOM_LENGTH: usize = 10;
const SESSION_ID_SEPARATOR: &str = "0000";

// =============================================================================
// Errors
// =============================================================================

/// Stable failure codes reported to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeeSessionGenerationError {
    ExecutionNotAuthorized,
    GetSecretsFailed,
    PreComputeGetDatasetSecretFailed,
    AppComputeNoEnclaveConfig,
    AppComputeInvalidEnclaveConfig,
    PostComputeGetEncryptionTokensFailedEmptyBeneficiaryKey,
    PostComputeGetStorageTokensFailed,
    PostComputeGetSignatureTokensFailedEmptyWorkerAddress,
    PostComputeGetSignatureTokensFailedEmptyPublicEnclaveChallenge,
    PostComputeGetSignatureTokensFailedEmptyTeeChallenge,
    PostComputeGetSignatureTokensFailedEmptyTeeCredentials,
    SecureSessionGenerationFailed,
    SecureSessionStorageCallFailed,
}

impl TeeSessionGenerationError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionNotAuthorized => "EXECUTION_NOT_AUTHORIZED",
            Self::GetSecretsFailed => "GET_SECRETS_FAILED",
            Self::PreComputeGetDatasetSecretFailed => "PRE_COMPUTE_GET_DATASET_SECRET_FAILED",
            Self::AppComputeNoEnclaveConfig => "APP_COMPUTE_NO_ENCLAVE_CONFIG",
            Self::AppComputeInvalidEnclaveConfig => "APP_COMPUTE_INVALID_ENCLAVE_CONFIG",
            Self::PostComputeGetEncryptionTokensFailedEmptyBeneficiaryKey => {
                "POST_COMPUTE_GET_ENCRYPTION_TOKENS_FAILED_EMPTY_BENEFICIARY_KEY"
            }
            Self::PostComputeGetStorageTokensFailed => "POST_COMPUTE_GET_STORAGE_TOKENS_FAILED",
            Self::PostComputeGetSignatureTokensFailedEmptyWorkerAddress => {
                "POST_COMPUTE_GET_SIGNATURE_TOKENS_FAILED_EMPTY_WORKER_ADDRESS"
            }
            Self::PostComputeGetSignatureTokensFailedEmptyPublicEnclaveChallenge => {
                "POST_COMPUTE_GET_SIGNATURE_TOKENS_FAILED_EMPTY_PUBLIC_ENCLAVE_CHALLENGE"
            }
            Self::PostComputeGetSignatureTokensFailedEmptyTeeChallenge => {
                "POST_COMPUTE_GET_SIGNATURE_TOKENS_FAILED_EMPTY_TEE_CHALLENGE"
            }
            Self::PostComputeGetSignatureTokensFailedEmptyTeeCredentials => {
                "POST_COMPUTE_GET_SIGNATURE_TOKENS_FAILED_EMPTY_TEE_CREDENTIALS"
            }
            Self::SecureSessionGenerationFailed => "SECURE_SESSION_GENERATION_FAILED",
            Self::SecureSessionStorageCallFailed => "SECURE_SESSION_STORAGE_CALL_FAILED",
        }
    }

    /// Kind used when the code is raised directly rather than from a store error.
    pub fn default_kind(&self) -> ErrorKind {
        match self {
            Self::ExecutionNotAuthorized => ErrorKind::Unauthorized,
            Self::AppComputeNoEnclaveConfig | Self::AppComputeInvalidEnclaveConfig => {
                ErrorKind::Validation
            }
            Self::PreComputeGetDatasetSecretFailed
            | Self::PostComputeGetEncryptionTokensFailedEmptyBeneficiaryKey
            | Self::PostComputeGetStorageTokensFailed
            | Self::PostComputeGetSignatureTokensFailedEmptyWorkerAddress
            | Self::PostComputeGetSignatureTokensFailedEmptyPublicEnclaveChallenge
            | Self::PostComputeGetSignatureTokensFailedEmptyTeeChallenge
            | Self::PostComputeGetSignatureTokensFailedEmptyTeeCredentials => ErrorKind::NotFound,
            Self::GetSecretsFailed | Self::SecureSessionStorageCallFailed => {
                ErrorKind::StorageTransport
            }
            Self::SecureSessionGenerationFailed => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for TeeSessionGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct SessionGenerationError {
    code: TeeSessionGenerationError,
    kind: ErrorKind,
    message: String,
}

impl SessionGenerationError {
    pub fn new(code: TeeSessionGenerationError, message: impl Into<String>) -> Self {
        Self {
            kind: code.default_kind(),
            code,
            message: message.into(),
        }
    }

    /// A store read failed while collecting tokens; keeps the store's kind.
    pub fn from_store(code: TeeSessionGenerationError, error: SmsError) -> Self {
        Self {
            code,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn code(&self) -> TeeSessionGenerationError {
        self.code
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn error_code(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct TeeSessionService {
    authorization: Arc<AuthorizationService>,
    tokens: Arc<SecretSessionBaseService>,
    handler: TeeSessionHandler,
}

impl TeeSessionService {
    pub fn new(
        authorization: Arc<AuthorizationService>,
        tokens: Arc<SecretSessionBaseService>,
        handler: TeeSessionHandler,
    ) -> Self {
        Self {
            authorization,
            tokens,
            handler,
        }
    }

    /// Authorize the worker, then build and post the session of its task.
    ///
    /// No secret is read unless the authorization holds and names the same
    /// task as `task_description`.
    pub async fn generate_tee_session(
        &self,
        authorization: &WorkerpoolAuthorization,
        task_description: TaskDescription,
    ) -> Result<TeeSessionGenerationResponse, SessionGenerationError> {
        let chain_task_id = authorization.chain_task_id.clone();
        if !self.authorization.is_authorized_to_get_keys(authorization)
            || !same_task(&chain_task_id, &task_description.chain_task_id)
        {
            tracing::warn!(
                chain_task_id = %chain_task_id,
                worker_address = %authorization.worker_address,
                "Unauthorized TEE session request"
            );
            return Err(SessionGenerationError::new(
                TeeSessionGenerationError::ExecutionNotAuthorized,
                "worker is not authorized to get keys for this task",
            ));
        }

        let session_id = create_session_id(&chain_task_id);
        tracing::info!(
            chain_task_id = %chain_task_id,
            session_id = %session_id,
            provider = %self.handler.provider(),
            "Generating TEE session"
        );

        let request = TeeSessionRequest {
            session_id: session_id.clone(),
            task_description,
            worker_address: authorization.worker_address.clone(),
            enclave_challenge: authorization.enclave_challenge.clone(),
        };
        let base = self.tokens.get_secrets_tokens(&request)?;
        let secret_provisioning_url = self
            .handler
            .build_and_post_session(&request, base)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    chain_task_id = %chain_task_id,
                    error_code = e.error_code(),
                    "Failed to post TEE session"
                )
            })?;

        tracing::info!(
            chain_task_id = %chain_task_id,
            session_id = %session_id,
            "TEE session posted"
        );
        Ok(TeeSessionGenerationResponse {
            session_id,
            secret_provisioning_url,
        })
    }
}

fn same_task(a: &str, b: &str) -> bool {
    matches!((parse_b256(a), parse_b256(b)), (Some(a), Some(b)) if a == b)
}

/// `<10 random alphanumerics>0000<chain task id>`.
pub fn create_session_id(chain_task_id: &str) -> String {
    let prefix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_RANDOM_LENGTH)
        .map(char::from)
        .collect();
    format!("{prefix}{SESSION_ID_SEPARATOR}{chain_task_id}")
}
