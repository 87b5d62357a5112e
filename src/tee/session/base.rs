// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider-agnostic token collection for the three enclaves of a task.
//!
//! | Stage        | Fingerprint source       | Secrets                                   |
//! |--------------|--------------------------|-------------------------------------------|
//! | pre-compute  | workflow configuration   | dataset key (web3)                        |
//! | app          | app enclave configuration| developer and requester compute secrets   |
//! | post-compute | workflow configuration   | result key, storage token (web2), challenge |

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::{SessionGenerationError, TeeSessionGenerationError};
use crate::secret::web2::Web2SecretKey;
use crate::secret::{
    SecretStore, TeeTaskComputeSecretHeader, TeeTaskComputeSecretService, Web2SecretService,
    Web3SecretService,
};
use crate::tee::challenge::TeeChallengeService;
use crate::tee::task::{TaskDescription, TeeSessionRequest};
use crate::tee::workflow::TeeWorkflowConfiguration;

// =============================================================================
// Token Names
// =============================================================================

pub const PRE_COMPUTE_ENCLAVE_NAME: &str = "pre-compute";
pub const APP_ENCLAVE_NAME: &str = "app";
pub const POST_COMPUTE_ENCLAVE_NAME: &str = "post-compute";

pub const IS_DATASET_REQUIRED: &str = "IS_DATASET_REQUIRED";
pub const IEXEC_DATASET_KEY: &str = "IEXEC_DATASET_KEY";

pub const IEXEC_APP_DEVELOPER_SECRET_0: &str = "IEXEC_APP_DEVELOPER_SECRET_0";
pub const IEXEC_REQUESTER_SECRET_0: &str = "IEXEC_REQUESTER_SECRET_0";

pub const RESULT_TASK_ID: &str = "RESULT_TASK_ID";
pub const RESULT_ENCRYPTION: &str = "RESULT_ENCRYPTION";
pub const RESULT_ENCRYPTION_PUBLIC_KEY: &str = "RESULT_ENCRYPTION_PUBLIC_KEY";
pub const RESULT_STORAGE_CALLBACK: &str = "RESULT_STORAGE_CALLBACK";
pub const RESULT_STORAGE_PROVIDER: &str = "RESULT_STORAGE_PROVIDER";
pub const RESULT_STORAGE_PROXY: &str = "RESULT_STORAGE_PROXY";
pub const RESULT_STORAGE_TOKEN: &str = "RESULT_STORAGE_TOKEN";
pub const RESULT_SIGN_WORKER_ADDRESS: &str = "RESULT_SIGN_WORKER_ADDRESS";
pub const RESULT_SIGN_TEE_CHALLENGE_PRIVATE_KEY: &str = "RESULT_SIGN_TEE_CHALLENGE_PRIVATE_KEY";

/// Web2 secret names reserved for result handling.
pub const RESULT_ENCRYPTION_PUBLIC_KEY_SECRET: &str = "iexec-result-encryption-public-key";
pub const DROPBOX_TOKEN_SECRET: &str = "iexec-result-dropbox-token";
pub const IPFS_TOKEN_SECRET: &str = "iexec-result-iexec-ipfs-token";

pub const DROPBOX_RESULT_STORAGE_PROVIDER: &str = "dropbox";

const YES: &str = "yes";
const NO: &str = "no";

// =============================================================================
// Collected Tokens
// =============================================================================

/// One enclave of the session, before provider-specific rendering.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SecretEnclaveBase {
    pub name: String,
    pub mrenclave: String,
    pub environment: BTreeMap<String, String>,
}

impl std::fmt::Debug for SecretEnclaveBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretEnclaveBase")
            .field("name", &self.name)
            .field("mrenclave", &self.mrenclave)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSessionBase {
    /// Absent when the task has neither dataset nor input files.
    pub pre_compute: Option<SecretEnclaveBase>,
    pub app_compute: SecretEnclaveBase,
    pub post_compute: SecretEnclaveBase,
}

// =============================================================================
// Service
// =============================================================================

pub struct SecretSessionBaseService {
    web3: Arc<Web3SecretService>,
    web2: Arc<Web2SecretService>,
    compute: Arc<TeeTaskComputeSecretService>,
    challenges: Arc<TeeChallengeService>,
    workflow: Arc<TeeWorkflowConfiguration>,
}

type TokenResult<T> = Result<T, SessionGenerationError>;

impl SecretSessionBaseService {
    pub fn new(
        web3: Arc<Web3SecretService>,
        web2: Arc<Web2SecretService>,
        compute: Arc<TeeTaskComputeSecretService>,
        challenges: Arc<TeeChallengeService>,
        workflow: Arc<TeeWorkflowConfiguration>,
    ) -> Self {
        Self {
            web3,
            web2,
            compute,
            challenges,
            workflow,
        }
    }

    pub fn get_secrets_tokens(&self, request: &TeeSessionRequest) -> TokenResult<SecretSessionBase> {
        let task = &request.task_description;
        let pre_compute = if task.requires_pre_compute() {
            Some(self.get_pre_compute_tokens(task)?)
        } else {
            None
        };
        Ok(SecretSessionBase {
            pre_compute,
            app_compute: self.get_app_tokens(task)?,
            post_compute: self.get_post_compute_tokens(request)?,
        })
    }

    // ========== Pre-compute ==========

    pub fn get_pre_compute_tokens(&self, task: &TaskDescription) -> TokenResult<SecretEnclaveBase> {
        let mut environment = task.all_env();
        let dataset_required = task.contains_dataset();
        environment.insert(IS_DATASET_REQUIRED.into(), dataset_required.to_string());

        if dataset_required {
            let dataset_address = task.dataset_address.as_deref().unwrap_or_default();
            let secret = self
                .web3
                .get_secret(dataset_address, true)
                .map_err(|e| {
                    SessionGenerationError::from_store(TeeSessionGenerationError::GetSecretsFailed, e)
                })?
                .ok_or_else(|| {
                    SessionGenerationError::new(
                        TeeSessionGenerationError::PreComputeGetDatasetSecretFailed,
                        format!("no key stored for dataset {dataset_address}"),
                    )
                })?;
            environment.insert(IEXEC_DATASET_KEY.into(), secret.trimmed_value().to_string());
        }

        Ok(SecretEnclaveBase {
            name: PRE_COMPUTE_ENCLAVE_NAME.into(),
            mrenclave: self.workflow.pre_compute().fingerprint.clone(),
            environment,
        })
    }

    // ========== Application ==========

    pub fn get_app_tokens(&self, task: &TaskDescription) -> TokenResult<SecretEnclaveBase> {
        let config = task.app_enclave_configuration.as_ref().ok_or_else(|| {
            SessionGenerationError::new(
                TeeSessionGenerationError::AppComputeNoEnclaveConfig,
                "application has no enclave configuration",
            )
        })?;
        let violations = config.violations();
        if !violations.is_empty() {
            return Err(SessionGenerationError::new(
                TeeSessionGenerationError::AppComputeInvalidEnclaveConfig,
                format!("invalid enclave configuration: {}", violations.join(", ")),
            ));
        }

        let mut environment = task.compute_stage_env();
        // Only index 0 is provisioned for now.
        let developer_secret =
            self.compute_secret(&TeeTaskComputeSecretHeader::app_developer(&task.app_address, 0))?;
        if let Some(value) = developer_secret {
            environment.insert(IEXEC_APP_DEVELOPER_SECRET_0.into(), value);
        }
        let requester_secret = self.compute_secret(&TeeTaskComputeSecretHeader::requester_for_app(
            &task.app_address,
            &task.requester,
            0,
        ))?;
        if let Some(value) = requester_secret {
            environment.insert(IEXEC_REQUESTER_SECRET_0.into(), value);
        }

        Ok(SecretEnclaveBase {
            name: APP_ENCLAVE_NAME.into(),
            mrenclave: config.fingerprint.clone(),
            environment,
        })
    }

    fn compute_secret(&self, header: &TeeTaskComputeSecretHeader) -> TokenResult<Option<String>> {
        let secret = self.compute.get_secret(header, true).map_err(|e| {
            SessionGenerationError::from_store(TeeSessionGenerationError::GetSecretsFailed, e)
        })?;
        Ok(secret.map(|secret| secret.value))
    }

    // ========== Post-compute ==========

    pub fn get_post_compute_tokens(
        &self,
        request: &TeeSessionRequest,
    ) -> TokenResult<SecretEnclaveBase> {
        let task = &request.task_description;
        let mut environment = BTreeMap::new();
        environment.insert(RESULT_TASK_ID.into(), task.chain_task_id.clone());
        environment.extend(self.get_post_compute_encryption_tokens(task)?);
        environment.extend(self.get_post_compute_storage_tokens(task)?);
        environment.extend(self.get_post_compute_sign_tokens(request)?);

        Ok(SecretEnclaveBase {
            name: POST_COMPUTE_ENCLAVE_NAME.into(),
            mrenclave: self.workflow.post_compute().fingerprint.clone(),
            environment,
        })
    }

    pub fn get_post_compute_encryption_tokens(
        &self,
        task: &TaskDescription,
    ) -> TokenResult<BTreeMap<String, String>> {
        let mut tokens = BTreeMap::new();
        if !task.is_result_encryption {
            tokens.insert(RESULT_ENCRYPTION.into(), NO.into());
            tokens.insert(RESULT_ENCRYPTION_PUBLIC_KEY.into(), String::new());
            return Ok(tokens);
        }

        let public_key = self
            .web2_secret(&task.beneficiary, RESULT_ENCRYPTION_PUBLIC_KEY_SECRET)?
            .ok_or_else(|| {
                SessionGenerationError::new(
                    TeeSessionGenerationError::PostComputeGetEncryptionTokensFailedEmptyBeneficiaryKey,
                    format!("no result encryption key for beneficiary {}", task.beneficiary),
                )
            })?;
        tokens.insert(RESULT_ENCRYPTION.into(), YES.into());
        tokens.insert(RESULT_ENCRYPTION_PUBLIC_KEY.into(), public_key);
        Ok(tokens)
    }

    pub fn get_post_compute_storage_tokens(
        &self,
        task: &TaskDescription,
    ) -> TokenResult<BTreeMap<String, String>> {
        let mut tokens = BTreeMap::new();
        if task.contains_callback() {
            tokens.insert(RESULT_STORAGE_CALLBACK.into(), YES.into());
            tokens.insert(RESULT_STORAGE_PROVIDER.into(), String::new());
            tokens.insert(RESULT_STORAGE_PROXY.into(), String::new());
            tokens.insert(RESULT_STORAGE_TOKEN.into(), String::new());
            return Ok(tokens);
        }

        let secret_name = if task.result_storage_provider == DROPBOX_RESULT_STORAGE_PROVIDER {
            DROPBOX_TOKEN_SECRET
        } else {
            IPFS_TOKEN_SECRET
        };
        let token = self.web2_secret(&task.requester, secret_name)?.ok_or_else(|| {
            SessionGenerationError::new(
                TeeSessionGenerationError::PostComputeGetStorageTokensFailed,
                format!("no {secret_name} for requester {}", task.requester),
            )
        })?;
        tokens.insert(RESULT_STORAGE_CALLBACK.into(), NO.into());
        tokens.insert(
            RESULT_STORAGE_PROVIDER.into(),
            task.result_storage_provider.clone(),
        );
        tokens.insert(RESULT_STORAGE_PROXY.into(), task.result_storage_proxy.clone());
        tokens.insert(RESULT_STORAGE_TOKEN.into(), token);
        Ok(tokens)
    }

    pub fn get_post_compute_sign_tokens(
        &self,
        request: &TeeSessionRequest,
    ) -> TokenResult<BTreeMap<String, String>> {
        let chain_task_id = &request.task_description.chain_task_id;
        if request.worker_address.trim().is_empty() {
            return Err(SessionGenerationError::new(
                TeeSessionGenerationError::PostComputeGetSignatureTokensFailedEmptyWorkerAddress,
                format!("empty worker address for task {chain_task_id}"),
            ));
        }
        if request.enclave_challenge.trim().is_empty() {
            return Err(SessionGenerationError::new(
                TeeSessionGenerationError::PostComputeGetSignatureTokensFailedEmptyPublicEnclaveChallenge,
                format!("empty enclave challenge for task {chain_task_id}"),
            ));
        }

        let challenge = self
            .challenges
            .get_or_create(chain_task_id, false)
            .map_err(|e| {
                SessionGenerationError::from_store(TeeSessionGenerationError::GetSecretsFailed, e)
            })?
            .ok_or_else(|| {
                SessionGenerationError::new(
                    TeeSessionGenerationError::PostComputeGetSignatureTokensFailedEmptyTeeChallenge,
                    format!("no TEE challenge for task {chain_task_id}"),
                )
            })?;
        if challenge.credentials.private_key.is_empty() {
            return Err(SessionGenerationError::new(
                TeeSessionGenerationError::PostComputeGetSignatureTokensFailedEmptyTeeCredentials,
                format!("empty TEE credentials for task {chain_task_id}"),
            ));
        }

        let mut tokens = BTreeMap::new();
        tokens.insert(RESULT_TASK_ID.into(), chain_task_id.clone());
        tokens.insert(
            RESULT_SIGN_WORKER_ADDRESS.into(),
            request.worker_address.clone(),
        );
        tokens.insert(
            RESULT_SIGN_TEE_CHALLENGE_PRIVATE_KEY.into(),
            challenge.credentials.private_key,
        );
        Ok(tokens)
    }

    /// Decrypted, trimmed value of a web2 secret.
    fn web2_secret(&self, owner: &str, name: &str) -> TokenResult<Option<String>> {
        let secret = self
            .web2
            .get_secret(&Web2SecretKey::new(owner, name), true)
            .map_err(|e| {
                SessionGenerationError::from_store(TeeSessionGenerationError::GetSecretsFailed, e)
            })?;
        Ok(secret.map(|secret| secret.trimmed_value().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tee::session::tests::{minimal_task, session_fixture, SessionFixture};

    const TASK_ID: &str = "0x9999999999999999999999999999999999999999999999999999999999999999";
    const DATASET: &str = "0x5555555555555555555555555555555555555555";
    const WORKER: &str = "0x6666666666666666666666666666666666666666";

    fn request(fixture: &SessionFixture, task: TaskDescription) -> TeeSessionRequest {
        let challenge = fixture
            .challenges
            .get_or_create(&task.chain_task_id, true)
            .unwrap()
            .unwrap();
        TeeSessionRequest {
            session_id: "session".into(),
            task_description: task,
            worker_address: WORKER.into(),
            enclave_challenge: challenge.credentials.address,
        }
    }

    #[test]
    fn pre_compute_is_skipped_without_inputs() {
        let fixture = session_fixture();
        let request = request(&fixture, minimal_task(TASK_ID));
        let base = fixture.tokens.get_secrets_tokens(&request).unwrap();
        assert!(base.pre_compute.is_none());
        assert_eq!(base.app_compute.name, APP_ENCLAVE_NAME);
        assert_eq!(base.app_compute.mrenclave, "cc".repeat(32));
        assert_eq!(base.post_compute.mrenclave, fixture.workflow.post_compute().fingerprint);
    }

    #[test]
    fn dataset_key_is_trimmed() {
        let fixture = session_fixture();
        fixture.web3.add_secret(DATASET, "\nsecretKey123\n").unwrap();
        let mut task = minimal_task(TASK_ID);
        task.dataset_address = Some(DATASET.into());
        task.dataset_uri = Some("https://host/dataset.zip".into());

        let tokens = fixture.tokens.get_pre_compute_tokens(&task).unwrap();

        assert_eq!(tokens.environment[IEXEC_DATASET_KEY], "secretKey123");
        assert_eq!(tokens.environment[IS_DATASET_REQUIRED], "true");
        assert_eq!(tokens.environment["IEXEC_DATASET_URL"], "https://host/dataset.zip");
        assert_eq!(tokens.mrenclave, fixture.workflow.pre_compute().fingerprint);
    }

    #[test]
    fn input_files_without_dataset_need_no_key() {
        let fixture = session_fixture();
        let mut task = minimal_task(TASK_ID);
        task.input_files = vec!["https://host/a.txt".into()];

        let tokens = fixture.tokens.get_pre_compute_tokens(&task).unwrap();

        assert_eq!(tokens.environment[IS_DATASET_REQUIRED], "false");
        assert!(!tokens.environment.contains_key(IEXEC_DATASET_KEY));
        assert_eq!(tokens.environment["IEXEC_INPUT_FILE_URL_1"], "https://host/a.txt");
    }

    #[test]
    fn app_secrets_are_included_when_present() {
        let fixture = session_fixture();
        let task = minimal_task(TASK_ID);

        let tokens = fixture.tokens.get_app_tokens(&task).unwrap();
        assert!(!tokens.environment.contains_key(IEXEC_APP_DEVELOPER_SECRET_0));
        assert!(!tokens.environment.contains_key(IEXEC_REQUESTER_SECRET_0));

        fixture
            .compute
            .encrypt_and_save_secret(
                &TeeTaskComputeSecretHeader::app_developer(&task.app_address, 0),
                "developer",
            )
            .unwrap();
        fixture
            .compute
            .encrypt_and_save_secret(
                &TeeTaskComputeSecretHeader::requester_for_app(&task.app_address, &task.requester, 0),
                "requester",
            )
            .unwrap();

        let tokens = fixture.tokens.get_app_tokens(&task).unwrap();
        assert_eq!(tokens.environment[IEXEC_APP_DEVELOPER_SECRET_0], "developer");
        assert_eq!(tokens.environment[IEXEC_REQUESTER_SECRET_0], "requester");
        assert_eq!(tokens.environment["IEXEC_TASK_ID"], TASK_ID);
    }

    #[test]
    fn app_without_enclave_configuration_is_rejected() {
        let fixture = session_fixture();
        let mut task = minimal_task(TASK_ID);
        task.app_enclave_configuration = None;
        let error = fixture.tokens.get_app_tokens(&task).unwrap_err();
        assert_eq!(error.code(), TeeSessionGenerationError::AppComputeNoEnclaveConfig);

        let mut task = minimal_task(TASK_ID);
        if let Some(config) = task.app_enclave_configuration.as_mut() {
            config.heap_size = 0;
        }
        let error = fixture.tokens.get_app_tokens(&task).unwrap_err();
        assert_eq!(error.code(), TeeSessionGenerationError::AppComputeInvalidEnclaveConfig);
    }

    #[test]
    fn encryption_key_is_read_from_beneficiary() {
        let fixture = session_fixture();
        let mut task = minimal_task(TASK_ID);
        task.is_result_encryption = true;

        let error = fixture
            .tokens
            .get_post_compute_encryption_tokens(&task)
            .unwrap_err();
        assert_eq!(
            error.code(),
            TeeSessionGenerationError::PostComputeGetEncryptionTokensFailedEmptyBeneficiaryKey
        );

        let pem = "-----BEGIN PUBLIC KEY-----\nMIIBIjAN\n-----END PUBLIC KEY-----";
        fixture
            .web2
            .add_secret(
                &Web2SecretKey::new(&task.beneficiary, RESULT_ENCRYPTION_PUBLIC_KEY_SECRET),
                pem,
            )
            .unwrap();
        let tokens = fixture.tokens.get_post_compute_encryption_tokens(&task).unwrap();
        assert_eq!(tokens[RESULT_ENCRYPTION], "yes");
        assert_eq!(tokens[RESULT_ENCRYPTION_PUBLIC_KEY], pem);
    }

    #[test]
    fn encryption_disabled_needs_no_key() {
        let fixture = session_fixture();
        let tokens = fixture
            .tokens
            .get_post_compute_encryption_tokens(&minimal_task(TASK_ID))
            .unwrap();
        assert_eq!(tokens[RESULT_ENCRYPTION], "no");
        assert_eq!(tokens[RESULT_ENCRYPTION_PUBLIC_KEY], "");
    }

    #[test]
    fn callback_blanks_storage_tokens() {
        let fixture = session_fixture();
        let tokens = fixture
            .tokens
            .get_post_compute_storage_tokens(&minimal_task(TASK_ID))
            .unwrap();
        assert_eq!(tokens[RESULT_STORAGE_CALLBACK], "yes");
        assert_eq!(tokens[RESULT_STORAGE_PROVIDER], "");
        assert_eq!(tokens[RESULT_STORAGE_PROXY], "");
        assert_eq!(tokens[RESULT_STORAGE_TOKEN], "");
    }

    #[test]
    fn storage_token_follows_provider() {
        let fixture = session_fixture();
        let mut task = minimal_task(TASK_ID);
        task.callback = None;

        let error = fixture.tokens.get_post_compute_storage_tokens(&task).unwrap_err();
        assert_eq!(error.code(), TeeSessionGenerationError::PostComputeGetStorageTokensFailed);

        fixture
            .web2
            .add_secret(&Web2SecretKey::new(&task.requester, IPFS_TOKEN_SECRET), " ipfs-token ")
            .unwrap();
        fixture
            .web2
            .add_secret(&Web2SecretKey::new(&task.requester, DROPBOX_TOKEN_SECRET), "dropbox-token")
            .unwrap();

        let tokens = fixture.tokens.get_post_compute_storage_tokens(&task).unwrap();
        assert_eq!(tokens[RESULT_STORAGE_CALLBACK], "no");
        assert_eq!(tokens[RESULT_STORAGE_PROVIDER], "ipfs");
        assert_eq!(tokens[RESULT_STORAGE_PROXY], "https://result.example");
        assert_eq!(tokens[RESULT_STORAGE_TOKEN], "ipfs-token");

        task.result_storage_provider = DROPBOX_RESULT_STORAGE_PROVIDER.into();
        let tokens = fixture.tokens.get_post_compute_storage_tokens(&task).unwrap();
        assert_eq!(tokens[RESULT_STORAGE_TOKEN], "dropbox-token");
    }

    #[test]
    fn sign_tokens_carry_challenge_private_key() {
        let fixture = session_fixture();
        let request = request(&fixture, minimal_task(TASK_ID));
        let challenge = fixture.challenges.get_or_create(TASK_ID, false).unwrap().unwrap();

        let tokens = fixture.tokens.get_post_compute_sign_tokens(&request).unwrap();

        assert_eq!(tokens[RESULT_TASK_ID], TASK_ID);
        assert_eq!(tokens[RESULT_SIGN_WORKER_ADDRESS], WORKER);
        assert_eq!(
            tokens[RESULT_SIGN_TEE_CHALLENGE_PRIVATE_KEY],
            challenge.credentials.private_key
        );
    }

    #[test]
    fn sign_tokens_require_every_input() {
        let fixture = session_fixture();
        let base = request(&fixture, minimal_task(TASK_ID));

        let mut request = base.clone();
        request.worker_address.clear();
        assert_eq!(
            fixture.tokens.get_post_compute_sign_tokens(&request).unwrap_err().code(),
            TeeSessionGenerationError::PostComputeGetSignatureTokensFailedEmptyWorkerAddress
        );

        let mut request = base.clone();
        request.enclave_challenge.clear();
        assert_eq!(
            fixture.tokens.get_post_compute_sign_tokens(&request).unwrap_err().code(),
            TeeSessionGenerationError::PostComputeGetSignatureTokensFailedEmptyPublicEnclaveChallenge
        );

        let mut request = base;
        request.task_description.chain_task_id = format!("0x{}", "12".repeat(32));
        assert_eq!(
            fixture.tokens.get_post_compute_sign_tokens(&request).unwrap_err().code(),
            TeeSessionGenerationError::PostComputeGetSignatureTokensFailedEmptyTeeChallenge
        );
    }

    #[test]
    fn debug_output_hides_values() {
        let fixture = session_fixture();
        let request = request(&fixture, minimal_task(TASK_ID));
        let base = fixture.tokens.get_secrets_tokens(&request).unwrap();
        let private_key = base.post_compute.environment[RESULT_SIGN_TEE_CHALLENGE_PRIVATE_KEY].clone();

        let debug = format!("{base:?}");
        assert!(debug.contains(RESULT_SIGN_TEE_CHALLENGE_PRIVATE_KEY));
        assert!(!debug.contains(private_key.trim_start_matches("0x")));
    }
}
