// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service wiring. Everything is built once at startup and shared through
//! cheap `Arc` clones.

use std::sync::Arc;

use crate::auth::AuthorizationService;
use crate::blockchain::ChainDirectory;
use crate::config::SmsConfig;
use crate::encryption::{EncryptionError, EncryptionService};
use crate::error::SmsResult;
use crate::secret::{
    SecretProvisioningService, TeeTaskComputeSecretCountService, TeeTaskComputeSecretService,
    Web2SecretService, Web3SecretService,
};
use crate::storage::{DbError, SmsDatabase};
use crate::tee::session::client::{CasClient, SessionStorageError, SpsClient};
use crate::tee::session::gramine::GramineSessionHandler;
use crate::tee::session::scone::SconeSessionHandler;
use crate::tee::session::{SecretSessionBaseService, TeeSessionHandler, TeeSessionService};
use crate::tee::{TeeChallengeService, TeeProvider, TeeWorkflowConfiguration};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("encryption key unavailable: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("database unavailable: {0}")]
    Storage(#[from] DbError),

    #[error("session storage client: {0}")]
    SessionStorage(#[from] SessionStorageError),

    #[error("SPS credentials are required for the gramine provider")]
    MissingSpsCredentials,
}

#[derive(Clone)]
pub struct AppState {
    pub web3_secrets: Arc<Web3SecretService>,
    pub web2_secrets: Arc<Web2SecretService>,
    pub compute_secrets: Arc<TeeTaskComputeSecretService>,
    pub compute_secret_counts: Arc<TeeTaskComputeSecretCountService>,
    pub tee_challenges: Arc<TeeChallengeService>,
    pub authorization: Arc<AuthorizationService>,
    pub provisioning: Arc<SecretProvisioningService>,
    pub tee_sessions: Arc<TeeSessionService>,
    pub workflow: Arc<TeeWorkflowConfiguration>,
}

impl AppState {
    /// Open the key file and database, then build every service.
    ///
    /// Fails without side effects beyond creating the data directory, the
    /// key file and the database file.
    pub fn bootstrap(
        config: &SmsConfig,
        chain: Arc<dyn ChainDirectory>,
    ) -> Result<Self, BootstrapError> {
        let encryption = Arc::new(EncryptionService::load_or_create(&config.aes_key_path)?);
        let db = Arc::new(SmsDatabase::open(&config.storage_paths.database())?);
        tracing::info!(
            data_dir = %config.storage_paths.root().display(),
            provider = %config.tee_provider,
            "Storage ready"
        );

        let web3_secrets = Arc::new(Web3SecretService::new(db.clone(), encryption.clone()));
        let web2_secrets = Arc::new(Web2SecretService::new(db.clone(), encryption.clone()));
        let compute_secrets = Arc::new(TeeTaskComputeSecretService::new(
            db.clone(),
            encryption.clone(),
        ));
        let compute_secret_counts = Arc::new(TeeTaskComputeSecretCountService::new(db.clone()));
        let tee_challenges = Arc::new(TeeChallengeService::new(db, encryption));
        let authorization = Arc::new(AuthorizationService::new(chain, tee_challenges.clone()));

        let provisioning = Arc::new(SecretProvisioningService::new(
            authorization.clone(),
            web3_secrets.clone(),
            web2_secrets.clone(),
            compute_secrets.clone(),
            compute_secret_counts.clone(),
        ));

        let workflow = Arc::new(TeeWorkflowConfiguration::new(
            config.tee_provider,
            config.services.clone(),
        ));
        let tokens = Arc::new(SecretSessionBaseService::new(
            web3_secrets.clone(),
            web2_secrets.clone(),
            compute_secrets.clone(),
            tee_challenges.clone(),
            workflow.clone(),
        ));
        let handler = build_handler(config, workflow.clone())?;
        let tee_sessions = Arc::new(TeeSessionService::new(
            authorization.clone(),
            tokens,
            handler,
        ));

        Ok(Self {
            web3_secrets,
            web2_secrets,
            compute_secrets,
            compute_secret_counts,
            tee_challenges,
            authorization,
            provisioning,
            tee_sessions,
            workflow,
        })
    }
}

/// Number of stored records per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredCounts {
    pub web3_secrets: u64,
    pub web2_owners: u64,
    pub compute_secrets: u64,
    pub tee_challenges: u64,
}

impl AppState {
    pub fn stored_counts(&self) -> SmsResult<StoredCounts> {
        Ok(StoredCounts {
            web3_secrets: self.web3_secrets.stored_count()?,
            web2_owners: self.web2_secrets.stored_count()?,
            compute_secrets: self.compute_secrets.stored_count()?,
            tee_challenges: self.tee_challenges.stored_count()?,
        })
    }
}

fn build_handler(
    config: &SmsConfig,
    workflow: Arc<TeeWorkflowConfiguration>,
) -> Result<TeeSessionHandler, BootstrapError> {
    let handler = match config.tee_provider {
        TeeProvider::Scone => TeeSessionHandler::Scone(SconeSessionHandler::new(
            CasClient::new(&config.session_storage)?,
            workflow,
            config.scone_attestation.clone(),
            config.display_debug_session,
        )),
        TeeProvider::Gramine => {
            let credentials = config
                .sps_credentials
                .as_ref()
                .ok_or(BootstrapError::MissingSpsCredentials)?;
            TeeSessionHandler::Gramine(GramineSessionHandler::new(
                SpsClient::new(
                    &config.session_storage,
                    credentials.login.clone(),
                    credentials.password.as_str(),
                )?,
                workflow,
                config.display_debug_session,
            ))
        }
    };
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::challenge::web3_secret_challenge;
    use crate::blockchain::InMemoryChainDirectory;
    use crate::error::ErrorKind;
    use crate::secret::SecretStore;
    use crate::test_support::{random_signer, sign_challenge};
    use std::collections::HashMap;

    fn config(data_dir: &str, provider: &str) -> SmsConfig {
        let vars = HashMap::from([
            ("DATA_DIR", data_dir.to_string()),
            ("TEE_PROVIDER", provider.to_string()),
            ("SESSION_STORAGE_URL", "http://127.0.0.1:1".to_string()),
            ("SESSION_STORAGE_ENCLAVE_URL", "https://storage:443".to_string()),
            ("SPS_LOGIN", "admin".to_string()),
            ("SPS_PASSWORD", "admin".to_string()),
            ("TEE_PRE_COMPUTE_IMAGE", "pre:1".to_string()),
            ("TEE_PRE_COMPUTE_FINGERPRINT", "aa".to_string()),
            ("TEE_PRE_COMPUTE_ENTRYPOINT", "/pre".to_string()),
            ("TEE_POST_COMPUTE_IMAGE", "post:1".to_string()),
            ("TEE_POST_COMPUTE_FINGERPRINT", "bb".to_string()),
            ("TEE_POST_COMPUTE_ENTRYPOINT", "/post".to_string()),
        ]);
        SmsConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    #[test]
    fn bootstrap_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        let address = "0x1111111111111111111111111111111111111111";

        {
            let state = AppState::bootstrap(
                &config(data_dir, "scone"),
                Arc::new(InMemoryChainDirectory::new()),
            )
            .unwrap();
            state.web3_secrets.add_secret(address, "dataset-key").unwrap();
            assert!(dir.path().join("keys").join("aes.key").exists());
        }

        let state = AppState::bootstrap(
            &config(data_dir, "gramine"),
            Arc::new(InMemoryChainDirectory::new()),
        )
        .unwrap();
        let secret = state.web3_secrets.get_secret(address, true).unwrap().unwrap();
        assert_eq!(secret.value, "dataset-key");
        assert_eq!(state.workflow.provider, TeeProvider::Gramine);
        assert_eq!(
            state.stored_counts().unwrap(),
            StoredCounts {
                web3_secrets: 1,
                web2_owners: 0,
                compute_secrets: 0,
                tee_challenges: 0,
            }
        );
    }

    #[test]
    fn empty_chain_directory_refuses_owner_signed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::bootstrap(
            &config(dir.path().to_str().unwrap(), "scone"),
            Arc::new(InMemoryChainDirectory::new()),
        )
        .unwrap();
        let owner = random_signer();
        let dataset = "0x1111111111111111111111111111111111111111";
        let challenge = web3_secret_challenge(dataset, "dataset-key").unwrap();

        let error = state
            .provisioning
            .add_web3_secret(dataset, "dataset-key", &sign_challenge(&owner, &challenge))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unauthorized);
        assert!(!state.web3_secrets.exists(dataset).unwrap());
    }

    #[test]
    fn gramine_without_credentials_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path().to_str().unwrap(), "gramine");
        config.sps_credentials = None;

        let result = AppState::bootstrap(&config, Arc::new(InMemoryChainDirectory::new()));
        assert!(matches!(result, Err(BootstrapError::MissingSpsCredentials)));
    }
}
