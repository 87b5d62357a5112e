// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scone sessions, rendered as CAS YAML.
//!
//! ```yaml
//! name: <session id>
//! version: "0.3"
//! access_policy: { read: [CREATOR], update: [CREATOR] }
//! services: [pre-compute?, app, post-compute]
//! images:   [<service>-image with its volumes]
//! volumes:  [iexec_in, iexec_out, post-compute-tmp]
//! security: { attestation: { tolerate: [...], ignore_advisories: [...] } }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::base::{SecretEnclaveBase, SecretSessionBase};
use super::client::CasClient;
use super::{SessionGenerationError, TeeSessionGenerationError};
use crate::tee::task::{TeeSessionRequest, IEXEC_IN_PATH, IEXEC_OUT_PATH};
use crate::tee::workflow::TeeWorkflowConfiguration;

pub const SESSION_VERSION: &str = "0.3";
const CREATOR_POLICY: &str = "CREATOR";
const IMAGE_SUFFIX: &str = "-image";
const WORKING_DIRECTORY: &str = "/";

const IEXEC_IN_VOLUME: &str = "iexec_in";
const IEXEC_OUT_VOLUME: &str = "iexec_out";
const POST_COMPUTE_TMP_VOLUME: &str = "post-compute-tmp";
const POST_COMPUTE_TMP_PATH: &str = "/post-compute-tmp";

const MASK: &str = "***";

/// Attestation tolerances written into every session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SconeAttestationConfig {
    pub tolerated_insecure_options: Vec<String>,
    pub ignored_sgx_advisories: Vec<String>,
}

// =============================================================================
// CAS Descriptor
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CasSession {
    pub name: String,
    pub version: String,
    pub access_policy: AccessPolicy,
    pub services: Vec<CasEnclave>,
    pub images: Vec<CasImage>,
    pub volumes: Vec<CasVolume>,
    pub security: CasSecurity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessPolicy {
    pub read: Vec<String>,
    pub update: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CasEnclave {
    pub name: String,
    pub image_name: String,
    pub mrenclaves: Vec<String>,
    pub pwd: String,
    pub command: String,
    pub environment: BTreeMap<String, String>,
}

impl std::fmt::Debug for CasEnclave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasEnclave")
            .field("name", &self.name)
            .field("image_name", &self.image_name)
            .field("mrenclaves", &self.mrenclaves)
            .field("command", &self.command)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CasImage {
    pub name: String,
    pub volumes: Vec<CasImageVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CasImageVolume {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CasVolume {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CasSecurity {
    pub attestation: CasAttestation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CasAttestation {
    pub tolerate: Vec<String>,
    pub ignore_advisories: Vec<String>,
}

impl CasSession {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Copy with every environment value replaced, for logging.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        for service in &mut masked.services {
            for value in service.environment.values_mut() {
                *value = MASK.to_string();
            }
        }
        masked
    }
}

fn volume(name: &str, path: &str) -> CasImageVolume {
    CasImageVolume {
        name: name.to_string(),
        path: path.to_string(),
    }
}

fn enclave(base: SecretEnclaveBase, command: String) -> CasEnclave {
    CasEnclave {
        image_name: format!("{}{IMAGE_SUFFIX}", base.name),
        name: base.name,
        mrenclaves: vec![base.mrenclave],
        pwd: WORKING_DIRECTORY.to_string(),
        command,
        environment: base.environment,
    }
}

/// Assemble the CAS descriptor from collected tokens. Pure.
pub fn build_cas_session(
    request: &TeeSessionRequest,
    base: SecretSessionBase,
    workflow: &TeeWorkflowConfiguration,
    attestation: &SconeAttestationConfig,
) -> CasSession {
    let in_volume = volume(IEXEC_IN_VOLUME, IEXEC_IN_PATH);
    let out_volume = volume(IEXEC_OUT_VOLUME, IEXEC_OUT_PATH);
    let tmp_volume = volume(POST_COMPUTE_TMP_VOLUME, POST_COMPUTE_TMP_PATH);

    let mut services = Vec::with_capacity(3);
    let mut images = Vec::with_capacity(3);

    if let Some(pre) = base.pre_compute {
        let pre = enclave(pre, workflow.pre_compute().entrypoint.clone());
        images.push(CasImage {
            name: pre.image_name.clone(),
            volumes: vec![in_volume.clone()],
        });
        services.push(pre);
    }

    let app = enclave(base.app_compute, request.task_description.app_command());
    images.push(CasImage {
        name: app.image_name.clone(),
        volumes: vec![in_volume, out_volume.clone()],
    });
    services.push(app);

    let post = enclave(base.post_compute, workflow.post_compute().entrypoint.clone());
    images.push(CasImage {
        name: post.image_name.clone(),
        volumes: vec![out_volume, tmp_volume],
    });
    services.push(post);

    let policy = vec![CREATOR_POLICY.to_string()];
    CasSession {
        name: request.session_id.clone(),
        version: SESSION_VERSION.to_string(),
        access_policy: AccessPolicy {
            read: policy.clone(),
            update: policy,
        },
        services,
        images,
        volumes: [IEXEC_IN_VOLUME, IEXEC_OUT_VOLUME, POST_COMPUTE_TMP_VOLUME]
            .into_iter()
            .map(|name| CasVolume {
                name: name.to_string(),
            })
            .collect(),
        security: CasSecurity {
            attestation: CasAttestation {
                tolerate: attestation.tolerated_insecure_options.clone(),
                ignore_advisories: attestation.ignored_sgx_advisories.clone(),
            },
        },
    }
}

// =============================================================================
// Handler
// =============================================================================

pub struct SconeSessionHandler {
    client: CasClient,
    workflow: Arc<TeeWorkflowConfiguration>,
    attestation: SconeAttestationConfig,
    display_debug_session: bool,
}

impl SconeSessionHandler {
    pub fn new(
        client: CasClient,
        workflow: Arc<TeeWorkflowConfiguration>,
        attestation: SconeAttestationConfig,
        display_debug_session: bool,
    ) -> Self {
        Self {
            client,
            workflow,
            attestation,
            display_debug_session,
        }
    }

    /// Render and post the session; returns the CAS URL enclaves connect to.
    pub async fn build_and_post_session(
        &self,
        request: &TeeSessionRequest,
        base: SecretSessionBase,
    ) -> Result<String, SessionGenerationError> {
        let session = build_cas_session(request, base, &self.workflow, &self.attestation);
        if self.display_debug_session {
            if let Ok(yaml) = session.masked().to_yaml() {
                tracing::info!(
                    chain_task_id = %request.task_description.chain_task_id,
                    "Session content\n{yaml}"
                );
            }
        }

        let yaml = session.to_yaml().map_err(|e| {
            SessionGenerationError::new(
                TeeSessionGenerationError::SecureSessionGenerationFailed,
                format!("failed to render CAS session: {e}"),
            )
        })?;
        self.client.post_session(yaml).await.map_err(|e| {
            SessionGenerationError::new(
                TeeSessionGenerationError::SecureSessionStorageCallFailed,
                format!("failed to post session: {e}"),
            )
        })?;
        Ok(self.client.enclave_url().to_string())
    }
}
