// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gramine sessions, posted as JSON to the secret provisioning service.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::base::{SecretEnclaveBase, SecretSessionBase};
use super::client::SpsClient;
use super::{SessionGenerationError, TeeSessionGenerationError};
use crate::tee::task::{TeeSessionRequest, IEXEC_IN_PATH, IEXEC_OUT_PATH};
use crate::tee::workflow::TeeWorkflowConfiguration;

const POST_COMPUTE_TMP_PATH: &str = "/post-compute-tmp";
const MASK: &str = "***";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpsSession {
    pub session: String,
    pub enclaves: Vec<SpsEnclave>,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SpsEnclave {
    pub name: String,
    pub mrenclave: String,
    pub command: String,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<String>,
}

impl std::fmt::Debug for SpsEnclave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpsEnclave")
            .field("name", &self.name)
            .field("mrenclave", &self.mrenclave)
            .field("command", &self.command)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .field("volumes", &self.volumes)
            .finish()
    }
}

impl SpsSession {
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        for enclave in &mut masked.enclaves {
            for value in enclave.environment.values_mut() {
                *value = MASK.to_string();
            }
        }
        masked
    }
}

fn enclave(base: SecretEnclaveBase, command: String, volumes: &[&str]) -> SpsEnclave {
    SpsEnclave {
        name: base.name,
        mrenclave: base.mrenclave,
        command,
        environment: base.environment,
        volumes: volumes.iter().map(|v| v.to_string()).collect(),
    }
}

/// Assemble the SPS descriptor from collected tokens. Pure.
pub fn build_sps_session(
    request: &TeeSessionRequest,
    base: SecretSessionBase,
    workflow: &TeeWorkflowConfiguration,
) -> SpsSession {
    let mut enclaves = Vec::with_capacity(3);
    if let Some(pre) = base.pre_compute {
        enclaves.push(enclave(
            pre,
            workflow.pre_compute().entrypoint.clone(),
            &[IEXEC_IN_PATH],
        ));
    }
    enclaves.push(enclave(
        base.app_compute,
        request.task_description.app_command(),
        &[IEXEC_IN_PATH, IEXEC_OUT_PATH],
    ));
    enclaves.push(enclave(
        base.post_compute,
        workflow.post_compute().entrypoint.clone(),
        &[IEXEC_OUT_PATH, POST_COMPUTE_TMP_PATH],
    ));
    SpsSession {
        session: request.session_id.clone(),
        enclaves,
    }
}

pub struct GramineSessionHandler {
    client: SpsClient,
    workflow: Arc<TeeWorkflowConfiguration>,
    display_debug_session: bool,
}

impl GramineSessionHandler {
    pub fn new(
        client: SpsClient,
        workflow: Arc<TeeWorkflowConfiguration>,
        display_debug_session: bool,
    ) -> Self {
        Self {
            client,
            workflow,
            display_debug_session,
        }
    }

    /// Post the session; returns the SPS URL enclaves connect to.
    pub async fn build_and_post_session(
        &self,
        request: &TeeSessionRequest,
        base: SecretSessionBase,
    ) -> Result<String, SessionGenerationError> {
        let session = build_sps_session(request, base, &self.workflow);
        if self.display_debug_session {
            if let Ok(json) = serde_json::to_string_pretty(&session.masked()) {
                tracing::info!(
                    chain_task_id = %request.task_description.chain_task_id,
                    "Session content\n{json}"
                );
            }
        }

        self.client.post_session(&session).await.map_err(|e| {
            SessionGenerationError::new(
                TeeSessionGenerationError::SecureSessionStorageCallFailed,
                format!("failed to post session: {e}"),
            )
        })?;
        Ok(self.client.enclave_url().to_string())
    }
}
