// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Task-level value objects supplied by the caller.
//!
//! These are read from the chain by the embedding service and handed over
//! already validated; this module only derives what session generation
//! needs from them (environment variables, enclave commands, the
//! authorization hash).

use std::collections::BTreeMap;

use alloy::primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};

use crate::blockchain::{parse_address, parse_b256};

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const IEXEC_TASK_ID: &str = "IEXEC_TASK_ID";
pub const IEXEC_IN: &str = "IEXEC_IN";
pub const IEXEC_OUT: &str = "IEXEC_OUT";
pub const IEXEC_DATASET_ADDRESS: &str = "IEXEC_DATASET_ADDRESS";
pub const IEXEC_DATASET_URL: &str = "IEXEC_DATASET_URL";
pub const IEXEC_DATASET_FILENAME: &str = "IEXEC_DATASET_FILENAME";
pub const IEXEC_DATASET_CHECKSUM: &str = "IEXEC_DATASET_CHECKSUM";
pub const IEXEC_BOT_SIZE: &str = "IEXEC_BOT_SIZE";
pub const IEXEC_BOT_FIRST_INDEX: &str = "IEXEC_BOT_FIRST_INDEX";
pub const IEXEC_BOT_TASK_INDEX: &str = "IEXEC_BOT_TASK_INDEX";
pub const IEXEC_INPUT_FILES_NUMBER: &str = "IEXEC_INPUT_FILES_NUMBER";
pub const IEXEC_INPUT_FILE_NAME_PREFIX: &str = "IEXEC_INPUT_FILE_NAME_";
pub const IEXEC_INPUT_FILE_URL_PREFIX: &str = "IEXEC_INPUT_FILE_URL_";

pub const IEXEC_IN_PATH: &str = "/iexec_in";
pub const IEXEC_OUT_PATH: &str = "/iexec_out";

// =============================================================================
// Enclave Configuration
// =============================================================================

/// Enclave settings declared by the application developer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeeEnclaveConfiguration {
    pub provider: String,
    pub version: String,
    pub entrypoint: String,
    pub heap_size: u64,
    /// MRENCLAVE (Scone) or enclave hash (Gramine), hex.
    pub fingerprint: String,
}

impl TeeEnclaveConfiguration {
    /// Reasons this configuration cannot be used; empty when valid.
    pub fn violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();
        if self.entrypoint.trim().is_empty() {
            violations.push("empty entrypoint");
        }
        if self.heap_size == 0 {
            violations.push("heap size must be positive");
        }
        let fingerprint = self.fingerprint.trim_start_matches("0x");
        if fingerprint.is_empty() || !fingerprint.bytes().all(|b| b.is_ascii_hexdigit()) {
            violations.push("fingerprint must be non-empty hex");
        }
        violations
    }
}

// =============================================================================
// Task Description
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub chain_task_id: String,
    pub app_address: String,
    pub app_enclave_configuration: Option<TeeEnclaveConfiguration>,
    pub cmd: Option<String>,
    pub requester: String,
    pub beneficiary: String,
    pub callback: Option<String>,
    pub dataset_address: Option<String>,
    pub dataset_uri: Option<String>,
    pub dataset_name: Option<String>,
    pub dataset_checksum: Option<String>,
    pub input_files: Vec<String>,
    pub is_result_encryption: bool,
    pub result_storage_provider: String,
    pub result_storage_proxy: String,
    pub bot_size: u64,
    pub bot_first_index: u64,
    pub bot_index: u64,
}

fn is_set_address(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(raw) => parse_address(raw).is_some_and(|address| address != Address::ZERO),
    }
}

impl TaskDescription {
    pub fn contains_dataset(&self) -> bool {
        is_set_address(self.dataset_address.as_deref())
    }

    pub fn contains_callback(&self) -> bool {
        is_set_address(self.callback.as_deref())
    }

    pub fn contains_input_files(&self) -> bool {
        !self.input_files.is_empty()
    }

    /// Pre-compute only runs when there is something to fetch.
    pub fn requires_pre_compute(&self) -> bool {
        self.contains_dataset() || self.contains_input_files()
    }

    /// Application command: entrypoint followed by the requester's args.
    pub fn app_command(&self) -> String {
        let entrypoint = self
            .app_enclave_configuration
            .as_ref()
            .map(|config| config.entrypoint.as_str())
            .unwrap_or_default();
        match self.cmd.as_deref().map(str::trim) {
            Some(args) if !args.is_empty() => format!("{entrypoint} {args}"),
            _ => entrypoint.to_string(),
        }
    }

    /// Variables visible to the application stage.
    pub fn compute_stage_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(IEXEC_TASK_ID.to_string(), self.chain_task_id.clone());
        env.insert(IEXEC_IN.to_string(), IEXEC_IN_PATH.to_string());
        env.insert(IEXEC_OUT.to_string(), IEXEC_OUT_PATH.to_string());
        env.insert(
            IEXEC_DATASET_ADDRESS.to_string(),
            self.dataset_address.clone().unwrap_or_default(),
        );
        env.insert(
            IEXEC_DATASET_FILENAME.to_string(),
            self.dataset_name.clone().unwrap_or_default(),
        );
        env.insert(IEXEC_BOT_SIZE.to_string(), self.bot_size.to_string());
        env.insert(IEXEC_BOT_FIRST_INDEX.to_string(), self.bot_first_index.to_string());
        env.insert(IEXEC_BOT_TASK_INDEX.to_string(), self.bot_index.to_string());
        env.insert(
            IEXEC_INPUT_FILES_NUMBER.to_string(),
            self.input_files.len().to_string(),
        );
        for (index, url) in self.input_files.iter().enumerate() {
            env.insert(
                format!("{IEXEC_INPUT_FILE_NAME_PREFIX}{}", index + 1),
                file_name_from_url(url),
            );
        }
        env
    }

    /// Variables visible to the pre-compute stage: the compute stage set plus
    /// everything needed to download inputs.
    pub fn all_env(&self) -> BTreeMap<String, String> {
        let mut env = self.compute_stage_env();
        env.insert(
            IEXEC_DATASET_URL.to_string(),
            self.dataset_uri.clone().unwrap_or_default(),
        );
        env.insert(
            IEXEC_DATASET_CHECKSUM.to_string(),
            self.dataset_checksum.clone().unwrap_or_default(),
        );
        for (index, url) in self.input_files.iter().enumerate() {
            env.insert(format!("{IEXEC_INPUT_FILE_URL_PREFIX}{}", index + 1), url.clone());
        }
        env
    }
}

/// Last non-empty path segment of a URL, without query or fragment.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(segment) = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return segment.to_string();
        }
    }
    url.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_string()
}

// =============================================================================
// Workerpool Authorization
// =============================================================================

/// Proof that a worker was designated by its workerpool to run a task inside
/// a given enclave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerpoolAuthorization {
    pub chain_task_id: String,
    pub worker_address: String,
    /// Address of the task's TEE challenge.
    pub enclave_challenge: String,
    /// Worker's personal-sign signature over [`WorkerpoolAuthorization::hash`].
    pub worker_signature: String,
    /// Workerpool owner's personal-sign signature over the same hash.
    pub workerpool_signature: String,
}

impl WorkerpoolAuthorization {
    /// `keccak256(worker_address || chain_task_id || enclave_challenge)` over
    /// the raw 20 + 32 + 20 bytes. `None` if any field is malformed.
    pub fn hash(&self) -> Option<B256> {
        let worker = parse_address(&self.worker_address)?;
        let task = parse_b256(&self.chain_task_id)?;
        let enclave = parse_address(&self.enclave_challenge)?;

        let mut message = Vec::with_capacity(20 + 32 + 20);
        message.extend_from_slice(worker.as_slice());
        message.extend_from_slice(task.as_slice());
        message.extend_from_slice(enclave.as_slice());
        Some(keccak256(&message))
    }
}

// =============================================================================
// Session Request / Response
// =============================================================================

/// Everything needed to assemble a session for one task execution.
#[derive(Debug, Clone)]
pub struct TeeSessionRequest {
    pub session_id: String,
    pub task_description: TaskDescription,
    pub worker_address: String,
    pub enclave_challenge: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeeSessionGenerationResponse {
    pub session_id: String,
    /// Where the enclaves fetch their session.
    pub secret_provisioning_url: String,
}
