// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pre-compute and post-compute stage images run around every application.
//!
//! Workers fetch this configuration to know which images to pull; session
//! builders use the fingerprints and entrypoints when assembling enclaves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Enclave technology the service generates sessions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeeProvider {
    Scone,
    Gramine,
}

impl TeeProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scone => "SCONE",
            Self::Gramine => "GRAMINE",
        }
    }
}

impl fmt::Display for TeeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown TEE provider: {0} (expected scone or gramine)")]
pub struct UnknownTeeProvider(String);

impl FromStr for TeeProvider {
    type Err = UnknownTeeProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scone" => Ok(Self::Scone),
            "gramine" => Ok(Self::Gramine),
            _ => Err(UnknownTeeProvider(value.to_string())),
        }
    }
}

/// One stage image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeeAppProperties {
    pub image: String,
    pub fingerprint: String,
    pub entrypoint: String,
    pub heap_size: u64,
}

/// Stage images shared by every task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeeServicesConfig {
    pub pre_compute: TeeAppProperties,
    pub post_compute: TeeAppProperties,
    /// Local attestation service image, Scone only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub las_image: Option<String>,
}

/// What workers fetch before running a TEE task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeeWorkflowConfiguration {
    pub provider: TeeProvider,
    #[serde(flatten)]
    pub services: TeeServicesConfig,
}

impl TeeWorkflowConfiguration {
    pub fn new(provider: TeeProvider, services: TeeServicesConfig) -> Self {
        Self { provider, services }
    }

    pub fn pre_compute(&self) -> &TeeAppProperties {
        &self.services.pre_compute
    }

    pub fn post_compute(&self) -> &TeeAppProperties {
        &self.services.post_compute
    }
}

#[cfg(test)]
pub(crate) fn sample_services() -> TeeServicesConfig {
    TeeServicesConfig {
        pre_compute: TeeAppProperties {
            image: "iexechub/tee-worker-pre-compute:8.0.0".into(),
            fingerprint: "aa".repeat(32),
            entrypoint: "/app/pre-compute".into(),
            heap_size: 3 * 1024 * 1024 * 1024,
        },
        post_compute: TeeAppProperties {
            image: "iexechub/tee-worker-post-compute:8.0.0".into(),
            fingerprint: "bb".repeat(32),
            entrypoint: "/app/post-compute".into(),
            heap_size: 3 * 1024 * 1024 * 1024,
        },
        las_image: Some("iexechub/las:5.7.6".into()),
    }
}
