// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup. Missing or
//! malformed values abort bootstrap.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the database and key file | `/data` |
//! | `SMS_AES_KEY_PATH` | AES-256 key file, created on first start | `$DATA_DIR/keys/aes.key` |
//! | `TEE_PROVIDER` | Session format (`scone` or `gramine`) | Required |
//! | `SESSION_STORAGE_URL` | CAS / SPS endpoint the service posts sessions to | Required |
//! | `SESSION_STORAGE_ENCLAVE_URL` | CAS / SPS endpoint handed to enclaves | Required |
//! | `SESSION_STORAGE_TIMEOUT_SECS` | Timeout of one session post | `15` |
//! | `SPS_LOGIN` | SPS basic auth user | Required for `gramine` |
//! | `SPS_PASSWORD` | SPS basic auth password | Required for `gramine` |
//! | `TEE_PRE_COMPUTE_IMAGE` | Pre-compute stage image | Required |
//! | `TEE_PRE_COMPUTE_FINGERPRINT` | Pre-compute enclave fingerprint | Required |
//! | `TEE_PRE_COMPUTE_ENTRYPOINT` | Pre-compute command | Required |
//! | `TEE_PRE_COMPUTE_HEAP_SIZE` | Pre-compute heap, bytes | `3221225472` |
//! | `TEE_POST_COMPUTE_IMAGE` | Post-compute stage image | Required |
//! | `TEE_POST_COMPUTE_FINGERPRINT` | Post-compute enclave fingerprint | Required |
//! | `TEE_POST_COMPUTE_ENTRYPOINT` | Post-compute command | Required |
//! | `TEE_POST_COMPUTE_HEAP_SIZE` | Post-compute heap, bytes | `3221225472` |
//! | `SCONE_LAS_IMAGE` | Local attestation service image | Optional |
//! | `SCONE_TOLERATED_INSECURE_OPTIONS` | Comma-separated attestation tolerances | Empty |
//! | `SCONE_IGNORED_SGX_ADVISORIES` | Comma-separated advisory ids | Empty |
//! | `SMS_DISPLAY_DEBUG_SESSION` | Log each session with values masked | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::storage::paths::DATA_ROOT;
use crate::storage::StoragePaths;
use crate::tee::session::client::SessionStorageEndpoint;
use crate::tee::session::scone::SconeAttestationConfig;
use crate::tee::workflow::{TeeAppProperties, TeeProvider, TeeServicesConfig};
use crate::telemetry::LogFormat;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const AES_KEY_PATH_ENV: &str = "SMS_AES_KEY_PATH";
pub const TEE_PROVIDER_ENV: &str = "TEE_PROVIDER";
pub const SESSION_STORAGE_URL_ENV: &str = "SESSION_STORAGE_URL";
pub const SESSION_STORAGE_ENCLAVE_URL_ENV: &str = "SESSION_STORAGE_ENCLAVE_URL";
pub const SESSION_STORAGE_TIMEOUT_ENV: &str = "SESSION_STORAGE_TIMEOUT_SECS";
pub const SPS_LOGIN_ENV: &str = "SPS_LOGIN";
pub const SPS_PASSWORD_ENV: &str = "SPS_PASSWORD";
pub const SCONE_LAS_IMAGE_ENV: &str = "SCONE_LAS_IMAGE";
pub const SCONE_TOLERATED_INSECURE_OPTIONS_ENV: &str = "SCONE_TOLERATED_INSECURE_OPTIONS";
pub const SCONE_IGNORED_SGX_ADVISORIES_ENV: &str = "SCONE_IGNORED_SGX_ADVISORIES";
pub const DISPLAY_DEBUG_SESSION_ENV: &str = "SMS_DISPLAY_DEBUG_SESSION";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_SESSION_STORAGE_TIMEOUT_SECS: u64 = 15;
const DEFAULT_HEAP_SIZE: u64 = 3 * 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    Missing(String),

    #[error("invalid {name}: {message}")]
    Invalid { name: String, message: String },
}

fn invalid(name: &str, message: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        message: message.to_string(),
    }
}

/// Basic auth credentials for the Gramine SPS.
#[derive(Clone)]
pub struct SpsCredentials {
    pub login: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for SpsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpsCredentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub storage_paths: StoragePaths,
    pub aes_key_path: PathBuf,
    pub tee_provider: TeeProvider,
    pub session_storage: SessionStorageEndpoint,
    pub sps_credentials: Option<SpsCredentials>,
    pub services: TeeServicesConfig,
    pub scone_attestation: SconeAttestationConfig,
    pub display_debug_session: bool,
    pub log_format: LogFormat,
}

impl SmsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let storage_paths = StoragePaths::new(env.or_default(DATA_DIR_ENV, DATA_ROOT));
        let aes_key_path = env
            .optional(AES_KEY_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_paths.aes_key());

        let tee_provider: TeeProvider = env
            .required(TEE_PROVIDER_ENV)?
            .parse()
            .map_err(|e| invalid(TEE_PROVIDER_ENV, e))?;

        let session_storage = SessionStorageEndpoint {
            url: env.url(SESSION_STORAGE_URL_ENV)?,
            enclave_url: env.url(SESSION_STORAGE_ENCLAVE_URL_ENV)?,
            timeout: Duration::from_secs(
                env.parsed(SESSION_STORAGE_TIMEOUT_ENV, DEFAULT_SESSION_STORAGE_TIMEOUT_SECS)?,
            ),
        };

        let sps_credentials = match tee_provider {
            TeeProvider::Gramine => Some(SpsCredentials {
                login: env.required(SPS_LOGIN_ENV)?,
                password: Zeroizing::new(env.required(SPS_PASSWORD_ENV)?),
            }),
            TeeProvider::Scone => None,
        };

        let services = TeeServicesConfig {
            pre_compute: env.stage("TEE_PRE_COMPUTE")?,
            post_compute: env.stage("TEE_POST_COMPUTE")?,
            las_image: env.optional(SCONE_LAS_IMAGE_ENV),
        };

        let scone_attestation = SconeAttestationConfig {
            tolerated_insecure_options: env.list(SCONE_TOLERATED_INSECURE_OPTIONS_ENV),
            ignored_sgx_advisories: env.list(SCONE_IGNORED_SGX_ADVISORIES_ENV),
        };

        let display_debug_session = env.parsed(DISPLAY_DEBUG_SESSION_ENV, false)?;
        let log_format = match env.optional(LOG_FORMAT_ENV) {
            Some(value) => value.parse().map_err(|e| invalid(LOG_FORMAT_ENV, e))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            storage_paths,
            aes_key_path,
            tee_provider,
            session_storage,
            sps_credentials,
            services,
            scone_attestation,
            display_debug_session,
            log_format,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::Missing(name.to_string()))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(value) => value.parse().map_err(|e| invalid(name, e)),
            None => Ok(default),
        }
    }

    fn url(&self, name: &str) -> Result<String, ConfigError> {
        let value = self.required(name)?;
        url::Url::parse(&value).map_err(|e| invalid(name, e))?;
        Ok(value)
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.optional(name)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn stage(&self, prefix: &str) -> Result<TeeAppProperties, ConfigError> {
        Ok(TeeAppProperties {
            image: self.required(&format!("{prefix}_IMAGE"))?,
            fingerprint: self.required(&format!("{prefix}_FINGERPRINT"))?,
            entrypoint: self.required(&format!("{prefix}_ENTRYPOINT"))?,
            heap_size: self.parsed(&format!("{prefix}_HEAP_SIZE"), DEFAULT_HEAP_SIZE)?,
        })
    }
}
