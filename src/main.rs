// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use enclave_sms::blockchain::InMemoryChainDirectory;
use enclave_sms::config::SmsConfig;
use enclave_sms::state::AppState;
use enclave_sms::telemetry::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match SmsConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(config.log_format) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    // Ownership and task facts are supplied by the embedding service through
    // `ChainDirectory`. Standalone, the directory starts empty, so every
    // owner-signed write and every key release is refused.
    let chain = Arc::new(InMemoryChainDirectory::new());
    tracing::warn!("Chain directory is empty; owner-signed writes and key releases are refused");
    let state = match AppState::bootstrap(&config, chain) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        provider = %state.workflow.provider,
        session_storage = %config.session_storage.url,
        "Enclave SMS ready"
    );

    match state.stored_counts() {
        Ok(counts) => tracing::info!(
            web3_secrets = counts.web3_secrets,
            web2_owners = counts.web2_owners,
            compute_secrets = counts.compute_secrets,
            tee_challenges = counts.tee_challenges,
            "Stored records"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to count stored records"),
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return ExitCode::FAILURE;
    }
    tracing::info!("Shutting down");
    ExitCode::SUCCESS
}
