// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider dispatch. The set of enclave technologies is closed and chosen
//! once at bootstrap from `TEE_PROVIDER`.

use super::base::SecretSessionBase;
use super::gramine::GramineSessionHandler;
use super::scone::SconeSessionHandler;
use super::SessionGenerationError;
use crate::tee::task::TeeSessionRequest;
use crate::tee::workflow::TeeProvider;

pub enum TeeSessionHandler {
    Scone(SconeSessionHandler),
    Gramine(GramineSessionHandler),
}

impl TeeSessionHandler {
    pub fn provider(&self) -> TeeProvider {
        match self {
            Self::Scone(_) => TeeProvider::Scone,
            Self::Gramine(_) => TeeProvider::Gramine,
        }
    }

    /// Render the session for this provider and post it. Returns the URL
    /// enclaves use to fetch their session.
    pub async fn build_and_post_session(
        &self,
        request: &TeeSessionRequest,
        base: SecretSessionBase,
    ) -> Result<String, SessionGenerationError> {
        match self {
            Self::Scone(handler) => handler.build_and_post_session(request, base).await,
            Self::Gramine(handler) => handler.build_and_post_session(request, base).await,
        }
    }
}
