// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed secret writes, as exposed to dataset owners, app developers and
//! requesters.
//!
//! Every write follows the same order:
//!
//! 1. validate input (size, key format, count sign)
//! 2. verify the signature over the operation's challenge
//! 3. check stored state (requester index against the app cap, write-once)
//! 4. encrypt and store
//!
//! An unsigned request never reads the stores.

use std::sync::Arc;

use crate::auth::challenge::{
    app_developer_compute_secret_challenge, requester_compute_secret_challenge,
    requester_named_compute_secret_challenge, requester_secret_count_challenge,
    web2_secret_challenge, web3_secret_challenge,
};
use crate::auth::AuthorizationService;
use crate::error::{SmsError, SmsResult};

use super::web2::Web2SecretKey;
use super::{
    validate_secret_key, validate_secret_size, SecretOwnerRole, SecretStore,
    TeeTaskComputeSecretCountService, TeeTaskComputeSecretHeader, TeeTaskComputeSecretService,
    Web2SecretService, Web3SecretService,
};

/// Only the first developer secret slot is writable.
pub const APP_DEVELOPER_SECRET_INDEX: u64 = 0;

pub struct SecretProvisioningService {
    authorization: Arc<AuthorizationService>,
    web3: Arc<Web3SecretService>,
    web2: Arc<Web2SecretService>,
    compute: Arc<TeeTaskComputeSecretService>,
    counts: Arc<TeeTaskComputeSecretCountService>,
}

impl SecretProvisioningService {
    pub fn new(
        authorization: Arc<AuthorizationService>,
        web3: Arc<Web3SecretService>,
        web2: Arc<Web2SecretService>,
        compute: Arc<TeeTaskComputeSecretService>,
        counts: Arc<TeeTaskComputeSecretCountService>,
    ) -> Self {
        Self {
            authorization,
            web3,
            web2,
            compute,
            counts,
        }
    }

    // ========== Web3 ==========

    /// Store the key of a dataset. Signed by the dataset's on-chain owner.
    pub fn add_web3_secret(
        &self,
        secret_address: &str,
        secret_value: &str,
        signature: &str,
    ) -> SmsResult<()> {
        validate_secret_size(secret_value)?;
        let challenge = web3_secret_challenge(secret_address, secret_value)?;
        if !self
            .authorization
            .is_signed_by_owner(&challenge, signature, secret_address)
        {
            return Err(SmsError::Unauthorized);
        }
        if self.web3.add_secret(secret_address, secret_value)?.is_none() {
            return Err(SmsError::conflict("secret already exists"));
        }
        Ok(())
    }

    pub fn is_web3_secret_present(&self, secret_address: &str) -> SmsResult<bool> {
        self.web3.exists(secret_address)
    }

    // ========== Web2 ==========

    /// Store a named secret. Signed by the owner itself.
    pub fn add_web2_secret(
        &self,
        owner_address: &str,
        secret_name: &str,
        secret_value: &str,
        signature: &str,
    ) -> SmsResult<()> {
        validate_secret_size(secret_value)?;
        let challenge = web2_secret_challenge(owner_address, secret_name, secret_value)?;
        if !self
            .authorization
            .is_signed_by_himself(&challenge, signature, owner_address)
        {
            return Err(SmsError::Unauthorized);
        }
        let key = Web2SecretKey::new(owner_address, secret_name);
        if self.web2.add_secret(&key, secret_value)?.is_none() {
            return Err(SmsError::conflict("secret already exists"));
        }
        Ok(())
    }

    /// Replace an existing named secret. Signed by the owner itself.
    pub fn update_web2_secret(
        &self,
        owner_address: &str,
        secret_name: &str,
        secret_value: &str,
        signature: &str,
    ) -> SmsResult<()> {
        validate_secret_size(secret_value)?;
        let challenge = web2_secret_challenge(owner_address, secret_name, secret_value)?;
        if !self
            .authorization
            .is_signed_by_himself(&challenge, signature, owner_address)
        {
            return Err(SmsError::Unauthorized);
        }
        let key = Web2SecretKey::new(owner_address, secret_name);
        if self.web2.update_secret(&key, secret_value)?.is_none() {
            return Err(SmsError::not_found("secret not found"));
        }
        Ok(())
    }

    pub fn is_web2_secret_present(&self, owner_address: &str, secret_name: &str) -> SmsResult<bool> {
        self.web2.exists(&Web2SecretKey::new(owner_address, secret_name))
    }

    // ========== Application Developer ==========

    /// Store the developer secret of an app. Signed by the app's on-chain owner.
    pub fn add_app_developer_compute_secret(
        &self,
        app_address: &str,
        secret_value: &str,
        signature: &str,
    ) -> SmsResult<()> {
        validate_secret_size(secret_value)?;
        let challenge = app_developer_compute_secret_challenge(
            app_address,
            APP_DEVELOPER_SECRET_INDEX,
            secret_value,
        )?;
        if !self
            .authorization
            .is_signed_by_owner(&challenge, signature, app_address)
        {
            return Err(SmsError::Unauthorized);
        }
        let header =
            TeeTaskComputeSecretHeader::app_developer(app_address, APP_DEVELOPER_SECRET_INDEX);
        if !self.compute.encrypt_and_save_secret(&header, secret_value)? {
            return Err(SmsError::conflict("secret already exists"));
        }
        Ok(())
    }

    /// `secret_index` is taken as sent by the client and must be a
    /// non-negative integer.
    pub fn is_app_developer_compute_secret_present(
        &self,
        app_address: &str,
        secret_index: &str,
    ) -> SmsResult<bool> {
        let index: u64 = secret_index
            .trim()
            .parse()
            .map_err(|_| SmsError::validation("secret index should be a positive number"))?;
        self.compute
            .is_secret_present(&TeeTaskComputeSecretHeader::app_developer(app_address, index))
    }

    /// Cap the number of requester secrets an app accepts. Signed by the
    /// app's on-chain owner; set once.
    pub fn set_requester_secret_count_for_app(
        &self,
        app_address: &str,
        secret_count: i64,
        signature: &str,
    ) -> SmsResult<()> {
        if secret_count < 0 {
            return Err(SmsError::validation("secret count should be positive"));
        }
        let challenge = requester_secret_count_challenge(app_address, secret_count)?;
        if !self
            .authorization
            .is_signed_by_owner(&challenge, signature, app_address)
        {
            return Err(SmsError::Unauthorized);
        }
        self.counts.set_max_app_compute_secret_count(
            app_address,
            SecretOwnerRole::Requester,
            secret_count,
        )
    }

    // ========== Requester ==========

    /// Store the `secret_index`-th requester secret for an app. The app must
    /// have a requester secret cap and the index must be below it; both are
    /// checked only once the signature holds.
    pub fn add_requester_compute_secret(
        &self,
        requester_address: &str,
        app_address: &str,
        secret_index: u64,
        secret_value: &str,
        signature: &str,
    ) -> SmsResult<()> {
        validate_secret_size(secret_value)?;
        let challenge = requester_compute_secret_challenge(
            requester_address,
            app_address,
            secret_index,
            secret_value,
        )?;
        if !self
            .authorization
            .is_signed_by_himself(&challenge, signature, requester_address)
        {
            return Err(SmsError::Unauthorized);
        }
        // The cap is app state; only signed requests may learn about it.
        let cap = self
            .counts
            .get_max_app_compute_secret_count(app_address, SecretOwnerRole::Requester)?
            .ok_or_else(|| SmsError::not_found("no requester secret count set for app"))?;
        if secret_index >= cap {
            return Err(SmsError::validation(format!(
                "secret index should be lower than {cap}"
            )));
        }
        let header = TeeTaskComputeSecretHeader::requester_for_app(
            app_address,
            requester_address,
            secret_index,
        );
        if !self.compute.encrypt_and_save_secret(&header, secret_value)? {
            return Err(SmsError::conflict("secret already exists"));
        }
        Ok(())
    }

    /// Store a requester secret under a chosen key, usable with any app.
    pub fn add_requester_named_compute_secret(
        &self,
        requester_address: &str,
        secret_key: &str,
        secret_value: &str,
        signature: &str,
    ) -> SmsResult<()> {
        validate_secret_key(secret_key)?;
        validate_secret_size(secret_value)?;
        let challenge =
            requester_named_compute_secret_challenge(requester_address, secret_key, secret_value)?;
        if !self
            .authorization
            .is_signed_by_himself(&challenge, signature, requester_address)
        {
            return Err(SmsError::Unauthorized);
        }
        let header = TeeTaskComputeSecretHeader::requester_named(requester_address, secret_key);
        if !self.compute.encrypt_and_save_secret(&header, secret_value)? {
            return Err(SmsError::conflict("secret already exists"));
        }
        Ok(())
    }

    pub fn is_requester_compute_secret_present(
        &self,
        requester_address: &str,
        secret_key: &str,
    ) -> SmsResult<bool> {
        validate_secret_key(secret_key)?;
        self.compute
            .is_secret_present(&TeeTaskComputeSecretHeader::requester_named(
                requester_address,
                secret_key,
            ))
    }
}
