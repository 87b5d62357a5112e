// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use tempfile::TempDir;

use crate::encryption::EncryptionService;
use crate::storage::SmsDatabase;

/// Temporary database plus encryption key; the directory lives as long as this value.
pub(crate) struct TestStorage {
    pub db: Arc<SmsDatabase>,
    pub encryption: Arc<EncryptionService>,
    _dir: TempDir,
}

pub(crate) fn test_storage() -> TestStorage {
    let dir = tempfile::tempdir().unwrap();
    let db = SmsDatabase::open(&dir.path().join("sms.redb")).unwrap();
    let encryption = EncryptionService::load_or_create(&dir.path().join("aes.key")).unwrap();
    TestStorage {
        db: Arc::new(db),
        encryption: Arc::new(encryption),
        _dir: dir,
    }
}

pub(crate) fn random_signer() -> PrivateKeySigner {
    PrivateKeySigner::from_signing_key(SigningKey::random(&mut OsRng))
}

/// Lower-case 0x address of a fresh random key.
pub(crate) fn random_address() -> String {
    address_of(&random_signer())
}

/// Signer address, lower-case.
pub(crate) fn address_of(signer: &PrivateKeySigner) -> String {
    signer.address().to_string().to_lowercase()
}

/// Personal-sign the raw bytes of a 0x-hex challenge; returns 0x-hex `r||s||v`.
pub(crate) fn sign_challenge(signer: &PrivateKeySigner, challenge: &str) -> String {
    let bytes = alloy::hex::decode(challenge).unwrap();
    let signature = signer.sign_message_sync(&bytes).unwrap();
    format!("0x{}", alloy::hex::encode(signature.as_bytes()))
}
