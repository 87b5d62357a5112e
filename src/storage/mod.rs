// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage Module
//!
//! All service state lives in a single redb database under the data root.
//! Under Gramine the data root is mounted as an encrypted filesystem; on top
//! of that, every secret value and challenge private key is encrypted by the
//! [`EncryptionService`](crate::encryption::EncryptionService) before it
//! reaches this layer.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   sms.redb        # Secrets, counters, TEE challenges
//!   keys/
//!     aes.key       # At-rest encryption key (created on first start)
//! ```

pub mod database;
pub mod paths;

pub use database::{
    DbError, DbResult, JsonTable, SmsDatabase, COMPUTE_SECRETS, TEE_CHALLENGES, WEB2_SECRETS,
    WEB3_SECRETS,
};
pub use paths::StoragePaths;
