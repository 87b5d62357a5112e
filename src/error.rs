// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service-level error taxonomy.
//!
//! Every failure surfaced by the secret stores, the provisioning flows and the
//! authorization gate maps onto one [`ErrorKind`]. The outer transport (HTTP,
//! RPC) only has to translate the kind, never the individual variant.
//!
//! Messages never carry secret values or private key material.

use crate::encryption::EncryptionError;
use crate::storage::DbError;

/// Coarse classification shared by all service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-bounds input, detected before any store access.
    Validation,
    /// Signature or authorization check failed.
    Unauthorized,
    /// Write-once record already exists.
    Conflict,
    /// Required record is absent.
    NotFound,
    /// Persistence or remote session storage unavailable.
    StorageTransport,
    /// Anything else (corrupted ciphertext, key material errors).
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("{0}")]
    Validation(String),

    /// Deliberately carries no detail about which check failed.
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),
}

pub type SmsResult<T> = Result<T, SmsError>;

impl SmsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SmsError::Validation(_) => ErrorKind::Validation,
            SmsError::Unauthorized => ErrorKind::Unauthorized,
            SmsError::Conflict(_) => ErrorKind::Conflict,
            SmsError::NotFound(_) => ErrorKind::NotFound,
            SmsError::Storage(_) => ErrorKind::StorageTransport,
            SmsError::Encryption(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::StorageTransport => "STORAGE_UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}
