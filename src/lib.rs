// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enclave SMS - Secret Management Service for TEE task execution
//!
//! Stores encrypted secrets on behalf of dataset owners, application
//! developers and requesters, and releases them only to enclaves running a
//! task the workerpool has authorized.
//!
//! ## Modules
//!
//! - `auth` - Signed-challenge checks for secret writes and key release
//! - `blockchain` - On-chain ownership and task lookups, signer recovery
//! - `secret` - Web3, Web2 and compute secret stores
//! - `storage` - redb-backed persistence
//! - `tee` - Enclave challenges and Scone/Gramine session generation

pub mod auth;
pub mod blockchain;
pub mod config;
pub mod encryption;
pub mod error;
pub mod secret;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod tee;

#[cfg(test)]
mod test_support;
