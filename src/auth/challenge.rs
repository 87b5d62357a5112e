// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic challenges signed by clients before a secret write.
//!
//! ```text
//! challenge = keccak256( keccak256("IEXEC_SMS_DOMAIN") || part_1 || ... || part_n )
//! ```
//!
//! Address parts contribute their 20 raw bytes, text parts contribute
//! `keccak256(text)`. The same request parameters always yield the same
//! challenge; changing any parameter changes it.

use alloy::primitives::{keccak256, B256};

use crate::blockchain::parse_address;
use crate::error::{SmsError, SmsResult};

/// Domain separator shared with client tooling.
pub const DOMAIN: &str = "IEXEC_SMS_DOMAIN";

/// One component of a challenge.
#[derive(Debug, Clone, Copy)]
pub enum ChallengePart<'a> {
    Address(&'a str),
    Text(&'a str),
}

/// Hash `parts` under the domain separator. Returns the 0x-hex challenge.
///
/// Fails with a validation error if an address part is malformed.
pub fn build_challenge(parts: &[ChallengePart<'_>]) -> SmsResult<String> {
    let mut message = Vec::with_capacity(32 * (parts.len() + 1));
    message.extend_from_slice(keccak256(DOMAIN.as_bytes()).as_slice());
    for part in parts {
        match part {
            ChallengePart::Address(raw) => {
                let address = parse_address(raw)
                    .ok_or_else(|| SmsError::validation(format!("invalid address: {raw}")))?;
                message.extend_from_slice(address.as_slice());
            }
            ChallengePart::Text(text) => {
                message.extend_from_slice(keccak256(text.as_bytes()).as_slice());
            }
        }
    }
    Ok(to_hex(keccak256(&message)))
}

fn to_hex(hash: B256) -> String {
    format!("0x{}", alloy::hex::encode(hash))
}

// ========== Per-operation Challenges ==========

pub fn web3_secret_challenge(secret_address: &str, secret_value: &str) -> SmsResult<String> {
    build_challenge(&[
        ChallengePart::Address(secret_address),
        ChallengePart::Text(secret_value),
    ])
}

pub fn web2_secret_challenge(
    owner_address: &str,
    secret_name: &str,
    secret_value: &str,
) -> SmsResult<String> {
    build_challenge(&[
        ChallengePart::Address(owner_address),
        ChallengePart::Text(secret_name),
        ChallengePart::Text(secret_value),
    ])
}

pub fn app_developer_compute_secret_challenge(
    app_address: &str,
    secret_index: u64,
    secret_value: &str,
) -> SmsResult<String> {
    build_challenge(&[
        ChallengePart::Address(app_address),
        ChallengePart::Text(&secret_index.to_string()),
        ChallengePart::Text(secret_value),
    ])
}

pub fn requester_compute_secret_challenge(
    requester_address: &str,
    app_address: &str,
    secret_index: u64,
    secret_value: &str,
) -> SmsResult<String> {
    build_challenge(&[
        ChallengePart::Address(requester_address),
        ChallengePart::Address(app_address),
        ChallengePart::Text(&secret_index.to_string()),
        ChallengePart::Text(secret_value),
    ])
}

pub fn requester_named_compute_secret_challenge(
    requester_address: &str,
    secret_key: &str,
    secret_value: &str,
) -> SmsResult<String> {
    build_challenge(&[
        ChallengePart::Address(requester_address),
        ChallengePart::Text(secret_key),
        ChallengePart::Text(secret_value),
    ])
}

pub fn requester_secret_count_challenge(app_address: &str, count: i64) -> SmsResult<String> {
    build_challenge(&[
        ChallengePart::Address(app_address),
        ChallengePart::Text(&count.to_string()),
    ])
}
