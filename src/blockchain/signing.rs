// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! secp256k1 helpers: enclave credential generation and signature recovery.
//!
//! Signatures exchanged with clients are Ethereum personal-sign (EIP-191)
//! signatures over raw 32-byte hashes, hex-encoded as `r || s || v`.

use std::fmt;

use alloy::primitives::{keccak256, Address, Signature, B256};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use serde::{Deserialize, Serialize};

/// Ethereum key pair handed to an enclave for one task.
///
/// Key fields are never serialized outward and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumCredentials {
    /// 0x-prefixed lower-case address derived from the public key.
    pub address: String,
    /// 0x-prefixed 32-byte private key.
    #[serde(skip_serializing, default)]
    pub private_key: String,
    /// 0x-prefixed uncompressed public key without the SEC1 tag byte.
    #[serde(skip_serializing, default)]
    pub public_key: String,
}

impl fmt::Debug for EthereumCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthereumCredentials")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Generate a fresh secp256k1 key pair from the OS RNG.
pub fn generate_credentials() -> EthereumCredentials {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    let public_key_uncompressed = verifying_key.to_encoded_point(false);
    let public_key_bytes = &public_key_uncompressed.as_bytes()[1..];
    let hash = keccak256(public_key_bytes);
    let address_bytes = &hash[12..];

    EthereumCredentials {
        address: format!("0x{}", alloy::hex::encode(address_bytes)),
        private_key: format!("0x{}", alloy::hex::encode(signing_key.to_bytes())),
        public_key: format!("0x{}", alloy::hex::encode(public_key_bytes)),
    }
}

/// Parse a 0x-prefixed (or bare) hex address.
pub fn parse_address(raw: &str) -> Option<Address> {
    raw.trim().parse().ok()
}

/// Parse a 0x-prefixed (or bare) 32-byte hex value.
pub fn parse_b256(raw: &str) -> Option<B256> {
    raw.trim().parse().ok()
}

/// Address that produced a personal-sign `signature` over `message`.
///
/// Any malformed input yields `None`.
pub fn recover_personal_signer(message: &[u8], signature: &str) -> Option<Address> {
    let bytes = alloy::hex::decode(signature.trim()).ok()?;
    let signature = Signature::try_from(bytes.as_slice()).ok()?;
    signature.recover_address_from_msg(message).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{address_of, random_signer, sign_challenge};
    use alloy::signers::local::PrivateKeySigner;

    #[test]
    fn generated_address_matches_private_key() {
        let credentials = generate_credentials();

        let signer: PrivateKeySigner = credentials.private_key.parse().unwrap();
        assert_eq!(address_of(&signer), credentials.address);
        assert_eq!(credentials.address.len(), 42);
        assert_eq!(credentials.private_key.len(), 66);
        assert_eq!(credentials.public_key.len(), 2 + 128);
    }

    #[test]
    fn generated_credentials_are_unique() {
        assert_ne!(generate_credentials().address, generate_credentials().address);
    }

    #[test]
    fn serialization_omits_key_material() {
        let credentials = generate_credentials();
        let json = serde_json::to_string(&credentials).unwrap();
        assert!(json.contains(&credentials.address));
        assert!(!json.contains("private_key"));
        assert!(!json.contains("public_key"));

        let debug = format!("{credentials:?}");
        assert!(!debug.contains(&credentials.private_key[2..]));
    }

    #[test]
    fn recovers_personal_sign_signer() {
        let signer = random_signer();
        let challenge = format!("0x{}", alloy::hex::encode(keccak256(b"challenge")));
        let signature = sign_challenge(&signer, &challenge);

        let message = alloy::hex::decode(&challenge).unwrap();
        let recovered = recover_personal_signer(&message, &signature).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn malformed_signature_fails_closed() {
        assert!(recover_personal_signer(b"msg", "0xzz").is_none());
        assert!(recover_personal_signer(b"msg", "0x1234").is_none());
        assert!(recover_personal_signer(b"msg", "").is_none());
    }
}
