// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EIP-191 personal-message signatures.
//!
//! A wallet signs `keccak256("\x19Ethereum Signed Message:\n" || len || msg)`.
//! Recovering the public key from the 65-byte `r || s || v` signature and
//! hashing it yields the signer's address:
//!
//! 1. Take the uncompressed public key (65 bytes: 0x04 || x || y)
//! 2. keccak256 the 64 coordinate bytes
//! 3. Keep the last 20 bytes, hex encoded with a `0x` prefix
//!
//! Signatures with `s` in the upper half of the curve order are rejected
//! (EIP-2), so each signature over a message has exactly one valid encoding.

use alloy::primitives::keccak256;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    Hex,

    #[error("signature must be 65 bytes, got {0}")]
    Length(usize),

    #[error("invalid recovery byte {0}")]
    RecoveryByte(u8),

    #[error("malformed signature")]
    Malformed,

    #[error("signature s value is not in the lower half order")]
    HighS,

    #[error("public key recovery failed")]
    Recovery,
}

/// Digest a wallet signs for `personal_sign(message)`.
pub fn personal_message_digest(message: &[u8]) -> [u8; 32] {
    let mut data = format!("{PERSONAL_MESSAGE_PREFIX}{}", message.len()).into_bytes();
    data.extend_from_slice(message);
    keccak256(&data).0
}

/// Lowercase `0x` address of a secp256k1 public key.
pub fn address_from_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", alloy::hex::encode(&hash[12..]))
}

/// Address that produced `signature_hex` over `message`.
///
/// Accepts `v` as 0/1 or 27/28, with or without a `0x` prefix.
pub fn recover_address(message: &[u8], signature_hex: &str) -> Result<String, SignatureError> {
    let bytes = alloy::hex::decode(signature_hex.trim()).map_err(|_| SignatureError::Hex)?;
    if bytes.len() != 65 {
        return Err(SignatureError::Length(bytes.len()));
    }

    let v = bytes[64];
    let parity = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_byte(parity).ok_or(SignatureError::RecoveryByte(v))?;

    let signature = Signature::from_slice(&bytes[..64]).map_err(|_| SignatureError::Malformed)?;
    if signature.normalize_s().is_some() {
        return Err(SignatureError::HighS);
    }

    let digest = personal_message_digest(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| SignatureError::Recovery)?;
    Ok(address_from_key(&key))
}
