// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Transition chain primitives.
//!
//! A [`Transition`] links a manifest to its predecessor transition,
//! forming a hash chain back to genesis. [`LatestTransition`] is the one
//! mutable pointer into that chain, signed with the coordinator's
//! transaction-signing key so a tampered backend cannot redirect it.

use p384::ecdsa::signature::{Signer, Verifier};
use p384::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::error::{TrustPlaneError, TrustPlaneResult};
use crate::{sha256, Hash32};

/// Sentinel predecessor hash marking the first transition of a history.
pub const GENESIS: Hash32 = [0u8; 32];

pub const TRANSITION_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub manifest_hash: Hash32,
    pub previous_transition_hash: Hash32,
}

impl Transition {
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.previous_transition_hash == GENESIS
    }

    /// Fixed 64-byte layout: manifest hash followed by predecessor hash.
    #[must_use]
    pub fn marshal_binary(&self) -> [u8; TRANSITION_LEN] {
        let mut out = [0u8; TRANSITION_LEN];
        out[..32].copy_from_slice(&self.manifest_hash);
        out[32..].copy_from_slice(&self.previous_transition_hash);
        out
    }

    pub fn unmarshal_binary(bytes: &[u8]) -> TrustPlaneResult<Self> {
        if bytes.len() != TRANSITION_LEN {
            return Err(TrustPlaneError::InvalidArgument(format!(
                "transition must be {TRANSITION_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut manifest_hash = [0u8; 32];
        let mut previous = [0u8; 32];
        manifest_hash.copy_from_slice(&bytes[..32]);
        previous.copy_from_slice(&bytes[32..]);
        Ok(Self {
            manifest_hash,
            previous_transition_hash: previous,
        })
    }

    /// Content address of this transition.
    #[must_use]
    pub fn hash(&self) -> Hash32 {
        sha256(&self.marshal_binary())
    }
}

/// The signed head pointer: transition hash plus an ASN.1 DER
/// ECDSA-P384/SHA-384 signature over that hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestTransition {
    pub transition_hash: Hash32,
    signature: Vec<u8>,
}

impl LatestTransition {
    pub fn sign(transition_hash: Hash32, signing_key: &SigningKey) -> Self {
        let signature: Signature = signing_key.sign(&transition_hash);
        Self {
            transition_hash,
            signature: signature.to_der().as_bytes().to_vec(),
        }
    }

    /// Serialized form written to the store: 32-byte hash followed by the
    /// variable-length DER signature.
    #[must_use]
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.signature.len());
        out.extend_from_slice(&self.transition_hash);
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn unmarshal_binary(bytes: &[u8]) -> TrustPlaneResult<Self> {
        if bytes.len() <= 32 {
            return Err(TrustPlaneError::InvalidArgument(format!(
                "latest transition must carry a signature, got {} bytes",
                bytes.len()
            )));
        }
        let mut transition_hash = [0u8; 32];
        transition_hash.copy_from_slice(&bytes[..32]);
        Ok(Self {
            transition_hash,
            signature: bytes[32..].to_vec(),
        })
    }

    pub fn verify(&self, verifying_key: &VerifyingKey) -> TrustPlaneResult<()> {
        let signature = Signature::from_der(&self.signature)
            .map_err(|_| TrustPlaneError::InvalidSignature)?;
        verifying_key
            .verify(&self.transition_hash, &signature)
            .map_err(|_| TrustPlaneError::InvalidSignature)
    }
}
