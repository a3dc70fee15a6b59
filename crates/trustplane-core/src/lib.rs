// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Trust-management core for a confidential-computing cluster coordinator.
//!
//! The crate is transport-free: it provides the content-addressed manifest
//! [`history`], the deterministic [`seed_engine`], the certificate authority
//! in [`ca`], and the attestation reference-value checks in [`attestation`].
//! The daemon crate composes these behind the gRPC surface.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod attestation;
pub mod ca;
pub mod error;
pub mod history;
pub mod manifest;
pub mod seed_engine;
pub mod seedshare;
pub mod store;
pub mod transition;

pub use error::{TrustPlaneError, TrustPlaneResult};

pub type Hash32 = [u8; 32];

/// `SHA256(payload)` as a fixed array.
#[must_use]
pub fn sha256(payload: &[u8]) -> Hash32 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(payload);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Parses a 64-character hex digest into a [`Hash32`].
pub fn parse_hash(hex_str: &str) -> TrustPlaneResult<Hash32> {
    let bytes = hex::decode(hex_str)
        .map_err(|_| TrustPlaneError::InvalidArgument(format!("not a hex digest: {hex_str:?}")))?;
    let mut out = [0u8; 32];
    if bytes.len() != out.len() {
        return Err(TrustPlaneError::InvalidArgument(format!(
            "digest must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    out.copy_from_slice(&bytes);
    Ok(out)
}
