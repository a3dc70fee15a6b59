// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![forbid(unsafe_code)]

pub mod pb {
    pub mod v1 {
        tonic::include_proto!("trustplane.v1");
    }

    pub use v1::*;
}

pub const PROTOCOL_SEMVER: &str = "1.0.0";

/// Metadata key carrying the caller's attestation report on `MeshApi`
/// calls: base64 of the report's JSON claims.
pub const REPORT_METADATA_KEY: &str = "x-trustplane-report";

/// Domain prefix for binding a public key into a report's `report_data`.
pub const DOMAIN_REPORT_BINDING_V1: &[u8] = b"trustplane:report_binding:v1";

/// Returns `SHA256(domain || payload)`.
///
/// Shared by coordinator and clients when computing report bindings. Do
/// not modify without a coordinated protocol version bump.
#[must_use]
pub fn sha256_domain(domain: &[u8], payload: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(payload);

    let digest = hasher.finalize();
    let mut out = [0_u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// The `report_data` a caller must present when its report vouches for
/// `public_key` (SEC1 or SPKI DER bytes, whichever the RPC names).
#[must_use]
pub fn report_binding(public_key: &[u8]) -> [u8; 32] {
    sha256_domain(DOMAIN_REPORT_BINDING_V1, public_key)
}
