// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! The declarative policy object governing a coordinator lineage.
//!
//! A manifest is immutable once content-addressed; "updating" always means
//! writing a new manifest plus a transition linking to the previous one.
//! The verbatim JSON bytes are preserved wherever a manifest travels so
//! hashing and signing stay byte-exact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{TrustPlaneError, TrustPlaneResult};
use crate::{sha256, Hash32};

/// Role a workload may hold in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    None,
    Coordinator,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyEntry {
    /// DNS names placed in certificates issued to this workload, in order.
    #[serde(default)]
    pub sans: Vec<String>,
    #[serde(default)]
    pub role: Role,
    /// Opaque identifier for the workload's stable derived secret; empty
    /// means no secret is provisioned.
    #[serde(default)]
    pub workload_secret_id: String,
}

/// Attestation reference values for one accepted launch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceValue {
    /// Hex-encoded trusted launch measurement.
    pub trusted_measurement: String,
    #[serde(default)]
    pub minimum_tcb_svn: u64,
    #[serde(default)]
    pub allow_debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceValues {
    #[serde(default)]
    pub snp: Vec<ReferenceValue>,
    #[serde(default)]
    pub tdx: Vec<ReferenceValue>,
}

impl ReferenceValues {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snp.is_empty() && self.tdx.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Maps hex SHA-256 of a workload's launch policy to its entry.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyEntry>,
    /// SHA-256 digests (hex) of PKIX/SPKI-encoded owner public keys
    /// authorized to submit manifest updates. Empty means updates are
    /// permanently disabled for this lineage (one-way lock).
    #[serde(default)]
    pub workload_owner_key_digests: Vec<String>,
    /// Hex PKIX/SPKI-encoded RSA public keys that receive encrypted seed
    /// shares at bootstrap.
    #[serde(default)]
    pub seedshare_owner_pub_keys: Vec<String>,
    #[serde(default)]
    pub reference_values: ReferenceValues,
}

fn is_hex_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

impl Manifest {
    /// Parses and validates a candidate manifest. The caller keeps the
    /// verbatim bytes; this function never re-serializes.
    pub fn from_bytes(bytes: &[u8]) -> TrustPlaneResult<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|err| TrustPlaneError::InvalidArgument(format!("manifest: {err}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> TrustPlaneResult<()> {
        for policy_hash in self.policies.keys() {
            if !is_hex_digest(policy_hash) {
                return Err(TrustPlaneError::InvalidArgument(format!(
                    "policy hash must be 64-char hex: {policy_hash:?}"
                )));
            }
        }
        for digest in &self.workload_owner_key_digests {
            if !is_hex_digest(digest) {
                return Err(TrustPlaneError::InvalidArgument(format!(
                    "workload owner key digest must be 64-char hex: {digest:?}"
                )));
            }
        }
        for key in &self.seedshare_owner_pub_keys {
            if key.is_empty() || hex::decode(key).is_err() {
                return Err(TrustPlaneError::InvalidArgument(
                    "seedshare owner key must be non-empty hex".to_string(),
                ));
            }
        }
        for reference in self
            .reference_values
            .snp
            .iter()
            .chain(self.reference_values.tdx.iter())
        {
            let measurement = &reference.trusted_measurement;
            if measurement.is_empty()
                || measurement.len() % 2 != 0
                || !measurement.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(TrustPlaneError::InvalidArgument(format!(
                    "trusted measurement must be hex: {measurement:?}"
                )));
            }
        }
        Ok(())
    }

    /// Looks up the policy entry for an attested launch-policy hash.
    #[must_use]
    pub fn policy_for(&self, host_data: &Hash32) -> Option<&PolicyEntry> {
        self.policies.get(&hex::encode(host_data))
    }

    /// True if the given owner-key digest may submit a manifest update.
    #[must_use]
    pub fn allows_update_from(&self, key_digest_hex: &str) -> bool {
        self.workload_owner_key_digests
            .iter()
            .any(|digest| digest == key_digest_hex)
    }

    #[must_use]
    pub fn updates_disabled(&self) -> bool {
        self.workload_owner_key_digests.is_empty()
    }
}

/// Digest used to identify workload owners: hex SHA-256 over the
/// PKIX/SPKI DER encoding of their public key.
#[must_use]
pub fn owner_key_digest(spki_der: &[u8]) -> String {
    hex::encode(sha256(spki_der))
}
