// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Attestation credentials on the `MeshApi` surface.
//!
//! Callers attach their report as base64 JSON under
//! [`REPORT_METADATA_KEY`]. The report's `report_data` must bind the
//! public key the request presents, which ties the attested identity to
//! the key material being certified or used for seed delivery.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};

use trustplane_core::attestation::{validate_any, validators_for, Report};
use trustplane_core::manifest::{PolicyEntry, Role};
use trustplane_core::{Hash32, TrustPlaneError, TrustPlaneResult};
use trustplane_protocol::{report_binding, REPORT_METADATA_KEY};

use crate::authority::State;

/// Client side: packs a report into the metadata value format.
pub fn encode_report(report: &Report) -> TrustPlaneResult<MetadataValue<Ascii>> {
    let encoded = BASE64.encode(report.to_json()?);
    encoded
        .parse()
        .map_err(|_| TrustPlaneError::Internal("report metadata encoding".to_string()))
}

/// Server side: unpacks the caller's report, if any.
pub fn decode_report(metadata: &MetadataMap) -> TrustPlaneResult<Report> {
    let value = metadata
        .get(REPORT_METADATA_KEY)
        .ok_or_else(|| {
            TrustPlaneError::PermissionDenied("attestation report missing".to_string())
        })?
        .to_str()
        .map_err(|_| {
            TrustPlaneError::InvalidArgument("report metadata is not ascii".to_string())
        })?;
    let json = BASE64.decode(value).map_err(|_| {
        TrustPlaneError::InvalidArgument("report metadata is not base64".to_string())
    })?;
    Report::from_json(&json)
}

/// Admits a mesh caller: the report must satisfy the manifest's reference
/// values, bind `presented_key`, and name a launch policy the manifest
/// knows. Returns that policy entry.
pub fn verify_mesh_caller<'a>(
    state: &'a State,
    report: &Report,
    presented_key: &[u8],
) -> TrustPlaneResult<(&'a PolicyEntry, Hash32)> {
    let validators = validators_for(&state.manifest.reference_values);
    validate_any(&validators, report, &report_binding(presented_key))?;
    let host_data = report.host_data_hash()?;
    let entry = state.manifest.policy_for(&host_data).ok_or_else(|| {
        TrustPlaneError::PermissionDenied(format!(
            "no policy entry for host_data {}",
            hex::encode(host_data)
        ))
    })?;
    Ok((entry, host_data))
}

/// Peer-recovery callers additionally need the coordinator role.
pub fn require_coordinator(entry: &PolicyEntry) -> TrustPlaneResult<()> {
    if entry.role != Role::Coordinator {
        return Err(TrustPlaneError::PermissionDenied(
            "caller's policy entry lacks the coordinator role".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustplane_core::attestation::TeeType;

    fn report() -> Report {
        Report {
            tee: TeeType::Snp,
            measurement: "ab".repeat(48),
            host_data: "cd".repeat(32),
            report_data: hex::encode(report_binding(b"tls-key")),
            tcb_svn: 3,
            debug_enabled: false,
        }
    }

    #[test]
    fn metadata_roundtrip() {
        let mut metadata = MetadataMap::new();
        metadata.insert(REPORT_METADATA_KEY, encode_report(&report()).unwrap());
        assert_eq!(decode_report(&metadata).unwrap(), report());
    }

    #[test]
    fn missing_report_is_denied() {
        let metadata = MetadataMap::new();
        assert!(matches!(
            decode_report(&metadata),
            Err(TrustPlaneError::PermissionDenied(_))
        ));
    }

    #[test]
    fn garbage_metadata_is_invalid() {
        let mut metadata = MetadataMap::new();
        metadata.insert(REPORT_METADATA_KEY, "!!!not-base64".parse().unwrap());
        assert!(matches!(
            decode_report(&metadata),
            Err(TrustPlaneError::InvalidArgument(_))
        ));

        let mut metadata = MetadataMap::new();
        metadata.insert(
            REPORT_METADATA_KEY,
            BASE64.encode(b"not json").parse::<MetadataValue<Ascii>>().unwrap(),
        );
        assert!(decode_report(&metadata).is_err());
    }

    #[test]
    fn coordinator_role_gate() {
        let mut entry = PolicyEntry::default();
        assert!(require_coordinator(&entry).is_err());
        entry.role = Role::Coordinator;
        require_coordinator(&entry).expect("coordinator allowed");
    }
}
