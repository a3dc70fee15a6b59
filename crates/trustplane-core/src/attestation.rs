// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Attestation report evaluation against manifest reference values.
//!
//! Reports arrive as structured claims already authenticated by the
//! platform verifier; this module decides whether the claims satisfy the
//! current manifest. One [`Validator`] exists per reference-value entry
//! and acceptance is any-match. Every rejection is a `PermissionDenied`
//! with the failing check named, because callers surface these verbatim
//! to operators debugging an enrollment.

use serde::{Deserialize, Serialize};

use crate::error::{TrustPlaneError, TrustPlaneResult};
use crate::manifest::{ReferenceValue, ReferenceValues};
use crate::Hash32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeeType {
    Snp,
    Tdx,
}

/// Claims extracted from a platform attestation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Report {
    pub tee: TeeType,
    /// Hex launch measurement.
    pub measurement: String,
    /// Hex SHA-256 of the workload's launch policy; selects the manifest
    /// policy entry.
    pub host_data: String,
    /// Hex caller-chosen binding, conventionally the SHA-256 of the
    /// public key the report vouches for.
    pub report_data: String,
    pub tcb_svn: u64,
    #[serde(default)]
    pub debug_enabled: bool,
}

impl Report {
    pub fn from_json(bytes: &[u8]) -> TrustPlaneResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| TrustPlaneError::InvalidArgument(format!("attestation report: {err}")))
    }

    pub fn to_json(&self) -> TrustPlaneResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|err| TrustPlaneError::Internal(format!("attestation report: {err}")))
    }

    /// The launch-policy hash as a fixed array.
    pub fn host_data_hash(&self) -> TrustPlaneResult<Hash32> {
        let bytes = hex::decode(&self.host_data).map_err(|_| {
            TrustPlaneError::InvalidArgument("host_data must be hex".to_string())
        })?;
        let mut out = [0u8; 32];
        if bytes.len() != out.len() {
            return Err(TrustPlaneError::InvalidArgument(format!(
                "host_data must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Claim bytes embedded into issued certificates, so relying parties
    /// can audit the attested identity behind a leaf.
    pub fn claims_to_cert_extension(&self) -> TrustPlaneResult<Vec<u8>> {
        self.to_json()
    }

    fn check_binding(&self, expected_report_data: &[u8]) -> TrustPlaneResult<()> {
        let bound = hex::decode(&self.report_data)
            .map(|decoded| decoded == expected_report_data)
            .unwrap_or(false);
        if !bound {
            return Err(TrustPlaneError::PermissionDenied(
                "report_data does not bind the presented key".to_string(),
            ));
        }
        Ok(())
    }
}

/// One acceptance rule for a report.
pub trait Validator: Send + Sync {
    fn validate(&self, report: &Report, expected_report_data: &[u8]) -> TrustPlaneResult<()>;
}

/// Accepts reports matching a single manifest reference-value entry.
pub struct ReferenceValueValidator {
    tee: TeeType,
    reference: ReferenceValue,
}

impl Validator for ReferenceValueValidator {
    fn validate(&self, report: &Report, expected_report_data: &[u8]) -> TrustPlaneResult<()> {
        report.check_binding(expected_report_data)?;
        if report.tee != self.tee {
            return Err(TrustPlaneError::PermissionDenied(format!(
                "report is for a different TEE than reference value ({:?})",
                self.tee
            )));
        }
        if !self
            .reference
            .trusted_measurement
            .eq_ignore_ascii_case(&report.measurement)
        {
            return Err(TrustPlaneError::PermissionDenied(format!(
                "measurement {} not in reference values",
                report.measurement
            )));
        }
        if report.tcb_svn < self.reference.minimum_tcb_svn {
            return Err(TrustPlaneError::PermissionDenied(format!(
                "tcb svn {} below minimum {}",
                report.tcb_svn, self.reference.minimum_tcb_svn
            )));
        }
        if report.debug_enabled && !self.reference.allow_debug {
            return Err(TrustPlaneError::PermissionDenied(
                "debug-enabled launch not permitted".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fallback used only when a manifest configures no reference values:
/// accepts any report that still binds the presented key.
pub struct InsecureValidator;

impl Validator for InsecureValidator {
    fn validate(&self, report: &Report, expected_report_data: &[u8]) -> TrustPlaneResult<()> {
        report.check_binding(expected_report_data)
    }
}

/// One validator per reference-value entry per TEE type; the insecure
/// fallback only when the manifest lists none at all.
#[must_use]
pub fn validators_for(reference_values: &ReferenceValues) -> Vec<Box<dyn Validator>> {
    if reference_values.is_empty() {
        return vec![Box::new(InsecureValidator)];
    }
    let mut validators: Vec<Box<dyn Validator>> = Vec::new();
    for reference in &reference_values.snp {
        validators.push(Box::new(ReferenceValueValidator {
            tee: TeeType::Snp,
            reference: reference.clone(),
        }));
    }
    for reference in &reference_values.tdx {
        validators.push(Box::new(ReferenceValueValidator {
            tee: TeeType::Tdx,
            reference: reference.clone(),
        }));
    }
    validators
}

/// Any-match acceptance: the first validator that accepts wins; the last
/// rejection is reported otherwise.
pub fn validate_any(
    validators: &[Box<dyn Validator>],
    report: &Report,
    expected_report_data: &[u8],
) -> TrustPlaneResult<()> {
    let mut last_err = TrustPlaneError::PermissionDenied(
        "no attestation validators configured".to_string(),
    );
    for validator in validators {
        match validator.validate(report, expected_report_data) {
            Ok(()) => return Ok(()),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}
