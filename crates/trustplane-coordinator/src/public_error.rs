// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lossless error transport over gRPC.
//!
//! gRPC codes alone cannot distinguish the precondition sentinels
//! (`NoManifest` vs `NeedsRecovery`), so a stable code string rides in
//! response metadata and the client side maps it back first.

use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

use trustplane_core::TrustPlaneError;

pub const ERROR_CODE_METADATA_KEY: &str = "x-trustplane-error-code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireErrorCode {
    InvalidArgument,
    NotFound,
    HashMismatch,
    InvalidSignature,
    Conflict,
    PermissionDenied,
    NoManifest,
    NeedsRecovery,
    Internal,
}

impl WireErrorCode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::HashMismatch => "HASH_MISMATCH",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Conflict => "CONFLICT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NoManifest => "NO_MANIFEST",
            Self::NeedsRecovery => "NEEDS_RECOVERY",
            Self::Internal => "INTERNAL",
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "NOT_FOUND" => Self::NotFound,
            "HASH_MISMATCH" => Self::HashMismatch,
            "INVALID_SIGNATURE" => Self::InvalidSignature,
            "CONFLICT" => Self::Conflict,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "NO_MANIFEST" => Self::NoManifest,
            "NEEDS_RECOVERY" => Self::NeedsRecovery,
            "INTERNAL" => Self::Internal,
            _ => return None,
        })
    }
}

fn classify(err: &TrustPlaneError) -> (Code, WireErrorCode) {
    match err {
        TrustPlaneError::InvalidArgument(_) => (Code::InvalidArgument, WireErrorCode::InvalidArgument),
        TrustPlaneError::NotFound(_) => (Code::NotFound, WireErrorCode::NotFound),
        TrustPlaneError::HashMismatch { .. } => (Code::DataLoss, WireErrorCode::HashMismatch),
        TrustPlaneError::InvalidSignature => (Code::DataLoss, WireErrorCode::InvalidSignature),
        TrustPlaneError::CasConflict => (Code::Aborted, WireErrorCode::Conflict),
        TrustPlaneError::PermissionDenied(_) => (Code::PermissionDenied, WireErrorCode::PermissionDenied),
        TrustPlaneError::NoManifest => (Code::FailedPrecondition, WireErrorCode::NoManifest),
        TrustPlaneError::NeedsRecovery => (Code::FailedPrecondition, WireErrorCode::NeedsRecovery),
        TrustPlaneError::Internal(_) => (Code::Internal, WireErrorCode::Internal),
    }
}

pub fn error_to_status(err: &TrustPlaneError) -> Status {
    let (code, wire_code) = classify(err);
    let mut status = Status::new(code, err.to_string());
    status.metadata_mut().insert(
        ERROR_CODE_METADATA_KEY,
        MetadataValue::from_static(wire_code.as_str()),
    );
    status
}

/// Client side: recovers the domain error from a status, preferring the
/// metadata code over the coarse gRPC one.
pub fn status_to_error(status: &Status) -> TrustPlaneError {
    let wire_code = status
        .metadata()
        .get(ERROR_CODE_METADATA_KEY)
        .and_then(|value| value.to_str().ok())
        .and_then(WireErrorCode::from_str);
    let message = status.message().to_string();
    match wire_code {
        Some(WireErrorCode::InvalidArgument) => TrustPlaneError::InvalidArgument(message),
        Some(WireErrorCode::NotFound) => TrustPlaneError::NotFound(message),
        Some(WireErrorCode::HashMismatch) => TrustPlaneError::HashMismatch {
            expected: String::new(),
            actual: message,
        },
        Some(WireErrorCode::InvalidSignature) => TrustPlaneError::InvalidSignature,
        Some(WireErrorCode::Conflict) => TrustPlaneError::CasConflict,
        Some(WireErrorCode::PermissionDenied) => TrustPlaneError::PermissionDenied(message),
        Some(WireErrorCode::NoManifest) => TrustPlaneError::NoManifest,
        Some(WireErrorCode::NeedsRecovery) => TrustPlaneError::NeedsRecovery,
        Some(WireErrorCode::Internal) => TrustPlaneError::Internal(message),
        None => match status.code() {
            Code::InvalidArgument => TrustPlaneError::InvalidArgument(message),
            Code::NotFound => TrustPlaneError::NotFound(message),
            Code::Aborted => TrustPlaneError::CasConflict,
            Code::PermissionDenied | Code::Unauthenticated => {
                TrustPlaneError::PermissionDenied(message)
            }
            Code::FailedPrecondition => TrustPlaneError::NeedsRecovery,
            _ => TrustPlaneError::Internal(message),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_every_variant() {
        let errors = vec![
            TrustPlaneError::InvalidArgument("bad".into()),
            TrustPlaneError::NotFound("x".into()),
            TrustPlaneError::HashMismatch {
                expected: "aa".into(),
                actual: "bb".into(),
            },
            TrustPlaneError::InvalidSignature,
            TrustPlaneError::CasConflict,
            TrustPlaneError::PermissionDenied("no".into()),
            TrustPlaneError::NoManifest,
            TrustPlaneError::NeedsRecovery,
            TrustPlaneError::Internal("boom".into()),
        ];
        for err in errors {
            let status = error_to_status(&err);
            let back = status_to_error(&status);
            assert_eq!(
                std::mem::discriminant(&back),
                std::mem::discriminant(&err),
                "{err}"
            );
        }
    }

    #[test]
    fn precondition_sentinels_stay_distinct() {
        let no_manifest = error_to_status(&TrustPlaneError::NoManifest);
        let needs_recovery = error_to_status(&TrustPlaneError::NeedsRecovery);
        assert_eq!(no_manifest.code(), Code::FailedPrecondition);
        assert_eq!(needs_recovery.code(), Code::FailedPrecondition);
        assert!(matches!(
            status_to_error(&no_manifest),
            TrustPlaneError::NoManifest
        ));
        assert!(matches!(
            status_to_error(&needs_recovery),
            TrustPlaneError::NeedsRecovery
        ));
    }

    #[test]
    fn foreign_status_maps_by_grpc_code() {
        let status = Status::new(Code::Aborted, "raced");
        assert!(matches!(
            status_to_error(&status),
            TrustPlaneError::CasConflict
        ));
        let status = Status::new(Code::Unavailable, "down");
        assert!(status_to_error(&status).is_retryable());
    }
}
