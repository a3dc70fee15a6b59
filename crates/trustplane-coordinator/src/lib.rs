// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Coordinator daemon for a TrustPlane mesh.
//!
//! Composes the trust-management core behind two gRPC services: `UserApi`
//! for manifest management and operator recovery, `MeshApi` for attested
//! certificate issuance and peer-assisted recovery.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod authority;
pub mod config;
pub mod credentials;
pub mod public_error;
pub mod recovery_client;
pub mod retry;
pub mod server;
pub mod telemetry;
