// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Peer-assisted recovery: a restarted coordinator fetches the seed from
//! an operational peer instead of waiting for a seedshare owner.
//!
//! The seed travels encrypted to an ephemeral RSA key generated for this
//! one attempt; the peer releases it only after verifying the caller's
//! attestation report binds that key.

use std::sync::Arc;

use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tonic::Request;

use trustplane_core::attestation::Report;
use trustplane_core::seedshare::{decrypt_seed_share, SeedShare};
use trustplane_core::{TrustPlaneError, TrustPlaneResult};
use trustplane_protocol::pb;
use trustplane_protocol::pb::mesh_api_client::MeshApiClient;
use trustplane_protocol::REPORT_METADATA_KEY;

use crate::authority::{Authority, State};
use crate::credentials::encode_report;
use crate::retry::{retry, RetryPolicy};

const RECOVERY_RSA_BITS: usize = 2048;

/// Tries each peer in order until one hands over the seed. `issue_report`
/// produces the caller's attestation report binding the given key bytes.
pub async fn recover_from_peers<F>(
    authority: &Authority,
    peers: &[String],
    policy: &RetryPolicy,
    issue_report: F,
) -> TrustPlaneResult<Arc<State>>
where
    F: Fn(&[u8]) -> TrustPlaneResult<Report>,
{
    if peers.is_empty() {
        return Err(TrustPlaneError::InvalidArgument(
            "no peers configured for recovery".to_string(),
        ));
    }

    let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, RECOVERY_RSA_BITS)
        .map_err(|err| TrustPlaneError::Internal(format!("recovery key generation: {err}")))?;
    let spki = RsaPublicKey::from(&private_key)
        .to_public_key_der()
        .map_err(|err| TrustPlaneError::Internal(format!("recovery key encoding: {err}")))?
        .into_vec();
    let report = issue_report(&spki)?;
    let report_value = encode_report(&report)?;

    let mut last_err = TrustPlaneError::Internal("no peers answered".to_string());
    for peer in peers {
        let endpoint = normalize_endpoint(peer);
        let attempt = retry(
            policy,
            || {
                let endpoint = endpoint.clone();
                let report_value = report_value.clone();
                let spki = spki.clone();
                async move {
                    let mut client = MeshApiClient::connect(endpoint).await.map_err(|err| {
                        TrustPlaneError::Internal(format!("peer dial: {err}"))
                    })?;
                    let mut request = Request::new(pb::PeerRecoverRequest {
                        recovery_public_key: spki,
                    });
                    request
                        .metadata_mut()
                        .insert(REPORT_METADATA_KEY, report_value);
                    client
                        .recover(request)
                        .await
                        .map(|response| response.into_inner())
                        .map_err(|status| crate::public_error::status_to_error(&status))
                }
            },
            TrustPlaneError::is_retryable,
        )
        .await;

        match attempt {
            Ok(response) => {
                let seed = decrypt_seed_share(
                    &private_key,
                    &SeedShare {
                        public_key_hex: hex::encode(&spki),
                        encrypted_seed: response.encrypted_seed,
                    },
                )?;
                let state = authority.recover(&seed, &response.salt)?;
                tracing::info!(peer, generation = state.generation, "recovered from peer");
                return Ok(state);
            }
            Err(err) => {
                tracing::warn!(peer, %err, "peer recovery attempt failed");
                last_err = err;
            }
        }
    }
    Err(last_err)
}

fn normalize_endpoint(peer: &str) -> String {
    if peer.starts_with("http://") || peer.starts_with("https://") {
        peer.to_string()
    } else {
        format!("http://{peer}")
    }
}
