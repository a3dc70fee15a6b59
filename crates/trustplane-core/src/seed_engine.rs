// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic key hierarchy rooted in a single secret seed.
//!
//! Every long-lived secret the coordinator holds is an HKDF-SHA256
//! derivation of the seed, so recovering the seed recovers the entire
//! identity: the transaction-signing key, the root CA key, and all
//! workload secrets. Nothing derived here is ever persisted.

use hkdf::Hkdf;
use p384::ecdsa::{SigningKey, VerifyingKey};
use p384::SecretKey;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{TrustPlaneError, TrustPlaneResult};

const POD_STATE_INFO: &[u8] = b"POD STATE SECRET";
const HISTORY_INFO: &[u8] = b"HISTORY SECRET";
const TRANSACTION_SIGNING_INFO: &[u8] = b"TRANSACTION SIGNING SECRET";
const ROOT_CA_INFO: &[u8] = b"ROOT CA SEED";
const WORKLOAD_SECRET_PREFIX: &str = "WORKLOAD SECRET ID: ";

pub const SALT_LEN: usize = 32;
pub const MIN_SEED_LEN: usize = 32;
pub const WORKLOAD_SECRET_LEN: usize = 32;

/// P-384 scalar width; candidate bytes for rejection sampling.
const SCALAR_LEN: usize = 48;

pub struct SeedEngine {
    pod_state_secret: Zeroizing<Vec<u8>>,
    history_secret: Zeroizing<Vec<u8>>,
    transaction_signing_key: SigningKey,
    root_ca_secret: SecretKey,
}

impl SeedEngine {
    /// Derives the full hierarchy from `seed` and `salt`. The same inputs
    /// always produce the same keys; a different salt yields an unrelated
    /// hierarchy from the same seed.
    pub fn new(seed: &[u8], salt: &[u8]) -> TrustPlaneResult<Self> {
        if salt.len() != SALT_LEN {
            return Err(TrustPlaneError::InvalidArgument(format!(
                "salt must be {SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }
        if seed.len() < MIN_SEED_LEN {
            return Err(TrustPlaneError::InvalidArgument(format!(
                "seed must be at least {MIN_SEED_LEN} bytes, got {}",
                seed.len()
            )));
        }
        let hkdf = Hkdf::<Sha256>::new(Some(salt), seed);

        let mut pod_state_secret = Zeroizing::new(vec![0u8; seed.len()]);
        hkdf.expand(POD_STATE_INFO, &mut pod_state_secret)
            .map_err(|_| TrustPlaneError::Internal("hkdf expand: pod state".to_string()))?;

        let mut history_secret = Zeroizing::new(vec![0u8; seed.len()]);
        hkdf.expand(HISTORY_INFO, &mut history_secret)
            .map_err(|_| TrustPlaneError::Internal("hkdf expand: history".to_string()))?;

        let transaction_signing_key =
            SigningKey::from(&derive_secret_key(&hkdf, TRANSACTION_SIGNING_INFO)?);
        let root_ca_secret = derive_secret_key(&hkdf, ROOT_CA_INFO)?;

        Ok(Self {
            pod_state_secret,
            history_secret,
            transaction_signing_key,
            root_ca_secret,
        })
    }

    /// Key that signs the history head pointer.
    #[must_use]
    pub fn transaction_signing_key(&self) -> &SigningKey {
        &self.transaction_signing_key
    }

    #[must_use]
    pub fn transaction_verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.transaction_signing_key)
    }

    /// Deterministic root CA private key. The mesh CA below it is
    /// generated fresh per state, so only the root survives restarts.
    #[must_use]
    pub fn root_ca_secret(&self) -> &SecretKey {
        &self.root_ca_secret
    }

    #[must_use]
    pub fn history_secret(&self) -> &[u8] {
        &self.history_secret
    }

    /// Stable per-workload secret, delivered to workloads whose policy
    /// entry names a `workload_secret_id`.
    pub fn derive_workload_secret(
        &self,
        secret_id: &str,
    ) -> TrustPlaneResult<Zeroizing<[u8; WORKLOAD_SECRET_LEN]>> {
        if secret_id.is_empty() {
            return Err(TrustPlaneError::InvalidArgument(
                "workload secret id must not be empty".to_string(),
            ));
        }
        let hkdf = Hkdf::<Sha256>::new(None, &self.pod_state_secret);
        let info = format!("{WORKLOAD_SECRET_PREFIX}{secret_id}");
        let mut secret = Zeroizing::new([0u8; WORKLOAD_SECRET_LEN]);
        hkdf.expand(info.as_bytes(), secret.as_mut())
            .map_err(|_| TrustPlaneError::Internal("hkdf expand: workload secret".to_string()))?;
        Ok(secret)
    }
}

/// Rejection-sampled P-384 key: expand counter-suffixed candidates until
/// one lands inside the scalar field. The first candidate is accepted with
/// overwhelming probability; the loop bound exists so a broken RNG-free
/// derivation cannot spin forever.
fn derive_secret_key(hkdf: &Hkdf<Sha256>, info: &[u8]) -> TrustPlaneResult<SecretKey> {
    for counter in 0u8..=255 {
        let mut candidate = Zeroizing::new([0u8; SCALAR_LEN]);
        let mut derivation_info = Vec::with_capacity(info.len() + 1);
        derivation_info.extend_from_slice(info);
        derivation_info.push(counter);
        hkdf.expand(&derivation_info, candidate.as_mut())
            .map_err(|_| TrustPlaneError::Internal("hkdf expand: key candidate".to_string()))?;
        if let Ok(secret) = SecretKey::from_slice(candidate.as_ref()) {
            return Ok(secret);
        }
    }
    Err(TrustPlaneError::Internal(
        "no valid P-384 scalar in 256 candidates".to_string(),
    ))
}
