// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! The authority state machine.
//!
//! An authority instance is in one of four conditions: uninitialized (no
//! history exists), needs-recovery (history exists but the seed is not in
//! memory), stale (the store head moved to a chain that does not descend
//! from the cached state), or operational. Staleness is detected lazily:
//! every read re-verifies the store head and transparently resyncs when
//! the head is a descendant of the cached one.
//!
//! State snapshots are immutable `Arc`s swapped atomically under a mutex,
//! so request handlers always observe one consistent (manifest, CA,
//! engine) triple.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use zeroize::Zeroizing;

use trustplane_core::history::History;
use trustplane_core::manifest::{owner_key_digest, Manifest};
use trustplane_core::seed_engine::{SeedEngine, MIN_SEED_LEN, SALT_LEN};
use trustplane_core::seedshare::{encrypt_seed_shares, SeedShareDocument};
use trustplane_core::store::{Store, Watch};
use trustplane_core::transition::{LatestTransition, Transition, GENESIS};
use trustplane_core::{parse_hash, sha256, Hash32, TrustPlaneError, TrustPlaneResult};

use p384::ecdsa::signature::Verifier;
use p384::ecdsa::{Signature, VerifyingKey};
use p384::pkcs8::DecodePublicKey;

use trustplane_core::ca::Ca;

/// One consistent snapshot of the authority. Cheap to clone by `Arc`;
/// never mutated after construction.
pub struct State {
    pub latest: LatestTransition,
    pub transition: Transition,
    pub manifest: Manifest,
    pub manifest_bytes: Vec<u8>,
    pub ca: Ca,
    pub engine: Arc<SeedEngine>,
    /// Length of the transition chain behind this state.
    pub generation: u64,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

struct SeedMaterial {
    seed: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    engine: Arc<SeedEngine>,
}

#[derive(Debug)]
pub struct SetManifestOutcome {
    pub state: Arc<State>,
    /// Present only when the call bootstrapped a new lineage.
    pub seed_share_doc: Option<SeedShareDocument>,
}

pub struct Authority {
    history: History,
    seeds: Mutex<Option<SeedMaterial>>,
    state: Mutex<Option<Arc<State>>>,
    // Single-flight guard: at most one recovery attempt at a time.
    recovery: Mutex<()>,
}

impl Authority {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            history: History::new(store),
            seeds: Mutex::new(None),
            state: Mutex::new(None),
            recovery: Mutex::new(()),
        }
    }

    /// Submits a manifest. The first call on an empty history bootstraps
    /// the lineage and returns seed shares; subsequent calls must carry a
    /// signature from an owner key the current manifest accepts.
    pub fn set_manifest(
        &self,
        manifest_bytes: &[u8],
        policies: &[Vec<u8>],
        owner_public_key: &[u8],
        owner_signature: &[u8],
    ) -> TrustPlaneResult<SetManifestOutcome> {
        let manifest = Manifest::from_bytes(manifest_bytes)?;

        let mut seeds_guard = self.seeds.lock();
        if !self.history.has_latest()? {
            let outcome = self.bootstrap(manifest, manifest_bytes, policies)?;
            *seeds_guard = Some(outcome.0);
            *self.state.lock() = Some(outcome.1.state.clone());
            return Ok(outcome.1);
        }

        let seeds = seeds_guard.as_ref().ok_or(TrustPlaneError::NeedsRecovery)?;
        let mut state_guard = self.state.lock();
        let current = self.sync_locked(seeds, &mut state_guard)?;

        self.authorize_update(&current.manifest, manifest_bytes, owner_public_key, owner_signature)?;
        self.store_policies(&manifest, policies)?;

        let manifest_hash = self.history.set_manifest(manifest_bytes)?;
        let transition = Transition {
            manifest_hash,
            previous_transition_hash: current.latest.transition_hash,
        };
        let transition_hash = self.history.set_transition(&transition)?;
        let latest = self.history.set_latest(
            Some(&current.latest),
            transition_hash,
            seeds.engine.transaction_signing_key(),
        )?;

        let state = Arc::new(State {
            latest,
            transition,
            manifest,
            manifest_bytes: manifest_bytes.to_vec(),
            ca: Ca::new(seeds.engine.root_ca_secret())?,
            engine: seeds.engine.clone(),
            generation: current.generation + 1,
        });
        *state_guard = Some(state.clone());
        tracing::info!(
            generation = state.generation,
            manifest_hash = %hex::encode(manifest_hash),
            "manifest updated"
        );
        Ok(SetManifestOutcome {
            state,
            seed_share_doc: None,
        })
    }

    fn bootstrap(
        &self,
        manifest: Manifest,
        manifest_bytes: &[u8],
        policies: &[Vec<u8>],
    ) -> TrustPlaneResult<(SeedMaterial, SetManifestOutcome)> {
        self.store_policies(&manifest, policies)?;

        let mut seed = Zeroizing::new(vec![0u8; MIN_SEED_LEN]);
        let mut salt = vec![0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let engine = Arc::new(SeedEngine::new(&seed, &salt)?);

        let manifest_hash = self.history.set_manifest(manifest_bytes)?;
        let transition = Transition {
            manifest_hash,
            previous_transition_hash: GENESIS,
        };
        let transition_hash = self.history.set_transition(&transition)?;
        // Lost bootstrap races surface as CasConflict; the caller retries
        // and lands in the update path.
        let latest =
            self.history
                .set_latest(None, transition_hash, engine.transaction_signing_key())?;

        let seed_share_doc =
            encrypt_seed_shares(&seed, &salt, &manifest.seedshare_owner_pub_keys)?;

        let state = Arc::new(State {
            latest,
            transition,
            manifest,
            manifest_bytes: manifest_bytes.to_vec(),
            ca: Ca::new(engine.root_ca_secret())?,
            engine: engine.clone(),
            generation: 1,
        });
        tracing::info!(
            manifest_hash = %hex::encode(manifest_hash),
            owners = seed_share_doc.shares.len(),
            "lineage bootstrapped"
        );
        Ok((
            SeedMaterial { seed, salt, engine },
            SetManifestOutcome {
                state,
                seed_share_doc: Some(seed_share_doc),
            },
        ))
    }

    fn authorize_update(
        &self,
        current: &Manifest,
        manifest_bytes: &[u8],
        owner_public_key: &[u8],
        owner_signature: &[u8],
    ) -> TrustPlaneResult<()> {
        if current.updates_disabled() {
            return Err(TrustPlaneError::PermissionDenied(
                "manifest updates are disabled for this lineage".to_string(),
            ));
        }
        let digest = owner_key_digest(owner_public_key);
        if !current.allows_update_from(&digest) {
            return Err(TrustPlaneError::PermissionDenied(format!(
                "owner key {digest} is not authorized to update the manifest"
            )));
        }
        let verifying_key = VerifyingKey::from_public_key_der(owner_public_key).map_err(|_| {
            TrustPlaneError::InvalidArgument("owner key is not a P-384 SPKI".to_string())
        })?;
        let signature = Signature::from_der(owner_signature).map_err(|_| {
            TrustPlaneError::PermissionDenied("owner signature is malformed".to_string())
        })?;
        verifying_key
            .verify(manifest_bytes, &signature)
            .map_err(|_| {
                TrustPlaneError::PermissionDenied(
                    "owner signature does not cover the manifest".to_string(),
                )
            })
    }

    /// Stores provided policies and checks that every policy the manifest
    /// references is resolvable. The caller must supply exactly one blob
    /// per referenced policy; unreferenced extras would otherwise persist
    /// unaudited under the lineage.
    fn store_policies(&self, manifest: &Manifest, policies: &[Vec<u8>]) -> TrustPlaneResult<()> {
        if policies.len() != manifest.policies.len() {
            return Err(TrustPlaneError::InvalidArgument(format!(
                "manifest references {} policies but {} were supplied",
                manifest.policies.len(),
                policies.len()
            )));
        }
        for policy in policies {
            self.history.set_policy(policy)?;
        }
        for policy_hash_hex in manifest.policies.keys() {
            let hash = parse_hash(policy_hash_hex)?;
            match self.history.get_policy(&hash) {
                Ok(_) => {}
                Err(TrustPlaneError::NotFound(_)) => {
                    return Err(TrustPlaneError::InvalidArgument(format!(
                        "manifest references unknown policy {policy_hash_hex}"
                    )));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Current state, re-validated against the store head.
    pub fn get_state(&self) -> TrustPlaneResult<Arc<State>> {
        let seeds_guard = self.seeds.lock();
        let seeds = match seeds_guard.as_ref() {
            Some(seeds) => seeds,
            None if self.history.has_latest()? => return Err(TrustPlaneError::NeedsRecovery),
            None => return Err(TrustPlaneError::NoManifest),
        };
        let mut state_guard = self.state.lock();
        self.sync_locked(seeds, &mut state_guard)
    }

    /// Verifies the store head and refreshes the cached state. A head
    /// that descends from the cached one resyncs transparently; a head on
    /// an unrelated or rolled-back chain demands recovery.
    fn sync_locked(
        &self,
        seeds: &SeedMaterial,
        state_guard: &mut Option<Arc<State>>,
    ) -> TrustPlaneResult<Arc<State>> {
        let latest = self
            .history
            .get_latest(&seeds.engine.transaction_verifying_key())?
            .ok_or(TrustPlaneError::NoManifest)?;

        if let Some(current) = state_guard.as_ref() {
            if current.latest == latest {
                return Ok(current.clone());
            }
            let chain = self.chain(latest.transition_hash)?;
            let descends = chain
                .iter()
                .any(|(hash, _)| *hash == current.latest.transition_hash);
            if !descends {
                tracing::warn!(
                    head = %hex::encode(latest.transition_hash),
                    cached = %hex::encode(current.latest.transition_hash),
                    "store head does not descend from cached state"
                );
                return Err(TrustPlaneError::NeedsRecovery);
            }
            let state = self.build_state(seeds, latest, &chain)?;
            tracing::info!(generation = state.generation, "resynced to advanced head");
            *state_guard = Some(state.clone());
            return Ok(state);
        }

        let chain = self.chain(latest.transition_hash)?;
        let state = self.build_state(seeds, latest, &chain)?;
        *state_guard = Some(state.clone());
        Ok(state)
    }

    /// Walks the transition chain newest-first down to genesis.
    fn chain(&self, head: Hash32) -> TrustPlaneResult<Vec<(Hash32, Transition)>> {
        let mut chain = Vec::new();
        let mut cursor = head;
        loop {
            let transition = self.history.get_transition(&cursor)?;
            let previous = transition.previous_transition_hash;
            chain.push((cursor, transition));
            if previous == GENESIS {
                return Ok(chain);
            }
            cursor = previous;
        }
    }

    fn build_state(
        &self,
        seeds: &SeedMaterial,
        latest: LatestTransition,
        chain: &[(Hash32, Transition)],
    ) -> TrustPlaneResult<Arc<State>> {
        let (_, transition) = chain.first().ok_or_else(|| {
            TrustPlaneError::Internal("transition chain cannot be empty".to_string())
        })?;
        let manifest_bytes = self.history.get_manifest(&transition.manifest_hash)?;
        let manifest = Manifest::from_bytes(&manifest_bytes)?;
        Ok(Arc::new(State {
            latest,
            transition: *transition,
            manifest,
            manifest_bytes,
            ca: Ca::new(seeds.engine.root_ca_secret())?,
            engine: seeds.engine.clone(),
            generation: chain.len() as u64,
        }))
    }

    /// Full history: the state snapshot the walk was anchored on, its
    /// manifests oldest-first, and the union of all referenced policies
    /// ordered by policy hash. Callers needing the current CA must take
    /// it from the returned snapshot, not a second `get_state` call.
    pub fn get_history(
        &self,
    ) -> TrustPlaneResult<(Arc<State>, Vec<Vec<u8>>, Vec<Vec<u8>>)> {
        let state = self.get_state()?;
        let chain = self.chain(state.latest.transition_hash)?;

        let mut manifests = Vec::with_capacity(chain.len());
        let mut policies = BTreeMap::new();
        // chain is newest-first; walk it backwards for chronology.
        for (_, transition) in chain.iter().rev() {
            let manifest_bytes = self.history.get_manifest(&transition.manifest_hash)?;
            let manifest = Manifest::from_bytes(&manifest_bytes)?;
            for policy_hash_hex in manifest.policies.keys() {
                if !policies.contains_key(policy_hash_hex) {
                    let hash = parse_hash(policy_hash_hex)?;
                    policies.insert(policy_hash_hex.clone(), self.history.get_policy(&hash)?);
                }
            }
            manifests.push(manifest_bytes);
        }
        Ok((state, manifests, policies.into_values().collect()))
    }

    /// Re-seeds this instance from recovered material. Single-flight: a
    /// concurrent attempt fails fast instead of queueing.
    pub fn recover(&self, seed: &[u8], salt: &[u8]) -> TrustPlaneResult<Arc<State>> {
        if seed.len() != MIN_SEED_LEN || salt.len() != SALT_LEN {
            return Err(TrustPlaneError::InvalidArgument(format!(
                "recovery seed and salt must each be {MIN_SEED_LEN} bytes"
            )));
        }
        let _flight = self.recovery.try_lock().ok_or_else(|| {
            TrustPlaneError::Internal("recovery already in progress".to_string())
        })?;

        // Recovery re-seeds an instance that lost its context; an instance
        // still able to serve its current head must not be re-seeded, as
        // that could move it onto an older chain.
        let has_seeds = self.seeds.lock().is_some();
        if has_seeds && self.get_state().is_ok() {
            return Err(TrustPlaneError::InvalidArgument(
                "recovery not required: instance is operational".to_string(),
            ));
        }

        let engine = Arc::new(SeedEngine::new(seed, salt)?);
        let latest = self
            .history
            .get_latest(&engine.transaction_verifying_key())?
            .ok_or(TrustPlaneError::NoManifest)?;
        let chain = self.chain(latest.transition_hash)?;

        let seeds = SeedMaterial {
            seed: Zeroizing::new(seed.to_vec()),
            salt: salt.to_vec(),
            engine,
        };
        let state = self.build_state(&seeds, latest, &chain)?;
        *self.seeds.lock() = Some(seeds);
        *self.state.lock() = Some(state.clone());
        tracing::info!(generation = state.generation, "recovered from seed");
        Ok(state)
    }

    /// Seed material for handing to an attested peer. Errors mirror
    /// [`Authority::get_state`] preconditions.
    pub fn seed_material(&self) -> TrustPlaneResult<(Zeroizing<Vec<u8>>, Vec<u8>)> {
        let seeds_guard = self.seeds.lock();
        match seeds_guard.as_ref() {
            Some(seeds) => Ok((seeds.seed.clone(), seeds.salt.clone())),
            None if self.history.has_latest()? => Err(TrustPlaneError::NeedsRecovery),
            None => Err(TrustPlaneError::NoManifest),
        }
    }

    /// Head-pointer change notifications from the underlying store.
    pub fn watch_head(&self) -> TrustPlaneResult<Watch> {
        self.history.watch_latest()
    }
}

/// Hash of a policy document, as the manifest keys it.
#[must_use]
pub fn policy_hash_hex(policy: &[u8]) -> String {
    hex::encode(sha256(policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use p384::ecdsa::signature::Signer;
    use p384::ecdsa::SigningKey;
    use p384::pkcs8::EncodePublicKey;
    use serde_json::json;
    use trustplane_core::store::MemStore;

    struct Owner {
        key: SigningKey,
        spki: Vec<u8>,
    }

    impl Owner {
        fn new() -> Self {
            let key = SigningKey::random(&mut rand::rngs::OsRng);
            let spki = VerifyingKey::from(&key)
                .to_public_key_der()
                .expect("spki")
                .into_vec();
            Self { key, spki }
        }

        fn digest(&self) -> String {
            owner_key_digest(&self.spki)
        }

        fn sign(&self, manifest: &[u8]) -> Vec<u8> {
            let signature: Signature = self.key.sign(manifest);
            signature.to_der().as_bytes().to_vec()
        }
    }

    fn manifest_bytes(owner: &Owner, policies: &[&[u8]]) -> Vec<u8> {
        let mut policy_map = serde_json::Map::new();
        for (index, policy) in policies.iter().enumerate() {
            policy_map.insert(
                policy_hash_hex(policy),
                json!({"sans": [format!("w{index}.mesh.local")], "workload_secret_id": format!("secret-{index}")}),
            );
        }
        serde_json::to_vec(&json!({
            "policies": policy_map,
            "workload_owner_key_digests": [owner.digest()],
        }))
        .unwrap()
    }

    fn authority_pair() -> (Authority, Authority) {
        let store = Arc::new(MemStore::new());
        (
            Authority::new(store.clone()),
            Authority::new(store),
        )
    }

    #[test]
    fn starts_uninitialized() {
        let (authority, _) = authority_pair();
        assert!(matches!(
            authority.get_state(),
            Err(TrustPlaneError::NoManifest)
        ));
        assert!(matches!(
            authority.seed_material(),
            Err(TrustPlaneError::NoManifest)
        ));
    }

    #[test]
    fn bootstrap_sets_genesis_state() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        let outcome = authority
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .expect("bootstrap");
        assert!(outcome.seed_share_doc.is_some());
        assert_eq!(outcome.state.generation, 1);
        assert!(outcome.state.transition.is_genesis());

        let state = authority.get_state().expect("state");
        assert_eq!(state.generation, 1);
        assert_eq!(state.manifest_bytes, manifest);
    }

    #[test]
    fn bootstrap_rejects_unresolvable_policy() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        assert!(matches!(
            authority.set_manifest(&manifest, &[b"policy-b".to_vec()], &[], &[]),
            Err(TrustPlaneError::InvalidArgument(_))
        ));
        // Nothing was committed.
        assert!(matches!(
            authority.get_state(),
            Err(TrustPlaneError::NoManifest)
        ));
    }

    #[test]
    fn rejects_policy_count_mismatch() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);

        // Extra unreferenced blob at bootstrap.
        assert!(matches!(
            authority.set_manifest(
                &manifest,
                &[b"policy-a".to_vec(), b"policy-x".to_vec()],
                &[],
                &[],
            ),
            Err(TrustPlaneError::InvalidArgument(_))
        ));

        authority
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();

        // Already-persisted policies still need their blob on update.
        let update = manifest_bytes(&owner, &[b"policy-a"]);
        assert!(matches!(
            authority.set_manifest(&update, &[], &owner.spki, &owner.sign(&update)),
            Err(TrustPlaneError::InvalidArgument(_))
        ));
    }

    #[test]
    fn signed_update_advances_generation() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let first = manifest_bytes(&owner, &[b"policy-a"]);
        authority
            .set_manifest(&first, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();

        let second = manifest_bytes(&owner, &[b"policy-b"]);
        let outcome = authority
            .set_manifest(
                &second,
                &[b"policy-b".to_vec()],
                &owner.spki,
                &owner.sign(&second),
            )
            .expect("update");
        assert!(outcome.seed_share_doc.is_none());
        assert_eq!(outcome.state.generation, 2);
        assert_eq!(
            outcome.state.transition.previous_transition_hash,
            authority.chain(outcome.state.latest.transition_hash).unwrap()[1].0
        );
    }

    #[test]
    fn update_requires_authorized_owner() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let intruder = Owner::new();
        let first = manifest_bytes(&owner, &[b"policy-a"]);
        authority
            .set_manifest(&first, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();

        let second = manifest_bytes(&owner, &[b"policy-b"]);
        let err = authority
            .set_manifest(
                &second,
                &[b"policy-b".to_vec()],
                &intruder.spki,
                &intruder.sign(&second),
            )
            .expect_err("unauthorized owner");
        assert!(matches!(err, TrustPlaneError::PermissionDenied(_)));
    }

    #[test]
    fn update_rejects_signature_over_other_bytes() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let first = manifest_bytes(&owner, &[b"policy-a"]);
        authority
            .set_manifest(&first, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();

        let second = manifest_bytes(&owner, &[b"policy-b"]);
        let err = authority
            .set_manifest(
                &second,
                &[b"policy-b".to_vec()],
                &owner.spki,
                &owner.sign(&first),
            )
            .expect_err("signature over wrong bytes");
        assert!(matches!(err, TrustPlaneError::PermissionDenied(_)));
    }

    #[test]
    fn empty_owner_set_locks_lineage() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let locked = serde_json::to_vec(&json!({"policies": {}})).unwrap();
        authority.set_manifest(&locked, &[], &[], &[]).unwrap();

        let update = manifest_bytes(&owner, &[]);
        assert!(matches!(
            authority.set_manifest(&update, &[], &owner.spki, &owner.sign(&update)),
            Err(TrustPlaneError::PermissionDenied(_))
        ));
    }

    #[test]
    fn second_instance_needs_recovery_then_recovers() {
        let (primary, secondary) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        primary
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();

        assert!(matches!(
            secondary.get_state(),
            Err(TrustPlaneError::NeedsRecovery)
        ));
        assert!(matches!(
            secondary.set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[]),
            Err(TrustPlaneError::NeedsRecovery)
        ));

        let (seed, salt) = primary.seed_material().unwrap();
        let state = secondary.recover(&seed, &salt).expect("recover");
        assert_eq!(state.generation, 1);
        // Root identity matches; the intermediate is per-instance.
        assert_eq!(
            state.ca.root_ca_pem(),
            primary.get_state().unwrap().ca.root_ca_pem()
        );
    }

    #[test]
    fn recover_rejects_wrong_seed() {
        let (primary, secondary) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        primary
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();

        assert!(matches!(
            secondary.recover(&[0xeeu8; 32], &[0x11u8; 32]),
            Err(TrustPlaneError::InvalidSignature)
        ));
    }

    #[test]
    fn recover_rejects_short_material() {
        let (_, secondary) = authority_pair();
        assert!(matches!(
            secondary.recover(&[0xeeu8; 16], &[0x11u8; 32]),
            Err(TrustPlaneError::InvalidArgument(_))
        ));
        assert!(matches!(
            secondary.recover(&[0xeeu8; 32], &[0x11u8; 16]),
            Err(TrustPlaneError::InvalidArgument(_))
        ));
    }

    #[test]
    fn recover_rejects_operational_instance() {
        let (primary, secondary) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        primary
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();
        let (seed, salt) = primary.seed_material().unwrap();
        secondary.recover(&seed, &salt).unwrap();

        // Neither instance has lost context, so neither may be re-seeded.
        assert!(matches!(
            primary.recover(&seed, &salt),
            Err(TrustPlaneError::InvalidArgument(_))
        ));
        assert!(matches!(
            secondary.recover(&seed, &salt),
            Err(TrustPlaneError::InvalidArgument(_))
        ));
    }

    #[test]
    fn peer_update_resyncs_transparently() {
        let (primary, secondary) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        primary
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();
        let (seed, salt) = primary.seed_material().unwrap();
        secondary.recover(&seed, &salt).unwrap();

        let second = manifest_bytes(&owner, &[b"policy-b"]);
        primary
            .set_manifest(
                &second,
                &[b"policy-b".to_vec()],
                &owner.spki,
                &owner.sign(&second),
            )
            .unwrap();

        let state = secondary.get_state().expect("resync");
        assert_eq!(state.generation, 2);
        assert_eq!(state.manifest_bytes, second);
    }

    #[test]
    fn rolled_back_head_demands_recovery() {
        let store = Arc::new(MemStore::new());
        let authority = Authority::new(store.clone());
        let owner = Owner::new();
        let first = manifest_bytes(&owner, &[b"policy-a"]);
        authority
            .set_manifest(&first, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();
        let old_head = store.get("transitions/latest").unwrap();

        let second = manifest_bytes(&owner, &[b"policy-b"]);
        authority
            .set_manifest(
                &second,
                &[b"policy-b".to_vec()],
                &owner.spki,
                &owner.sign(&second),
            )
            .unwrap();

        // Roll the head back to the genesis pointer behind the cache.
        store.set("transitions/latest", &old_head).unwrap();
        assert!(matches!(
            authority.get_state(),
            Err(TrustPlaneError::NeedsRecovery)
        ));
    }

    #[test]
    fn history_is_chronological_with_policy_union() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let first = manifest_bytes(&owner, &[b"policy-a"]);
        authority
            .set_manifest(&first, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();
        let second = manifest_bytes(&owner, &[b"policy-b"]);
        authority
            .set_manifest(
                &second,
                &[b"policy-b".to_vec()],
                &owner.spki,
                &owner.sign(&second),
            )
            .unwrap();

        let (state, manifests, policies) = authority.get_history().expect("history");
        assert_eq!(manifests, vec![first, second.clone()]);
        let mut expected = vec![b"policy-a".to_vec(), b"policy-b".to_vec()];
        expected.sort_by_key(|p| policy_hash_hex(p));
        assert_eq!(policies, expected);
        // The snapshot anchoring the walk is the one the list describes.
        assert_eq!(state.manifest_bytes, second);
        assert_eq!(state.generation, 2);
    }

    #[test]
    fn head_watch_fires_on_update() {
        let (authority, _) = authority_pair();
        let owner = Owner::new();
        let watch = authority.watch_head().unwrap();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        let outcome = authority
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();
        assert_eq!(
            watch.events.recv().unwrap(),
            outcome.state.latest.marshal_binary()
        );
    }

    #[test]
    fn workload_secrets_survive_recovery() {
        let (primary, secondary) = authority_pair();
        let owner = Owner::new();
        let manifest = manifest_bytes(&owner, &[b"policy-a"]);
        primary
            .set_manifest(&manifest, &[b"policy-a".to_vec()], &[], &[])
            .unwrap();
        let (seed, salt) = primary.seed_material().unwrap();
        secondary.recover(&seed, &salt).unwrap();

        let a = primary
            .get_state()
            .unwrap()
            .engine
            .derive_workload_secret("secret-0")
            .unwrap();
        let b = secondary
            .get_state()
            .unwrap()
            .engine
            .derive_workload_secret("secret-0")
            .unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
    }
}
