// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed manifest history.
//!
//! Everything except the head pointer lives at `SHA256(value)`-derived
//! keys, so writes are idempotent and reads self-verify. The head pointer
//! `transitions/latest` is the single mutable key; it advances only
//! through compare-and-swap and is authenticated by its embedded
//! signature, never by trusting the backend.

use std::sync::Arc;

use p384::ecdsa::{SigningKey, VerifyingKey};

use crate::error::{TrustPlaneError, TrustPlaneResult};
use crate::store::{Store, Watch};
use crate::transition::{LatestTransition, Transition};
use crate::{sha256, Hash32};

const MANIFEST_PREFIX: &str = "manifests";
const POLICY_PREFIX: &str = "policies";
const TRANSITION_PREFIX: &str = "transitions";
const LATEST_KEY: &str = "transitions/latest";

fn content_key(prefix: &str, hash: &Hash32) -> String {
    format!("{prefix}/{}", hex::encode(hash))
}

/// History of a coordinator lineage over an arbitrary [`Store`].
#[derive(Clone)]
pub struct History {
    store: Arc<dyn Store>,
}

impl History {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn set_addressed(&self, prefix: &str, value: &[u8]) -> TrustPlaneResult<Hash32> {
        let hash = sha256(value);
        let key = content_key(prefix, &hash);
        // Idempotent: the same hash can only ever map to the same bytes.
        if !self.store.has(&key)? {
            self.store.set(&key, value)?;
        }
        Ok(hash)
    }

    fn get_addressed(&self, prefix: &str, hash: &Hash32) -> TrustPlaneResult<Vec<u8>> {
        let value = self.store.get(&content_key(prefix, hash))?;
        let actual = sha256(&value);
        if actual != *hash {
            return Err(TrustPlaneError::HashMismatch {
                expected: hex::encode(hash),
                actual: hex::encode(actual),
            });
        }
        Ok(value)
    }

    pub fn set_manifest(&self, manifest_bytes: &[u8]) -> TrustPlaneResult<Hash32> {
        self.set_addressed(MANIFEST_PREFIX, manifest_bytes)
    }

    pub fn get_manifest(&self, hash: &Hash32) -> TrustPlaneResult<Vec<u8>> {
        self.get_addressed(MANIFEST_PREFIX, hash)
    }

    pub fn set_policy(&self, policy_bytes: &[u8]) -> TrustPlaneResult<Hash32> {
        self.set_addressed(POLICY_PREFIX, policy_bytes)
    }

    pub fn get_policy(&self, hash: &Hash32) -> TrustPlaneResult<Vec<u8>> {
        self.get_addressed(POLICY_PREFIX, hash)
    }

    pub fn set_transition(&self, transition: &Transition) -> TrustPlaneResult<Hash32> {
        self.set_addressed(TRANSITION_PREFIX, &transition.marshal_binary())
    }

    pub fn get_transition(&self, hash: &Hash32) -> TrustPlaneResult<Transition> {
        let bytes = self.get_addressed(TRANSITION_PREFIX, hash)?;
        Transition::unmarshal_binary(&bytes)
    }

    /// Reads and authenticates the head pointer. `Ok(None)` means the
    /// history has never been initialized. This is the only read path
    /// that establishes trust; all other reads are reached by hash from
    /// the transition the verified head names.
    pub fn get_latest(
        &self,
        verifying_key: &VerifyingKey,
    ) -> TrustPlaneResult<Option<LatestTransition>> {
        let bytes = match self.store.get(LATEST_KEY) {
            Ok(bytes) => bytes,
            Err(TrustPlaneError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let latest = LatestTransition::unmarshal_binary(&bytes)?;
        latest.verify(verifying_key)?;
        Ok(Some(latest))
    }

    /// Advances the head from `old` (None at bootstrap) to a freshly
    /// signed pointer at `transition_hash`. Loses cleanly with
    /// [`TrustPlaneError::CasConflict`] against a concurrent writer;
    /// callers re-fetch and decide, nothing retries here.
    pub fn set_latest(
        &self,
        old: Option<&LatestTransition>,
        transition_hash: Hash32,
        signing_key: &SigningKey,
    ) -> TrustPlaneResult<LatestTransition> {
        let latest = LatestTransition::sign(transition_hash, signing_key);
        let old_bytes = old.map(LatestTransition::marshal_binary).unwrap_or_default();
        self.store
            .compare_and_swap(LATEST_KEY, &old_bytes, &latest.marshal_binary())?;
        Ok(latest)
    }

    pub fn has_latest(&self) -> TrustPlaneResult<bool> {
        self.store.has(LATEST_KEY)
    }

    pub fn watch_latest(&self) -> TrustPlaneResult<Watch> {
        self.store.watch(LATEST_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use crate::transition::GENESIS;
    use proptest::prelude::*;
    use rand::rngs::OsRng;

    fn history() -> (History, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        (History::new(store.clone()), store)
    }

    fn signing_key() -> SigningKey {
        SigningKey::random(&mut OsRng)
    }

    #[test]
    fn manifest_roundtrip_is_idempotent() {
        let (history, _) = history();
        let hash = history.set_manifest(b"{\"policies\":{}}").unwrap();
        assert_eq!(hash, history.set_manifest(b"{\"policies\":{}}").unwrap());
        assert_eq!(history.get_manifest(&hash).unwrap(), b"{\"policies\":{}}");
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let (history, _) = history();
        assert!(matches!(
            history.get_manifest(&[9u8; 32]),
            Err(TrustPlaneError::NotFound(_))
        ));
    }

    #[test]
    fn corrupted_value_fails_hash_check() {
        let (history, store) = history();
        let hash = history.set_manifest(b"good bytes").unwrap();
        store
            .set(&content_key(MANIFEST_PREFIX, &hash), b"evil bytes")
            .unwrap();
        assert!(matches!(
            history.get_manifest(&hash),
            Err(TrustPlaneError::HashMismatch { .. })
        ));
    }

    #[test]
    fn transition_roundtrip() {
        let (history, _) = history();
        let transition = Transition {
            manifest_hash: [1u8; 32],
            previous_transition_hash: GENESIS,
        };
        let hash = history.set_transition(&transition).unwrap();
        assert_eq!(hash, transition.hash());
        assert_eq!(history.get_transition(&hash).unwrap(), transition);
    }

    #[test]
    fn latest_bootstrap_then_advance() {
        let (history, _) = history();
        let key = signing_key();
        let verifying = VerifyingKey::from(&key);

        assert!(history.get_latest(&verifying).unwrap().is_none());
        assert!(!history.has_latest().unwrap());

        let first = history.set_latest(None, [1u8; 32], &key).unwrap();
        let read = history.get_latest(&verifying).unwrap().unwrap();
        assert_eq!(read, first);

        let second = history.set_latest(Some(&first), [2u8; 32], &key).unwrap();
        assert_eq!(
            history.get_latest(&verifying).unwrap().unwrap(),
            second
        );
    }

    #[test]
    fn latest_bootstrap_races_have_one_winner() {
        let (history, _) = history();
        let key = signing_key();
        history.set_latest(None, [1u8; 32], &key).unwrap();
        assert!(matches!(
            history.set_latest(None, [2u8; 32], &key),
            Err(TrustPlaneError::CasConflict)
        ));
    }

    #[test]
    fn latest_advance_from_stale_head_conflicts() {
        let (history, _) = history();
        let key = signing_key();
        let first = history.set_latest(None, [1u8; 32], &key).unwrap();
        let second = history.set_latest(Some(&first), [2u8; 32], &key).unwrap();
        assert!(matches!(
            history.set_latest(Some(&first), [3u8; 32], &key),
            Err(TrustPlaneError::CasConflict)
        ));
        // The winner's head is untouched.
        let verifying = VerifyingKey::from(&key);
        assert_eq!(history.get_latest(&verifying).unwrap().unwrap(), second);
    }

    #[test]
    fn latest_signed_by_other_key_is_rejected() {
        let (history, _) = history();
        let key = signing_key();
        history.set_latest(None, [1u8; 32], &key).unwrap();
        let other = VerifyingKey::from(&signing_key());
        assert!(matches!(
            history.get_latest(&other),
            Err(TrustPlaneError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_latest_is_rejected() {
        let (history, store) = history();
        let key = signing_key();
        history.set_latest(None, [1u8; 32], &key).unwrap();
        let mut bytes = store.get(LATEST_KEY).unwrap();
        bytes[0] ^= 0x01;
        store.set(LATEST_KEY, &bytes).unwrap();
        assert!(matches!(
            history.get_latest(&VerifyingKey::from(&key)),
            Err(TrustPlaneError::InvalidSignature)
        ));
    }

    #[test]
    fn truncated_latest_is_rejected() {
        let (history, store) = history();
        store.set(LATEST_KEY, &[0u8; 16]).unwrap();
        let key = VerifyingKey::from(&signing_key());
        assert!(matches!(
            history.get_latest(&key),
            Err(TrustPlaneError::InvalidArgument(_))
        ));
    }

    #[test]
    fn watch_latest_streams_head_updates() {
        let (history, _) = history();
        let key = signing_key();
        let watch = history.watch_latest().unwrap();
        let first = history.set_latest(None, [1u8; 32], &key).unwrap();
        assert_eq!(watch.events.recv().unwrap(), first.marshal_binary());
    }

    proptest! {
        #[test]
        fn content_addressing_roundtrip(value in proptest::collection::vec(any::<u8>(), 0..512)) {
            let (history, _) = history();
            let hash = history.set_manifest(&value).unwrap();
            prop_assert_eq!(sha256(&value), hash);
            prop_assert_eq!(history.get_manifest(&hash).unwrap(), value);
        }
    }
}
