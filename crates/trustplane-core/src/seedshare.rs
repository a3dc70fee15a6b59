// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Seed escrow for disaster recovery.
//!
//! At first manifest the coordinator encrypts the secret seed to every
//! seedshare owner key from the manifest. Owners hold the only copies that
//! survive the loss of all coordinator instances; the salt travels in the
//! clear because the seed alone is the secret input.

use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{TrustPlaneError, TrustPlaneResult};

/// OAEP label binding ciphertexts to this protocol.
const OAEP_LABEL: &str = "seedshare";

fn oaep() -> Oaep {
    Oaep::new_with_label::<Sha256, _>(OAEP_LABEL)
}

/// One encrypted copy of the seed, addressed to a single owner key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedShare {
    /// Hex PKIX/SPKI DER of the recipient's RSA public key, verbatim from
    /// the manifest.
    pub public_key_hex: String,
    pub encrypted_seed: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeedShareDocument {
    pub salt: Vec<u8>,
    pub shares: Vec<SeedShare>,
}

/// Encrypts `seed` to each owner key. Fails atomically: one malformed or
/// non-RSA owner key rejects the whole document.
pub fn encrypt_seed_shares(
    seed: &[u8],
    salt: &[u8],
    owner_keys_hex: &[String],
) -> TrustPlaneResult<SeedShareDocument> {
    let mut rng = rand::rngs::OsRng;
    let mut shares = Vec::with_capacity(owner_keys_hex.len());
    for key_hex in owner_keys_hex {
        let der = hex::decode(key_hex).map_err(|_| {
            TrustPlaneError::InvalidArgument("seedshare owner key is not hex".to_string())
        })?;
        let public_key = RsaPublicKey::from_public_key_der(&der).map_err(|err| {
            TrustPlaneError::InvalidArgument(format!("seedshare owner key: {err}"))
        })?;
        let encrypted_seed = public_key
            .encrypt(&mut rng, oaep(), seed)
            .map_err(|err| TrustPlaneError::Internal(format!("seed encryption: {err}")))?;
        shares.push(SeedShare {
            public_key_hex: key_hex.clone(),
            encrypted_seed,
        });
    }
    Ok(SeedShareDocument {
        salt: salt.to_vec(),
        shares,
    })
}

/// Owner-side decryption of a single share.
pub fn decrypt_seed_share(
    private_key: &RsaPrivateKey,
    share: &SeedShare,
) -> TrustPlaneResult<Zeroizing<Vec<u8>>> {
    private_key
        .decrypt(oaep(), &share.encrypted_seed)
        .map(Zeroizing::new)
        .map_err(|_| TrustPlaneError::InvalidArgument("seed share does not decrypt".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePublicKey;

    fn owner_key() -> (RsaPrivateKey, String) {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("rsa keygen");
        let spki = RsaPublicKey::from(&private)
            .to_public_key_der()
            .expect("spki");
        (private, hex::encode(spki.as_bytes()))
    }

    #[test]
    fn each_owner_can_recover_the_seed() {
        let (private_a, hex_a) = owner_key();
        let (private_b, hex_b) = owner_key();
        let seed = [0x5au8; 32];
        let doc =
            encrypt_seed_shares(&seed, &[0x07u8; 32], &[hex_a.clone(), hex_b.clone()]).unwrap();
        assert_eq!(doc.salt, vec![0x07u8; 32]);
        assert_eq!(doc.shares.len(), 2);
        assert_eq!(doc.shares[0].public_key_hex, hex_a);
        assert_eq!(doc.shares[1].public_key_hex, hex_b);
        assert_eq!(
            decrypt_seed_share(&private_a, &doc.shares[0]).unwrap().as_slice(),
            &seed
        );
        assert_eq!(
            decrypt_seed_share(&private_b, &doc.shares[1]).unwrap().as_slice(),
            &seed
        );
    }

    #[test]
    fn wrong_owner_cannot_decrypt() {
        let (_, hex_a) = owner_key();
        let (private_b, _) = owner_key();
        let doc = encrypt_seed_shares(&[0x5au8; 32], &[0u8; 32], &[hex_a]).unwrap();
        assert!(decrypt_seed_share(&private_b, &doc.shares[0]).is_err());
    }

    #[test]
    fn malformed_owner_key_rejects_document() {
        let (_, hex_a) = owner_key();
        for bad in ["zz", "deadbeef"] {
            let keys = vec![hex_a.clone(), bad.to_string()];
            assert!(encrypt_seed_shares(&[0x5au8; 32], &[0u8; 32], &keys).is_err());
        }
    }

    #[test]
    fn no_owners_yields_empty_document() {
        let doc = encrypt_seed_shares(&[0x5au8; 32], &[1u8; 32], &[]).unwrap();
        assert!(doc.shares.is_empty());
        assert_eq!(doc.salt, vec![1u8; 32]);
    }
}
