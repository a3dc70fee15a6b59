// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Two-level mesh certificate authority.
//!
//! The root CA key is derived deterministically from the seed, so every
//! coordinator recovered from the same seed re-creates the same root
//! identity. The intermediate mesh CA key is generated fresh for each
//! authority state; rotating the manifest therefore rotates every leaf
//! certificate without touching the root of trust.

use p384::pkcs8::EncodePrivateKey;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CustomExtension, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, RemoteKeyPair, SignatureAlgorithm,
    PKCS_ECDSA_P384_SHA384,
};

use crate::error::{TrustPlaneError, TrustPlaneResult};

const ROOT_CA_CN: &str = "trustplane root ca";
const MESH_CA_CN: &str = "trustplane mesh ca";

/// Private-arc OID under which a leaf carries the JSON claims of the
/// attestation report it was issued against.
pub const CLAIMS_EXTENSION_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 58530, 1, 1];

fn internal(context: &str) -> impl Fn(rcgen::Error) -> TrustPlaneError + '_ {
    move |err| TrustPlaneError::Internal(format!("{context}: {err}"))
}

/// Subject key we hold only the public half of. Issuance never needs the
/// subject to sign, so `sign` is unreachable in practice.
struct PeerPublicKey {
    sec1_uncompressed: Vec<u8>,
}

impl RemoteKeyPair for PeerPublicKey {
    fn public_key(&self) -> &[u8] {
        &self.sec1_uncompressed
    }

    fn sign(&self, _msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        Err(rcgen::Error::RemoteKeyError)
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &PKCS_ECDSA_P384_SHA384
    }
}

/// Certificate chain returned to a workload: its leaf plus both CA certs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChain {
    pub leaf_pem: String,
    pub mesh_ca_pem: String,
    pub root_ca_pem: String,
}

pub struct Ca {
    root_cert: Certificate,
    mesh_cert: Certificate,
    mesh_key: KeyPair,
}

impl Ca {
    /// Builds the root from the deterministic secret and mints a fresh
    /// intermediate under it.
    pub fn new(root_secret: &p384::SecretKey) -> TrustPlaneResult<Self> {
        let root_der = root_secret
            .to_pkcs8_der()
            .map_err(|err| TrustPlaneError::Internal(format!("root ca pkcs8: {err}")))?;
        let root_key =
            KeyPair::try_from(root_der.as_bytes()).map_err(internal("root ca key"))?;

        let mut root_params =
            CertificateParams::new(Vec::<String>::new()).map_err(internal("root ca params"))?;
        root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        root_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        root_params.distinguished_name = common_name(ROOT_CA_CN);
        let root_cert = root_params
            .self_signed(&root_key)
            .map_err(internal("root ca cert"))?;

        let mesh_key =
            KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).map_err(internal("mesh ca key"))?;
        let mut mesh_params =
            CertificateParams::new(Vec::<String>::new()).map_err(internal("mesh ca params"))?;
        mesh_params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        mesh_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        mesh_params.distinguished_name = common_name(MESH_CA_CN);
        let mesh_cert = mesh_params
            .signed_by(&mesh_key, &root_cert, &root_key)
            .map_err(internal("mesh ca cert"))?;

        Ok(Self {
            root_cert,
            mesh_cert,
            mesh_key,
        })
    }

    #[must_use]
    pub fn root_ca_pem(&self) -> String {
        self.root_cert.pem()
    }

    #[must_use]
    pub fn mesh_ca_pem(&self) -> String {
        self.mesh_cert.pem()
    }

    /// PKCS#8 DER of the intermediate key, for coordinators that terminate
    /// mesh TLS themselves.
    #[must_use]
    pub fn mesh_ca_key_der(&self) -> Vec<u8> {
        self.mesh_key.serialize_der()
    }

    /// Issues a leaf under the mesh CA over the subject's P-384 public key
    /// (SEC1 encoding, compressed or uncompressed). The subject's private
    /// key never leaves the workload. Non-empty `claims` are embedded under
    /// [`CLAIMS_EXTENSION_OID`] so relying parties can audit the attested
    /// identity behind the certificate.
    pub fn issue_cert(
        &self,
        subject_sec1: &[u8],
        sans: &[String],
        claims: &[u8],
    ) -> TrustPlaneResult<CertChain> {
        let public_key = p384::PublicKey::from_sec1_bytes(subject_sec1).map_err(|_| {
            TrustPlaneError::InvalidArgument("subject key is not a valid P-384 point".to_string())
        })?;
        let subject_key = KeyPair::from_remote(Box::new(PeerPublicKey {
            sec1_uncompressed: public_key.to_sec1_bytes().to_vec(),
        }))
        .map_err(internal("subject key"))?;

        let mut params =
            CertificateParams::new(sans.to_vec()).map_err(|err| {
                TrustPlaneError::InvalidArgument(format!("subject alternative names: {err}"))
            })?;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        if !claims.is_empty() {
            params.custom_extensions = vec![CustomExtension::from_oid_content(
                CLAIMS_EXTENSION_OID,
                claims.to_vec(),
            )];
        }
        let leaf = params
            .signed_by(&subject_key, &self.mesh_cert, &self.mesh_key)
            .map_err(internal("leaf cert"))?;

        Ok(CertChain {
            leaf_pem: leaf.pem(),
            mesh_ca_pem: self.mesh_ca_pem(),
            root_ca_pem: self.root_ca_pem(),
        })
    }
}

fn common_name(name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    dn
}
