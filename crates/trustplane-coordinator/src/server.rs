// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! gRPC surface: `UserApi` for owners and operators, `MeshApi` for
//! attested workloads and peer coordinators.

use std::path::Path;
use std::sync::Arc;

use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use tonic::{Request, Response, Status};

use trustplane_core::seedshare::{encrypt_seed_shares, SeedShareDocument};
use trustplane_core::store::{FsStore, Store};
use trustplane_core::{TrustPlaneError, TrustPlaneResult};
use trustplane_protocol::pb;
use trustplane_protocol::pb::mesh_api_server::MeshApi;
use trustplane_protocol::pb::user_api_server::UserApi;

use crate::authority::Authority;
use crate::credentials::{decode_report, require_coordinator, verify_mesh_caller};
use crate::public_error::error_to_status;
use crate::telemetry::Telemetry;

#[derive(Clone)]
pub struct CoordinatorService {
    authority: Arc<Authority>,
    telemetry: Telemetry,
}

impl CoordinatorService {
    pub fn build(data_dir: impl AsRef<Path>) -> TrustPlaneResult<Self> {
        let store = Arc::new(FsStore::open(data_dir)?);
        Ok(Self::with_store(store))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self {
            authority: Arc::new(Authority::new(store)),
            telemetry: Telemetry::new(),
        }
    }

    #[must_use]
    pub fn authority(&self) -> Arc<Authority> {
        self.authority.clone()
    }

    #[must_use]
    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.clone()
    }

    fn reject(&self, operation: &'static str, err: &TrustPlaneError) -> Status {
        self.telemetry.record_reject(operation);
        tracing::debug!(operation, %err, "request rejected");
        error_to_status(err)
    }
}

fn seed_share_doc_to_pb(doc: SeedShareDocument) -> pb::SeedShareDocument {
    pb::SeedShareDocument {
        seed_shares: doc
            .shares
            .into_iter()
            .map(|share| pb::SeedShare {
                public_key_hex: share.public_key_hex,
                encrypted_seed: share.encrypted_seed,
            })
            .collect(),
        salt: doc.salt,
    }
}

#[tonic::async_trait]
impl UserApi for CoordinatorService {
    async fn set_manifest(
        &self,
        request: Request<pb::SetManifestRequest>,
    ) -> Result<Response<pb::SetManifestResponse>, Status> {
        let req = request.into_inner();
        let outcome = self
            .authority
            .set_manifest(
                &req.manifest,
                &req.policies,
                &req.owner_public_key,
                &req.owner_signature,
            )
            .map_err(|err| self.reject("set_manifest", &err))?;
        self.telemetry.record_manifest_update(outcome.state.generation);
        Ok(Response::new(pb::SetManifestResponse {
            seed_share_doc: outcome.seed_share_doc.map(seed_share_doc_to_pb),
            root_ca_cert: outcome.state.ca.root_ca_pem().into_bytes(),
            mesh_ca_cert: outcome.state.ca.mesh_ca_pem().into_bytes(),
        }))
    }

    async fn get_manifests(
        &self,
        _request: Request<pb::GetManifestsRequest>,
    ) -> Result<Response<pb::GetManifestsResponse>, Status> {
        let (state, manifests, policies) = self
            .authority
            .get_history()
            .map_err(|err| self.reject("get_manifests", &err))?;
        Ok(Response::new(pb::GetManifestsResponse {
            manifests,
            policies,
            root_ca_cert: state.ca.root_ca_pem().into_bytes(),
            mesh_ca_cert: state.ca.mesh_ca_pem().into_bytes(),
        }))
    }

    async fn recover(
        &self,
        request: Request<pb::RecoverRequest>,
    ) -> Result<Response<pb::RecoverResponse>, Status> {
        let req = request.into_inner();
        let state = self
            .authority
            .recover(&req.seed, &req.salt)
            .map_err(|err| self.reject("recover", &err))?;
        self.telemetry.record_recovery(state.generation);
        Ok(Response::new(pb::RecoverResponse {}))
    }
}

#[tonic::async_trait]
impl MeshApi for CoordinatorService {
    async fn new_mesh_cert(
        &self,
        request: Request<pb::NewMeshCertRequest>,
    ) -> Result<Response<pb::NewMeshCertResponse>, Status> {
        let report = decode_report(request.metadata())
            .map_err(|err| self.reject("new_mesh_cert", &err))?;
        let req = request.into_inner();
        let state = self
            .authority
            .get_state()
            .map_err(|err| self.reject("new_mesh_cert", &err))?;
        let (entry, host_data) = verify_mesh_caller(&state, &report, &req.tls_public_key)
            .map_err(|err| self.reject("new_mesh_cert", &err))?;
        let claims = report
            .claims_to_cert_extension()
            .map_err(|err| self.reject("new_mesh_cert", &err))?;
        let chain = state
            .ca
            .issue_cert(&req.tls_public_key, &entry.sans, &claims)
            .map_err(|err| self.reject("new_mesh_cert", &err))?;
        let workload_secret = if entry.workload_secret_id.is_empty() {
            Vec::new()
        } else {
            state
                .engine
                .derive_workload_secret(&entry.workload_secret_id)
                .map_err(|err| self.reject("new_mesh_cert", &err))?
                .to_vec()
        };
        self.telemetry.record_cert_issued();
        tracing::info!(
            host_data = %hex::encode(host_data),
            sans = ?entry.sans,
            "issued mesh certificate"
        );
        Ok(Response::new(pb::NewMeshCertResponse {
            leaf_cert: chain.leaf_pem.into_bytes(),
            mesh_ca_cert: chain.mesh_ca_pem.into_bytes(),
            root_ca_cert: chain.root_ca_pem.into_bytes(),
            workload_secret,
        }))
    }

    async fn recover(
        &self,
        request: Request<pb::PeerRecoverRequest>,
    ) -> Result<Response<pb::PeerRecoverResponse>, Status> {
        let report = decode_report(request.metadata())
            .map_err(|err| self.reject("peer_recover", &err))?;
        let req = request.into_inner();
        let state = self
            .authority
            .get_state()
            .map_err(|err| self.reject("peer_recover", &err))?;
        let (entry, host_data) = verify_mesh_caller(&state, &report, &req.recovery_public_key)
            .map_err(|err| self.reject("peer_recover", &err))?;
        require_coordinator(entry).map_err(|err| self.reject("peer_recover", &err))?;

        // Sanity-parse the recipient key before committing seed material.
        RsaPublicKey::from_public_key_der(&req.recovery_public_key).map_err(|_| {
            self.reject(
                "peer_recover",
                &TrustPlaneError::InvalidArgument("recovery key is not an RSA SPKI".to_string()),
            )
        })?;

        let (seed, salt) = self
            .authority
            .seed_material()
            .map_err(|err| self.reject("peer_recover", &err))?;
        let doc = encrypt_seed_shares(
            &seed,
            &salt,
            &[hex::encode(&req.recovery_public_key)],
        )
        .map_err(|err| self.reject("peer_recover", &err))?;
        let share = doc.shares.into_iter().next().ok_or_else(|| {
            self.reject(
                "peer_recover",
                &TrustPlaneError::Internal("empty seed share document".to_string()),
            )
        })?;
        tracing::info!(
            host_data = %hex::encode(host_data),
            "handed seed to attested peer"
        );
        Ok(Response::new(pb::PeerRecoverResponse {
            encrypted_seed: share.encrypted_seed,
            salt: doc.salt,
            mesh_ca_key: state.ca.mesh_ca_key_der(),
            latest_manifest: state.manifest_bytes.clone(),
        }))
    }
}
