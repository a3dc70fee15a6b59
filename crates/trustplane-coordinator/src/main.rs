// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trustplane_coordinator::config::{CoordinatorConfig, StoreKind};
use trustplane_coordinator::recovery_client::recover_from_peers;
use trustplane_coordinator::server::CoordinatorService;
use trustplane_core::attestation::Report;
use trustplane_core::store::MemStore;
use trustplane_core::{TrustPlaneError, TrustPlaneResult};
use trustplane_protocol::pb::mesh_api_server::MeshApiServer;
use trustplane_protocol::pb::user_api_server::UserApiServer;
use trustplane_protocol::report_binding;

#[derive(Debug, Parser)]
#[command(name = "trustplane-coordinator")]
#[command(about = "TrustPlane confidential-mesh coordinator daemon")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:7070")]
    listen: String,

    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Backing store flavor. The in-memory flavor loses history on exit.
    #[arg(long, value_enum, default_value = "fs")]
    store: StoreKind,

    /// Peer coordinator endpoint for seed-assisted startup. Repeatable.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Attestation claims template from the platform agent, used when
    /// requesting the seed from a peer.
    #[arg(long)]
    report_template: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log: String,
}

/// Fills the template's `report_data` with the binding for `key`.
fn report_from_template(template: &PathBuf, key: &[u8]) -> TrustPlaneResult<Report> {
    let payload = std::fs::read(template).map_err(|err| {
        TrustPlaneError::Internal(format!("report template {}: {err}", template.display()))
    })?;
    let mut claims: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|err| TrustPlaneError::InvalidArgument(format!("report template: {err}")))?;
    let object = claims.as_object_mut().ok_or_else(|| {
        TrustPlaneError::InvalidArgument("report template must be a JSON object".to_string())
    })?;
    object.insert(
        "report_data".to_string(),
        serde_json::Value::String(hex::encode(report_binding(key))),
    );
    Report::from_json(&serde_json::to_vec(&claims).map_err(|err| {
        TrustPlaneError::Internal(format!("report template: {err}"))
    })?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log.clone()))
        .init();

    let config = CoordinatorConfig {
        listen: args.listen,
        data_dir: args.data_dir,
        store: args.store,
        peers: args.peers,
        ..Default::default()
    };
    config.validate()?;

    let addr: SocketAddr = config.listen.parse()?;
    let svc = match config.store {
        StoreKind::Fs => CoordinatorService::build(&config.data_dir)?,
        StoreKind::Mem => CoordinatorService::with_store(std::sync::Arc::new(MemStore::new())),
    };

    if matches!(svc.authority().get_state(), Err(TrustPlaneError::NeedsRecovery)) {
        if let Some(template) = args.report_template.as_ref() {
            if config.peers.is_empty() {
                tracing::warn!("history exists but no peers configured; waiting for operator recovery");
            } else {
                match recover_from_peers(
                    &svc.authority(),
                    &config.peers,
                    &config.recovery_retry,
                    |key| report_from_template(template, key),
                )
                .await
                {
                    Ok(state) => svc.telemetry().record_recovery(state.generation),
                    Err(err) => {
                        tracing::warn!(%err, "peer recovery failed; waiting for operator recovery");
                    }
                }
            }
        } else {
            tracing::warn!("history exists but seed is not in memory; recovery required");
        }
    }

    tracing::info!(%addr, data_dir = %config.data_dir.display(), "starting TrustPlane coordinator");

    tonic::transport::Server::builder()
        .add_service(UserApiServer::new(svc.clone()))
        .add_service(MeshApiServer::new(svc))
        .serve(addr)
        .await?;

    Ok(())
}
