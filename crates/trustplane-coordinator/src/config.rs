// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Backing store flavor for the manifest history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StoreKind {
    /// Durable filesystem store under `data_dir`.
    #[default]
    Fs,
    /// Ephemeral in-memory store, for development.
    Mem,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen: String,
    pub data_dir: PathBuf,
    pub store: StoreKind,
    /// Peer coordinator endpoints tried during seed-assisted startup.
    pub peers: Vec<String>,
    pub recovery_retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7070".to_string(),
            data_dir: PathBuf::from("./data"),
            store: StoreKind::Fs,
            peers: Vec::new(),
            recovery_retry: RetryPolicy {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(5),
            },
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.listen
            .parse::<std::net::SocketAddr>()
            .map_err(|err| format!("listen address {:?}: {err}", self.listen))?;
        for peer in &self.peers {
            if peer.is_empty() {
                return Err("peer endpoint must not be empty".to_string());
            }
        }
        Ok(())
    }
}
