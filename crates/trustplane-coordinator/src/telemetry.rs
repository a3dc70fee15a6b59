// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process counters, rendered in Prometheus text format on demand.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct TelemetryState {
    manifest_updates_total: u64,
    recoveries_total: u64,
    certs_issued_total: u64,
    rejects_total: HashMap<String, u64>,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    state: Arc<Mutex<TelemetryState>>,
}

impl Telemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_manifest_update(&self, generation: u64) {
        let mut guard = self.state.lock();
        guard.manifest_updates_total = guard.manifest_updates_total.saturating_add(1);
        guard.generation = generation;
    }

    pub fn record_recovery(&self, generation: u64) {
        let mut guard = self.state.lock();
        guard.recoveries_total = guard.recoveries_total.saturating_add(1);
        guard.generation = generation;
    }

    pub fn record_cert_issued(&self) {
        let mut guard = self.state.lock();
        guard.certs_issued_total = guard.certs_issued_total.saturating_add(1);
    }

    pub fn record_reject(&self, reason: &str) {
        let mut guard = self.state.lock();
        let entry = guard.rejects_total.entry(reason.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let guard = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "trustplane_manifest_updates_total {}",
            guard.manifest_updates_total
        );
        let _ = writeln!(out, "trustplane_recoveries_total {}", guard.recoveries_total);
        let _ = writeln!(
            out,
            "trustplane_certs_issued_total {}",
            guard.certs_issued_total
        );
        let _ = writeln!(out, "trustplane_generation {}", guard.generation);
        let mut reasons: Vec<_> = guard.rejects_total.iter().collect();
        reasons.sort();
        for (reason, count) in reasons {
            let _ = writeln!(
                out,
                "trustplane_rejects_total{{reason=\"{reason}\"}} {count}"
            );
        }
        out
    }
}
