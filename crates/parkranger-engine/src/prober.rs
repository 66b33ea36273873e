//! Prober task (§5)
//!
//! Every tick, sweeps the set of currently known remote peers in chunks,
//! issuing an ICMP probe (and, for variety tracking, a fresh analysis) for
//! any peer that doesn't yet have an ICMP sample. Yields between chunks so a
//! slow probe never starves the rest of the sweep.

use crate::fingerprint_engine::FingerprintEngine;
use parkranger_capture::{ConnectionTable, RTTTracker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PEERS_PER_CHUNK: usize = 20;

pub struct ProberConfig {
    pub interval_secs: u64,
}

/// Runs until `shutdown` is set. On each tick, probes every known remote
/// peer lacking an ICMP sample, then re-analyzes those peers so the
/// fingerprint reflects the fresh measurement.
pub async fn run(
    connections: ConnectionTable,
    rtt_tracker: RTTTracker,
    engine: FingerprintEngine,
    config: ProberConfig,
    shutdown: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
    loop {
        interval.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let peers = connections.unique_remote_ips();
        let mut probed = Vec::new();
        for chunk in peers.chunks(PEERS_PER_CHUNK) {
            for &ip in chunk {
                let snapshot = rtt_tracker.get_measurement(ip);
                if snapshot.icmp_samples.is_empty() {
                    if rtt_tracker.ping_ip(ip, false).await.is_some() {
                        probed.push(ip);
                    }
                }
                tokio::task::yield_now().await;
            }
        }

        if !probed.is_empty() {
            debug!(count = probed.len(), "prober refreshed ICMP samples");
            engine.analyze_all_active(&probed).await;
        }
    }
}
