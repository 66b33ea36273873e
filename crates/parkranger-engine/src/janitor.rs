//! Janitor task (§5)
//!
//! Runs on a fixed interval, calling each component's own stale-entry sweep
//! in turn: connections, pending SYNs, then fingerprints. Cancellation is a
//! flag checked at the top of every loop iteration, the same shutdown idiom
//! the scanner workspace's background tasks use.

use crate::fingerprint_engine::FingerprintEngine;
use parkranger_capture::{ConnectionTable, RTTTracker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct JanitorConfig {
    pub interval_secs: u64,
    pub connection_max_age_secs: f64,
    pub pending_syn_max_age_secs: f64,
    pub fingerprint_max_age_secs: f64,
}

/// Periodically evicts stale connections, pending handshakes, and
/// fingerprints. Runs until `shutdown` is set.
pub async fn run(
    connections: ConnectionTable,
    rtt_tracker: RTTTracker,
    engine: FingerprintEngine,
    config: JanitorConfig,
    shutdown: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
    loop {
        interval.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            info!("janitor task shutting down");
            break;
        }

        let connections_removed = connections.cleanup_old_connections(config.connection_max_age_secs);
        let pending_syns_removed = rtt_tracker.cleanup_stale(config.pending_syn_max_age_secs);
        let fingerprints_removed = engine.cleanup_stale(config.fingerprint_max_age_secs).await;

        debug!(
            connections_removed,
            pending_syns_removed, fingerprints_removed, "janitor sweep complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use parkranger_capture::IcmpProber;
    use parkranger_core::{store::FingerprintStore, FlowKey};
    use parkranger_geo::{CityFinder, Geolocator, LocalGeoDatabase};
    use std::net::IpAddr;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn a_running_sweep_leaves_fresh_connections_in_place() {
        let connections = ConnectionTable::new(10);
        let rtt_tracker = RTTTracker::new(IcmpProber::new_disabled(), 60.0);
        let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new());
        let geolocator = Arc::new(Geolocator::new(LocalGeoDatabase::open(None), vec![], 3600.0));
        let city_finder = Arc::new(CityFinder::load(100_000));
        let engine = FingerprintEngine::new(store, rtt_tracker.clone(), geolocator, city_finder, 0.0, 200.0);

        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "198.51.100.10".parse().unwrap();
        let key = FlowKey::new(a, 1, b, 443);
        connections.observe_packet(key, b, 443, a, 1, 60);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let connections_clone = connections.clone();
        let handle = tokio::spawn(async move {
            run(
                connections_clone,
                rtt_tracker,
                engine,
                JanitorConfig {
                    interval_secs: 1,
                    connection_max_age_secs: 300.0,
                    pending_syn_max_age_secs: 30.0,
                    fingerprint_max_age_secs: 3600.0,
                },
                shutdown_clone,
            )
            .await;
        });

        // Let at least one tick (fires immediately) run, then ask the loop
        // to stop on its next iteration.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.store(true, Ordering::Relaxed);
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        assert_eq!(connections.len(), 1);
    }
}
