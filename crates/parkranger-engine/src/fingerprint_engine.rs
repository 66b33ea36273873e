//! Fingerprint fusion and confidence scoring (§4.5)
//!
//! `analyze_ip` is the one public operation: given a peer IP it pulls the
//! latest RTT samples, resolves geolocation lazily, probes ICMP if no sample
//! exists yet, derives the TCP-vs-ICMP gap, and — if that gap survives the
//! operator-configured offset — estimates how far beyond the apparent
//! location the real endpoint sits and looks up candidate exit cities on
//! that ring.

use parkranger_capture::RTTTracker;
use parkranger_core::types::unix_now;
use parkranger_core::{store::FingerprintStore, RTTSnapshot, VPNFingerprint};
use parkranger_geo::{CityFinder, Geolocator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum ring tolerance in kilometers, regardless of estimated distance (§4.5).
const MIN_RING_TOLERANCE_KM: f64 = 50.0;
/// Fraction of the estimated distance used as ring tolerance above the floor.
const RING_TOLERANCE_FRACTION: f64 = 0.2;
/// Raw RTT-difference threshold above which the confidence score gets a boost (§4.5).
const CONFIDENCE_BOOST_THRESHOLD_MS: f64 = 5.0;

#[derive(Clone)]
pub struct FingerprintEngine {
    store: Arc<dyn FingerprintStore>,
    rtt_tracker: RTTTracker,
    geolocator: Arc<Geolocator>,
    city_finder: Arc<CityFinder>,
    fingerprints: Arc<Mutex<HashMap<String, VPNFingerprint>>>,
    vpn_latency_offset_ms: f64,
    speed_of_light_km_ms: f64,
}

impl FingerprintEngine {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        rtt_tracker: RTTTracker,
        geolocator: Arc<Geolocator>,
        city_finder: Arc<CityFinder>,
        vpn_latency_offset_ms: f64,
        speed_of_light_km_ms: f64,
    ) -> Self {
        FingerprintEngine {
            store,
            rtt_tracker,
            geolocator,
            city_finder,
            fingerprints: Arc::new(Mutex::new(HashMap::new())),
            vpn_latency_offset_ms,
            speed_of_light_km_ms,
        }
    }

    /// Rehydrates in-memory fingerprint state from the durable store at
    /// startup; a failure degrades to an empty map rather than a fatal
    /// error (§4.6, §7).
    pub async fn rehydrate(&self) {
        match self.store.load_all_fingerprints().await {
            Ok(loaded) => {
                let mut fingerprints = self.fingerprints.lock();
                for fp in loaded {
                    fingerprints.insert(fp.ip.clone(), fp);
                }
                debug!("rehydrated {} fingerprints from store", fingerprints.len());
            }
            Err(e) => {
                warn!("fingerprint rehydration failed, starting volatile: {}", e);
            }
        }

        match self.store.load_geo_cache(f64::MAX).await {
            Ok(rows) => {
                let count = rows.len();
                self.geolocator.seed_cache(
                    rows.into_iter()
                        .map(|c| (c.location.ip.clone(), c.location, c.cached_at)),
                );
                debug!("rehydrated {} geo cache entries from store", count);
            }
            Err(e) => {
                warn!("geo cache rehydration failed: {}", e);
            }
        }
    }

    pub fn get_fingerprint(&self, ip: &str) -> Option<VPNFingerprint> {
        self.fingerprints.lock().get(ip).cloned()
    }

    pub fn get_all_fingerprints(&self) -> Vec<VPNFingerprint> {
        self.fingerprints.lock().values().cloned().collect()
    }

    /// Fuses the current RTT measurement, geolocation, and city database for
    /// `ip` into an updated fingerprint, persists it, and returns it (§4.5).
    pub async fn analyze_ip(&self, ip: IpAddr, force_ping: bool) -> VPNFingerprint {
        let ip_str = ip.to_string();

        let mut fp = self
            .get_fingerprint(&ip_str)
            .unwrap_or_else(|| VPNFingerprint::new(ip_str.clone()));

        if fp.location.is_none() {
            if let Some(location) = self.geolocator.locate(ip).await {
                if let Err(e) = self.store.save_geo_cache(&ip_str, &location).await {
                    warn!("failed to persist geo cache entry for {}: {}", ip_str, e);
                }
                fp.location = Some(location);
            }
        }

        let mut snapshot = self.rtt_tracker.get_measurement(ip);
        if force_ping || snapshot.icmp_samples.is_empty() {
            self.rtt_tracker.ping_ip(ip, force_ping).await;
            snapshot = self.rtt_tracker.get_measurement(ip);
        }

        fp.tcp_rtt_ms = snapshot.best_tcp();
        fp.icmp_rtt_ms = snapshot.best_icmp();
        fp.confidence = confidence_score(&snapshot);
        fp.last_updated = unix_now();

        let raw_diff = snapshot.rtt_difference();
        let adjusted = raw_diff.map(|d| (d - self.vpn_latency_offset_ms).max(0.0));
        fp.rtt_difference_ms = adjusted;

        match (adjusted, fp.location.as_ref()) {
            (Some(adjusted), Some(location)) if adjusted > 0.0 => {
                let one_way_ms = adjusted / 2.0;
                let estimated_distance_km = one_way_ms * self.speed_of_light_km_ms;
                let tolerance_km =
                    MIN_RING_TOLERANCE_KM.max(RING_TOLERANCE_FRACTION * estimated_distance_km);
                fp.is_vpn_likely = true;
                fp.estimated_distance_km = Some(estimated_distance_km);
                fp.possible_cities = self.city_finder.near_ring(
                    location.latitude,
                    location.longitude,
                    estimated_distance_km,
                    tolerance_km,
                    10,
                );
            }
            _ => {
                fp.is_vpn_likely = false;
                fp.estimated_distance_km = None;
                fp.possible_cities.clear();
            }
        }

        self.fingerprints.lock().insert(ip_str.clone(), fp.clone());
        if let Err(e) = self.store.save_fingerprint(&fp).await {
            warn!("failed to persist fingerprint for {}: {}", ip_str, e);
        }

        fp
    }

    /// Runs `analyze_ip` for every peer in `ips` without forcing a fresh ping
    /// (used by the event-processor's batch sweep and the prober's
    /// post-probe refresh).
    pub async fn analyze_all_active(&self, ips: &[IpAddr]) -> Vec<VPNFingerprint> {
        let mut results = Vec::with_capacity(ips.len());
        for ip in ips {
            results.push(self.analyze_ip(*ip, false).await);
        }
        results
    }

    /// Drops in-memory and durable fingerprints older than `max_age_secs`;
    /// returns the number removed from memory (janitor task, §5).
    pub async fn cleanup_stale(&self, max_age_secs: f64) -> usize {
        let now = unix_now();
        let removed = {
            let mut fingerprints = self.fingerprints.lock();
            let before = fingerprints.len();
            fingerprints.retain(|_, fp| now - fp.last_updated <= max_age_secs);
            before - fingerprints.len()
        };
        if let Err(e) = self.store.cleanup_old_fingerprints(max_age_secs).await {
            warn!("fingerprint store cleanup failed: {}", e);
        }
        removed
    }
}

/// Confidence formula (§4.5): weighted blend of sample-count and TCP-variance
/// sub-scores, boosted when the raw RTT gap is large, collapsed to near-zero
/// when either sample set is empty.
fn confidence_score(snapshot: &RTTSnapshot) -> f64 {
    if snapshot.tcp_samples.is_empty() {
        return if snapshot.icmp_samples.is_empty() {
            0.0
        } else {
            0.1
        };
    }
    if snapshot.icmp_samples.is_empty() {
        return 0.0;
    }

    let tcp_sample_score = (snapshot.tcp_samples.len() as f64 / 10.0).min(1.0);
    let icmp_sample_score = (snapshot.icmp_samples.len() as f64 / 5.0).min(1.0);

    let tcp_variance_score = if snapshot.tcp_samples.len() > 1 {
        let best_tcp = snapshot.best_tcp().unwrap_or(0.0);
        let variance = snapshot
            .tcp_samples
            .iter()
            .map(|x| (x - best_tcp).powi(2))
            .sum::<f64>()
            / snapshot.tcp_samples.len() as f64;
        (1.0 - variance / 100.0).max(0.0)
    } else {
        0.5
    };

    let mut base =
        0.4 * tcp_sample_score + 0.3 * icmp_sample_score + 0.3 * tcp_variance_score;

    if let Some(raw_diff) = snapshot.rtt_difference() {
        if raw_diff > CONFIDENCE_BOOST_THRESHOLD_MS {
            base = (1.2 * base).min(1.0);
        }
    }

    base
}
