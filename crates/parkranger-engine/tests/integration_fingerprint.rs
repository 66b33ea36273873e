//! End-to-end fingerprint scenarios (see spec §8's worked scenarios)
//!
//! Exercises the full RTT-tracker → fingerprint-engine → store path the way
//! `parkranger-cli`'s event processor drives it, without any real packet
//! capture or network I/O.

use parkranger_capture::{IcmpProber, RTTTracker};
use parkranger_core::store::FingerprintStore;
use parkranger_core::types::unix_now;
use parkranger_core::{GeoLocation, VPNFingerprint};
use parkranger_engine::{FingerprintEngine, MemoryStore};
use parkranger_geo::{CityFinder, Geolocator, LocalGeoDatabase};
use std::net::IpAddr;
use std::sync::Arc;

fn fresh_engine() -> (FingerprintEngine, RTTTracker) {
    let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new());
    let tracker = RTTTracker::new(IcmpProber::new_disabled(), 60.0);
    let geolocator = Arc::new(Geolocator::new(LocalGeoDatabase::open(None), vec![], 3600.0));
    let city_finder = Arc::new(CityFinder::load(100_000));
    let engine = FingerprintEngine::new(store, tracker.clone(), geolocator, city_finder, 0.0, 200.0);
    (engine, tracker)
}

/// A direct peer with a TCP sample but no ICMP sample (the prober is
/// disabled in this fixture) never gets flagged as VPN-likely: the RTT
/// difference stays undefined until both sides have a sample.
#[tokio::test]
async fn direct_peer_without_icmp_sample_is_not_vpn_likely() {
    let (engine, tracker) = fresh_engine();
    let peer: IpAddr = "198.51.100.10".parse().unwrap();
    let local: IpAddr = "10.0.0.1".parse().unwrap();

    tracker.record_syn(local, 54321, peer, 443);
    let rtt = tracker.record_syn_ack(peer, 443, local, 54321);
    assert!(rtt.is_some());

    let fp = engine.analyze_ip(peer, false).await;
    assert!(fp.tcp_rtt_ms.is_some());
    assert!(fp.icmp_rtt_ms.is_none());
    assert!(!fp.is_vpn_likely);
    assert!(fp.estimated_distance_km.is_none());
    assert!(fp.possible_cities.is_empty());
    assert!(fp.check_invariants());
}

/// S4: traffic from a private peer never reaches an HTTP geolocation
/// provider and the resulting fingerprint carries no location.
#[tokio::test]
async fn private_peer_is_never_geolocated() {
    let (engine, _tracker) = fresh_engine();
    let private_peer: IpAddr = "10.0.0.5".parse().unwrap();

    let fp = engine.analyze_ip(private_peer, false).await;
    assert!(fp.location.is_none());
    assert!(fp.possible_cities.is_empty());
    assert!(!fp.is_vpn_likely);
}

/// S5: fingerprints persisted by one engine instance are visible to a
/// fresh engine rehydrated from the same store, simulating a restart.
#[tokio::test]
async fn fingerprints_survive_a_simulated_restart() {
    let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new());
    let geolocator = Arc::new(Geolocator::new(LocalGeoDatabase::open(None), vec![], 3600.0));
    let city_finder = Arc::new(CityFinder::load(100_000));

    let peers: Vec<IpAddr> = vec![
        "203.0.113.1".parse().unwrap(),
        "203.0.113.2".parse().unwrap(),
        "203.0.113.3".parse().unwrap(),
    ];

    {
        let tracker = RTTTracker::new(IcmpProber::new_disabled(), 60.0);
        let engine = FingerprintEngine::new(
            Arc::clone(&store),
            tracker,
            Arc::clone(&geolocator),
            Arc::clone(&city_finder),
            0.0,
            200.0,
        );
        for peer in &peers {
            engine.analyze_ip(*peer, false).await;
        }
        assert_eq!(engine.get_all_fingerprints().len(), 3);
    }

    // New engine instance, same backing store: rehydrate should recover
    // all three fingerprints without re-running any analysis.
    let tracker2 = RTTTracker::new(IcmpProber::new_disabled(), 60.0);
    let engine2 = FingerprintEngine::new(store, tracker2, geolocator, city_finder, 0.0, 200.0);
    assert!(engine2.get_all_fingerprints().is_empty());
    engine2.rehydrate().await;

    let mut rehydrated_ips: Vec<String> = engine2
        .get_all_fingerprints()
        .into_iter()
        .map(|fp| fp.ip)
        .collect();
    rehydrated_ips.sort();
    let mut expected: Vec<String> = peers.iter().map(|ip| ip.to_string()).collect();
    expected.sort();
    assert_eq!(rehydrated_ips, expected);
}

/// S6: stale-cleanup removes only fingerprints older than `max_age`,
/// leaving recent ones in place, counting removals from the in-memory map.
#[tokio::test]
async fn stale_cleanup_removes_only_old_fingerprints() {
    let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new());
    store
        .save_fingerprint(&aged_fingerprint("203.0.113.101", 3700.0))
        .await
        .unwrap();
    store
        .save_fingerprint(&aged_fingerprint("203.0.113.102", 3700.0))
        .await
        .unwrap();
    store
        .save_fingerprint(&aged_fingerprint("203.0.113.103", 0.0))
        .await
        .unwrap();

    let tracker = RTTTracker::new(IcmpProber::new_disabled(), 60.0);
    let geolocator = Arc::new(Geolocator::new(LocalGeoDatabase::open(None), vec![], 3600.0));
    let city_finder = Arc::new(CityFinder::load(100_000));
    let engine = FingerprintEngine::new(store, tracker, geolocator, city_finder, 0.0, 200.0);
    engine.rehydrate().await;
    assert_eq!(engine.get_all_fingerprints().len(), 3);

    let removed = engine.cleanup_stale(3600.0).await;
    assert_eq!(removed, 2);

    let remaining = engine.get_all_fingerprints();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].ip, "203.0.113.103");
}

fn aged_fingerprint(ip: &str, age_secs: f64) -> VPNFingerprint {
    let mut fp = VPNFingerprint::new(ip);
    fp.last_updated -= age_secs;
    fp
}

fn paris_location(ip: IpAddr) -> GeoLocation {
    GeoLocation {
        ip: ip.to_string(),
        latitude: 48.8566,
        longitude: 2.3522,
        city: Some("Paris".into()),
        region: None,
        country: Some("France".into()),
        country_code: Some("FR".into()),
        isp: None,
        org: None,
        timezone: None,
    }
}

/// S2: a peer with a 50ms TCP / 10ms ICMP split and a known location 4,000km
/// out gets flagged VPN-likely, with every candidate city landing within the
/// ring tolerance of the estimated distance.
#[tokio::test]
async fn vpn_like_gap_with_known_location_is_flagged_and_rings_the_distance() {
    let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new());
    let tracker = RTTTracker::new(IcmpProber::new_disabled(), 60.0);
    let geolocator = Arc::new(Geolocator::new(LocalGeoDatabase::open(None), vec![], 3600.0));
    let city_finder = Arc::new(CityFinder::load(100_000));
    let peer: IpAddr = "203.0.113.50".parse().unwrap();

    geolocator.seed_cache(vec![(peer.to_string(), paris_location(peer), unix_now())]);
    tracker.seed_samples(peer, &[50.0], &[10.0]);

    let engine = FingerprintEngine::new(
        store,
        tracker,
        Arc::clone(&geolocator),
        city_finder,
        0.0,
        200.0,
    );

    let fp = engine.analyze_ip(peer, false).await;
    assert_eq!(fp.rtt_difference_ms, Some(40.0));
    assert_eq!(fp.estimated_distance_km, Some(4000.0));
    assert!(fp.is_vpn_likely);
    assert!(!fp.possible_cities.is_empty());
    for city in &fp.possible_cities {
        assert!((city.distance_from_center_km - 4000.0).abs() <= 800.0);
    }
    assert!(fp.check_invariants());
}

/// S3: a noisy run of TCP samples with a single outlier still yields the
/// true minimum RTT, a 1ms gap too small to call VPN-likely on its own, and
/// a confidence score carried mostly by sample-count weight.
#[tokio::test]
async fn noisy_tcp_samples_keep_the_true_minimum_and_stay_below_the_vpn_threshold() {
    let (engine, tracker) = fresh_engine();
    let peer: IpAddr = "203.0.113.60".parse().unwrap();

    let tcp_samples = [25.0, 27.0, 26.0, 25.0, 28.0, 300.0, 25.0, 26.0, 27.0, 25.0];
    let icmp_samples = [24.0, 24.0, 25.0, 24.0, 24.0];
    tracker.seed_samples(peer, &tcp_samples, &icmp_samples);

    let fp = engine.analyze_ip(peer, false).await;
    assert_eq!(fp.tcp_rtt_ms, Some(25.0));
    assert_eq!(fp.icmp_rtt_ms, Some(24.0));
    assert_eq!(fp.rtt_difference_ms, Some(1.0));
    assert!(!fp.is_vpn_likely);
    assert!(fp.confidence > 0.5);
    assert!(fp.check_invariants());
}
