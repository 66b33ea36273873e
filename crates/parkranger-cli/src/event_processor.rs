//! Event-processor task (§4.7, §5)
//!
//! Drains the event bus, re-analyzes the peer behind each `NewConnection`/
//! `RttUpdate` event, republishes the resulting fingerprint to every
//! registered sink, and re-emits a `FingerprintUpdated` event on the bus for
//! any other subscriber (the presentation layer, were one attached). Runs
//! until its receiver is dropped (bus shutdown) or the shutdown flag is set.

use crate::sink::FingerprintSink;
use parkranger_core::types::unix_now;
use parkranger_core::{EventBus, ParkRangerEvent};
use parkranger_engine::FingerprintEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn run(
    mut events: mpsc::Receiver<ParkRangerEvent>,
    engine: FingerprintEngine,
    bus: EventBus,
    sinks: Vec<Arc<dyn FingerprintSink>>,
    shutdown: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let should_analyze = matches!(
            event,
            ParkRangerEvent::NewConnection { .. } | ParkRangerEvent::RttUpdate { .. }
        );
        if !should_analyze {
            continue;
        }

        let fp = engine.analyze_ip(event.peer_ip(), false).await;
        for sink in &sinks {
            sink.publish(&fp);
        }
        bus.publish(ParkRangerEvent::FingerprintUpdated {
            peer_ip: event.peer_ip(),
            timestamp: unix_now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LoggingSink;
    use parkranger_capture::{IcmpProber, RTTTracker};
    use parkranger_core::store::FingerprintStore;
    use parkranger_engine::MemoryStore;
    use parkranger_geo::{CityFinder, Geolocator, LocalGeoDatabase};
    use std::net::IpAddr;

    #[tokio::test]
    async fn new_connection_event_triggers_analysis_and_republish() {
        let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new());
        let rtt_tracker = RTTTracker::new(IcmpProber::new_disabled(), 60.0);
        let geolocator = Arc::new(Geolocator::new(LocalGeoDatabase::open(None), vec![], 3600.0));
        let city_finder = Arc::new(CityFinder::load(100_000));
        let engine = FingerprintEngine::new(store, rtt_tracker, geolocator, city_finder, 0.0, 200.0);

        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        let mut downstream = bus.subscribe();

        let ip: IpAddr = "203.0.113.5".parse().unwrap();
        bus.publish(ParkRangerEvent::NewConnection {
            peer_ip: ip,
            connection: sample_connection(ip),
            timestamp: unix_now(),
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let sinks: Vec<Arc<dyn FingerprintSink>> = vec![Arc::new(LoggingSink)];
        let handle = tokio::spawn(run(rx, engine, bus, sinks, shutdown));

        let republished = tokio::time::timeout(std::time::Duration::from_secs(1), downstream.recv())
            .await
            .expect("should republish within timeout")
            .expect("channel should stay open");
        assert!(matches!(
            republished,
            ParkRangerEvent::FingerprintUpdated { peer_ip, .. } if peer_ip == ip
        ));

        handle.abort();
    }

    fn sample_connection(ip: IpAddr) -> parkranger_core::Connection {
        let key = parkranger_core::FlowKey::new(ip, 443, "10.0.0.1".parse().unwrap(), 1111);
        parkranger_core::Connection::new(key, ip, 443, "10.0.0.1".parse().unwrap(), 1111, unix_now())
    }
}
