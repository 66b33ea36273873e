//! RTT tracking — passive TCP handshake timing and active ICMP probing
//!
//! `RTTTracker` maintains, per peer IP, a bounded history of TCP handshake
//! RTTs (derived from SYN/SYN-ACK timing) and ICMP echo RTTs (obtained by
//! shelling out to the platform `ping` utility). All state lives behind a
//! single mutex; critical sections are O(1) aside from the bounded-deque
//! trim (§4.2, §5).

use crate::icmp_prober::IcmpProber;
use parkranger_core::types::unix_now;
use parkranger_core::RTTSnapshot;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

const MAX_TCP_SAMPLES: usize = 100;
const MAX_ICMP_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PendingSynKey {
    src_ip: IpAddr,
    src_port: u16,
    dst_ip: IpAddr,
    dst_port: u16,
}

#[derive(Default)]
struct PeerMeasurement {
    tcp_samples: VecDeque<f64>,
    icmp_samples: VecDeque<f64>,
    last_updated: f64,
}

impl PeerMeasurement {
    fn add_tcp(&mut self, rtt_ms: f64) {
        self.tcp_samples.push_back(rtt_ms);
        if self.tcp_samples.len() > MAX_TCP_SAMPLES {
            self.tcp_samples.pop_front();
        }
        self.last_updated = unix_now();
    }

    fn add_icmp(&mut self, rtt_ms: f64) {
        self.icmp_samples.push_back(rtt_ms);
        if self.icmp_samples.len() > MAX_ICMP_SAMPLES {
            self.icmp_samples.pop_front();
        }
        self.last_updated = unix_now();
    }

    fn snapshot(&self) -> RTTSnapshot {
        RTTSnapshot {
            tcp_samples: self.tcp_samples.iter().copied().collect(),
            icmp_samples: self.icmp_samples.iter().copied().collect(),
            last_updated: self.last_updated,
        }
    }
}

struct State {
    measurements: HashMap<IpAddr, PeerMeasurement>,
    pending_syns: HashMap<PendingSynKey, f64>,
    ping_cache: HashMap<IpAddr, (f64, f64)>, // (rtt_ms, cached_at)
}

/// Tracks per-peer TCP and ICMP RTT samples and drives active ICMP probing.
#[derive(Clone)]
pub struct RTTTracker {
    state: Arc<Mutex<State>>,
    prober: Arc<IcmpProber>,
    ping_cache_ttl_secs: f64,
}

impl RTTTracker {
    pub fn new(prober: IcmpProber, ping_cache_ttl_secs: f64) -> Self {
        RTTTracker {
            state: Arc::new(Mutex::new(State {
                measurements: HashMap::new(),
                pending_syns: HashMap::new(),
                ping_cache: HashMap::new(),
            })),
            prober: Arc::new(prober),
            ping_cache_ttl_secs,
        }
    }

    /// Record that a SYN-only packet left for `(dst_ip, dst_port)` from
    /// `(src_ip, src_port)`.
    pub fn record_syn(&self, src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) {
        let key = PendingSynKey {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        };
        self.state.lock().pending_syns.insert(key, unix_now());
    }

    /// Record a SYN-ACK arriving from `(src_ip, src_port)` to `(dst_ip,
    /// dst_port)`. The matching pending entry is keyed by the reversed
    /// 4-tuple because the response swaps source and destination. Returns
    /// the measured RTT in milliseconds if a matching SYN was pending.
    pub fn record_syn_ack(
        &self,
        src_ip: IpAddr,
        src_port: u16,
        dst_ip: IpAddr,
        dst_port: u16,
    ) -> Option<f64> {
        let reversed = PendingSynKey {
            src_ip: dst_ip,
            src_port: dst_port,
            dst_ip: src_ip,
            dst_port: src_port,
        };
        let mut state = self.state.lock();
        let syn_time = state.pending_syns.remove(&reversed)?;
        let rtt_ms = (unix_now() - syn_time) * 1000.0;
        state
            .measurements
            .entry(src_ip)
            .or_default()
            .add_tcp(rtt_ms);
        Some(rtt_ms)
    }

    /// Returns a point-in-time snapshot of `ip`'s samples. Always succeeds
    /// (an unknown peer yields an empty snapshot), matching the lazily-created
    /// semantics of §3's `RTTMeasurement`.
    pub fn get_measurement(&self, ip: IpAddr) -> RTTSnapshot {
        self.state
            .lock()
            .measurements
            .get(&ip)
            .map(|m| m.snapshot())
            .unwrap_or_default()
    }

    /// Obtain (possibly cached) ICMP RTT for `ip`. Blocks the calling task
    /// for up to `ping_count * ping_timeout + 2` seconds when a fresh probe
    /// is required — callers should run this on a dedicated task.
    pub async fn ping_ip(&self, ip: IpAddr, force: bool) -> Option<f64> {
        if !force {
            let now = unix_now();
            let cached = {
                let state = self.state.lock();
                state.ping_cache.get(&ip).copied()
            };
            if let Some((rtt, cached_at)) = cached {
                if now - cached_at < self.ping_cache_ttl_secs {
                    return Some(rtt);
                }
            }
        }

        let rtt_ms = self.prober.probe(ip).await?;
        let now = unix_now();
        let mut state = self.state.lock();
        state.measurements.entry(ip).or_default().add_icmp(rtt_ms);
        state.ping_cache.insert(ip, (rtt_ms, now));
        Some(rtt_ms)
    }

    /// Drops pending-SYN entries older than `max_age_secs`. Returns the
    /// number of entries removed.
    pub fn cleanup_stale(&self, max_age_secs: f64) -> usize {
        let now = unix_now();
        let mut state = self.state.lock();
        let before = state.pending_syns.len();
        state
            .pending_syns
            .retain(|_, sent_at| now - *sent_at <= max_age_secs);
        before - state.pending_syns.len()
    }

    /// Seeds `ip`'s TCP and ICMP sample deques directly, bypassing the
    /// SYN/SYN-ACK pairing and `IcmpProber` paths. Samples are appended in
    /// order and trimmed to the same bounds as the live recording paths.
    /// Exists so fusion-level tests can reproduce an exact RTT distribution
    /// without racing real wall-clock timing or a platform `ping` binary.
    #[cfg(any(test, feature = "test-util"))]
    pub fn seed_samples(&self, ip: IpAddr, tcp_rtts_ms: &[f64], icmp_rtts_ms: &[f64]) {
        let mut state = self.state.lock();
        let measurement = state.measurements.entry(ip).or_default();
        for &rtt in tcp_rtts_ms {
            measurement.add_tcp(rtt);
        }
        for &rtt in icmp_rtts_ms {
            measurement.add_icmp(rtt);
        }
    }
}
