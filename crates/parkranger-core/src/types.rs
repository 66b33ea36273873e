//! Shared domain types for the sensing and inference pipeline

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Connection state, advances monotonically except that FIN/RST always force `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unknown,
    SynSent,
    SynAckReceived,
    Established,
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Unknown
    }
}

/// Canonical 4-tuple key for a TCP flow: (low_ip, low_port, high_ip, high_port),
/// where "low"/"high" is the min/max ordering of (ip, port) pairs so that both
/// directions of a flow hash to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub low_ip: IpAddr,
    pub low_port: u16,
    pub high_ip: IpAddr,
    pub high_port: u16,
}

impl FlowKey {
    pub fn new(ip_a: IpAddr, port_a: u16, ip_b: IpAddr, port_b: u16) -> Self {
        if (ip_a, port_a) <= (ip_b, port_b) {
            FlowKey {
                low_ip: ip_a,
                low_port: port_a,
                high_ip: ip_b,
                high_port: port_b,
            }
        } else {
            FlowKey {
                low_ip: ip_b,
                low_port: port_b,
                high_ip: ip_a,
                high_port: port_a,
            }
        }
    }
}

/// A tracked TCP flow between a local and a remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub key: FlowKey,
    /// The remote (non-local) endpoint of this flow.
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub first_seen: f64,
    pub last_seen: f64,
    pub packets: u64,
    pub bytes_transferred: u64,
    pub state: ConnectionState,
}

impl Connection {
    pub fn new(
        key: FlowKey,
        remote_ip: IpAddr,
        remote_port: u16,
        local_ip: IpAddr,
        local_port: u16,
        now: f64,
    ) -> Self {
        Connection {
            key,
            remote_ip,
            remote_port,
            local_ip,
            local_port,
            first_seen: now,
            last_seen: now,
            packets: 0,
            bytes_transferred: 0,
            state: ConnectionState::Unknown,
        }
    }

    pub fn touch(&mut self, now: f64, packet_len: u64) {
        self.last_seen = now;
        self.packets += 1;
        self.bytes_transferred += packet_len;
    }

    pub fn duration(&self) -> f64 {
        self.last_seen - self.first_seen
    }

    /// Advance state monotonically; FIN/RST always force `Closed` regardless
    /// of the current state.
    pub fn advance_state(&mut self, next: ConnectionState) {
        if next == ConnectionState::Closed {
            self.state = ConnectionState::Closed;
            return;
        }
        let rank = |s: ConnectionState| -> u8 {
            match s {
                ConnectionState::Unknown => 0,
                ConnectionState::SynSent => 1,
                ConnectionState::SynAckReceived => 2,
                ConnectionState::Established => 3,
                ConnectionState::Closed => 4,
            }
        };
        if rank(next) > rank(self.state) {
            self.state = next;
        }
    }
}

/// Snapshot of a peer's RTT samples and derived statistics, returned by value
/// so callers never hold the tracker's internal lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RTTSnapshot {
    pub tcp_samples: Vec<f64>,
    pub icmp_samples: Vec<f64>,
    pub last_updated: f64,
}

impl RTTSnapshot {
    /// Minimum TCP sample (approximates the unloaded round-trip).
    pub fn best_tcp(&self) -> Option<f64> {
        self.tcp_samples
            .iter()
            .copied()
            .fold(None, |acc, x| Some(acc.map_or(x, |a: f64| a.min(x))))
    }

    /// Minimum ICMP sample.
    pub fn best_icmp(&self) -> Option<f64> {
        self.icmp_samples
            .iter()
            .copied()
            .fold(None, |acc, x| Some(acc.map_or(x, |a: f64| a.min(x))))
    }

    /// TCP RTT minus ICMP RTT, clamped at zero. `None` iff either sample set is empty.
    pub fn rtt_difference(&self) -> Option<f64> {
        match (self.best_tcp(), self.best_icmp()) {
            (Some(tcp), Some(icmp)) => Some((tcp - icmp).max(0.0)),
            _ => None,
        }
    }
}

/// Geographic location and ISP metadata reported for an IP by the Geolocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub ip: String,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
    pub timezone: Option<String>,
}

impl GeoLocation {
    /// `true` iff latitude/longitude both fall within valid ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A populated place from the bundled city dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub country: String,
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub population: u64,
}

/// A city candidate returned by a ring/radius query, annotated with its
/// distance from the query center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityMatch {
    #[serde(flatten)]
    pub city: City,
    pub distance_from_center_km: f64,
}

/// The fused, confidence-scored inference for a single peer IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VPNFingerprint {
    pub ip: String,
    pub location: Option<GeoLocation>,
    pub tcp_rtt_ms: Option<f64>,
    pub icmp_rtt_ms: Option<f64>,
    pub rtt_difference_ms: Option<f64>,
    pub estimated_distance_km: Option<f64>,
    pub possible_cities: Vec<CityMatch>,
    pub confidence: f64,
    pub last_updated: f64,
    pub is_vpn_likely: bool,
}

impl VPNFingerprint {
    pub fn new(ip: impl Into<String>) -> Self {
        VPNFingerprint {
            ip: ip.into(),
            location: None,
            tcp_rtt_ms: None,
            icmp_rtt_ms: None,
            rtt_difference_ms: None,
            estimated_distance_km: None,
            possible_cities: Vec::new(),
            confidence: 0.0,
            last_updated: unix_now(),
            is_vpn_likely: false,
        }
    }

    /// `§8` invariant 5: `is_vpn_likely` implies a positive distance and RTT difference.
    pub fn check_invariants(&self) -> bool {
        if self.is_vpn_likely {
            return self.rtt_difference_ms.unwrap_or(0.0) > 0.0
                && self.estimated_distance_km.unwrap_or(0.0) > 0.0;
        }
        true
    }
}

/// Seconds since the Unix epoch, as an `f64` to match the millisecond-precision
/// timestamps used throughout the sampling and fingerprint pipeline.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn flow_key_is_order_independent() {
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let k1 = FlowKey::new(a, 1234, b, 443);
        let k2 = FlowKey::new(b, 443, a, 1234);
        assert_eq!(k1, k2);
    }

    #[test]
    fn connection_state_forced_closed_on_fin() {
        let key = FlowKey::new(
            IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            1,
            IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            2,
        );
        let mut conn = Connection::new(
            key,
            IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            2,
            IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            1,
            0.0,
        );
        conn.advance_state(ConnectionState::Established);
        conn.advance_state(ConnectionState::Closed);
        assert_eq!(conn.state, ConnectionState::Closed);
        // Cannot un-close.
        conn.advance_state(ConnectionState::SynSent);
        assert_eq!(conn.state, ConnectionState::Closed);
    }

    #[test]
    fn rtt_snapshot_difference_requires_both_sides() {
        let mut snap = RTTSnapshot::default();
        assert_eq!(snap.rtt_difference(), None);
        snap.tcp_samples.push(25.0);
        assert_eq!(snap.rtt_difference(), None);
        snap.icmp_samples.push(20.0);
        assert_eq!(snap.rtt_difference(), Some(5.0));
    }

    #[test]
    fn rtt_snapshot_difference_clamps_at_zero() {
        let snap = RTTSnapshot {
            tcp_samples: vec![10.0],
            icmp_samples: vec![30.0],
            last_updated: 0.0,
        };
        assert_eq!(snap.rtt_difference(), Some(0.0));
    }

    #[test]
    fn fingerprint_invariant_rejects_inconsistent_vpn_likely() {
        let mut fp = VPNFingerprint::new("203.0.113.5");
        fp.is_vpn_likely = true;
        fp.rtt_difference_ms = Some(0.0);
        fp.estimated_distance_km = Some(100.0);
        assert!(!fp.check_invariants());
    }
}
