//! Event types published by the packet observer and consumed by the
//! fingerprint engine and any external presentation layer.

use crate::types::Connection;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// High-level events emitted during packet observation and fingerprinting.
///
/// All variants carry the timestamp at which they were produced so that
/// slow consumers can reconstruct ordering from history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParkRangerEvent {
    /// A new flow was observed for the first time.
    NewConnection {
        peer_ip: IpAddr,
        connection: Connection,
        timestamp: f64,
    },
    /// A SYN/SYN-ACK pair yielded a fresh TCP RTT sample.
    RttUpdate {
        peer_ip: IpAddr,
        tcp_rtt_ms: f64,
        timestamp: f64,
    },
    /// A fingerprint was created or refreshed.
    FingerprintUpdated {
        peer_ip: IpAddr,
        timestamp: f64,
    },
}

impl ParkRangerEvent {
    pub fn peer_ip(&self) -> IpAddr {
        match self {
            ParkRangerEvent::NewConnection { peer_ip, .. }
            | ParkRangerEvent::RttUpdate { peer_ip, .. }
            | ParkRangerEvent::FingerprintUpdated { peer_ip, .. } => *peer_ip,
        }
    }
}
