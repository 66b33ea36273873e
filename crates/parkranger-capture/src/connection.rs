//! Connection table
//!
//! Tracks one [`Connection`] per observed TCP flow, keyed by the canonical
//! 4-tuple (§3, §4.1). Bounded by `max_connections`: once full, new flows are
//! refused rather than evicting an arbitrary entry, so a capture burst cannot
//! grow memory without limit while still letting the janitor reclaim idle
//! flows on its own schedule.

use parkranger_core::types::unix_now;
use parkranger_core::{Connection, ConnectionState, FlowKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Thread-safe table of in-flight and recently-closed TCP flows.
#[derive(Clone)]
pub struct ConnectionTable {
    inner: Arc<Mutex<HashMap<FlowKey, Connection>>>,
    max_connections: usize,
}

impl ConnectionTable {
    pub fn new(max_connections: usize) -> Self {
        ConnectionTable {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_connections,
        }
    }

    /// Upsert the flow for this packet; returns `(connection snapshot, is_new)`.
    /// `is_new` drives the `new_connection` event emitted prior to state
    /// mutation (§4.1). Returns `None` if the table is full and this would be
    /// a new entry.
    pub fn observe_packet(
        &self,
        key: FlowKey,
        remote_ip: IpAddr,
        remote_port: u16,
        local_ip: IpAddr,
        local_port: u16,
        packet_len: u64,
    ) -> Option<(Connection, bool)> {
        let now = unix_now();
        let mut table = self.inner.lock();
        let is_new = !table.contains_key(&key);
        if is_new && table.len() >= self.max_connections {
            return None;
        }
        let conn = table.entry(key).or_insert_with(|| {
            Connection::new(key, remote_ip, remote_port, local_ip, local_port, now)
        });
        conn.touch(now, packet_len);
        Some((conn.clone(), is_new))
    }

    /// Advance the state of an existing flow; no-op if the flow is unknown
    /// (e.g. it was evicted between `observe_packet` and this call).
    pub fn advance_state(&self, key: FlowKey, next: ConnectionState) {
        if let Some(conn) = self.inner.lock().get_mut(&key) {
            conn.advance_state(next);
        }
    }

    pub fn get(&self, key: &FlowKey) -> Option<Connection> {
        self.inner.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every remote peer IP currently tracked (§10.3:
    /// `get_unique_remote_ips`, used by the prober task to find peers
    /// lacking an ICMP sample).
    pub fn unique_remote_ips(&self) -> Vec<IpAddr> {
        let table = self.inner.lock();
        let mut ips: Vec<IpAddr> = table.values().map(|c| c.remote_ip).collect();
        ips.sort();
        ips.dedup();
        ips
    }

    /// Removes flows whose `last_seen` is older than `max_age_secs`; returns
    /// the number removed (janitor's `cleanup_old_connections`).
    pub fn cleanup_old_connections(&self, max_age_secs: f64) -> usize {
        let now = unix_now();
        let mut table = self.inner.lock();
        let before = table.len();
        table.retain(|_, conn| now - conn.last_seen <= max_age_secs);
        before - table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_key() -> FlowKey {
        FlowKey::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            54321,
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 10)),
            443,
        )
    }

    #[test]
    fn first_packet_of_a_flow_is_new() {
        let table = ConnectionTable::new(10);
        let key = sample_key();
        let (conn, is_new) = table
            .observe_packet(
                key,
                IpAddr::V4(Ipv4Addr::new(198, 51, 100, 10)),
                443,
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                54321,
                60,
            )
            .unwrap();
        assert!(is_new);
        assert_eq!(conn.packets, 1);
        assert_eq!(conn.bytes_transferred, 60);

        let (conn2, is_new2) = table
            .observe_packet(
                key,
                IpAddr::V4(Ipv4Addr::new(198, 51, 100, 10)),
                443,
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                54321,
                40,
            )
            .unwrap();
        assert!(!is_new2);
        assert_eq!(conn2.packets, 2);
        assert_eq!(conn2.bytes_transferred, 100);
    }

    #[test]
    fn full_table_refuses_new_flows() {
        let table = ConnectionTable::new(1);
        let key_a = sample_key();
        let key_b = FlowKey::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            1,
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 20)),
            80,
        );
        assert!(table
            .observe_packet(
                key_a,
                IpAddr::V4(Ipv4Addr::new(198, 51, 100, 10)),
                443,
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                54321,
                60,
            )
            .is_some());
        assert!(table
            .observe_packet(
                key_b,
                IpAddr::V4(Ipv4Addr::new(198, 51, 100, 20)),
                80,
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                1,
                60,
            )
            .is_none());
    }

    #[test]
    fn cleanup_removes_only_stale_flows() {
        let table = ConnectionTable::new(10);
        let key = sample_key();
        table.observe_packet(
            key,
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 10)),
            443,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            54321,
            60,
        );
        {
            let mut inner = table.inner.lock();
            for conn in inner.values_mut() {
                conn.last_seen -= 3600.0;
            }
        }
        let removed = table.cleanup_old_connections(300.0);
        assert_eq!(removed, 1);
        assert!(table.is_empty());
    }
}
