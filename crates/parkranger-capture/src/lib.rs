//! ParkRanger Capture
//!
//! Passive TCP packet observation and active ICMP probing: the sensing half
//! of the fingerprinting pipeline (§4.1, §4.2). [`PacketObserver`] attaches
//! to a network interface and turns raw traffic into connection-table
//! updates and RTT samples; [`RTTTracker`] owns the per-peer sample history
//! and drives ICMP probing via [`IcmpProber`].

pub mod connection;
pub mod icmp_prober;
pub mod local_addrs;
pub mod packet_observer;
pub mod rtt_tracker;

pub use connection::ConnectionTable;
pub use icmp_prober::IcmpProber;
pub use local_addrs::LocalAddressSet;
pub use packet_observer::{bpf_filter_for_ports, parse_tcp_ipv4, ParsedTcpPacket, PacketObserver};
pub use rtt_tracker::RTTTracker;
