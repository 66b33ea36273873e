//! Passive TCP packet observation
//!
//! Attaches to a network interface via `pcap` with a BPF filter, classifies
//! each TCP/IPv4 packet's flags, maintains the [`ConnectionTable`], drives
//! handshake timing through the [`RTTTracker`], and emits high-level events
//! onto the [`EventBus`] (§4.1). The capture loop itself runs on a blocking
//! task (`pcap::Capture` blocks the OS thread it runs on), mirroring
//! `kjetilom-network_listener`'s `spawn_blocking` capture loop; packet
//! parsing uses `pnet_packet`'s layered `EthernetPacket`/`Ipv4Packet`/
//! `TcpPacket` views, as `prtip-scanner::syn_scanner::parse_response` does.

use crate::local_addrs::LocalAddressSet;
use crate::rtt_tracker::RTTTracker;
use crate::ConnectionTable;
use parkranger_core::types::unix_now;
use parkranger_core::{ConnectionState, EventBus, FlowKey, ParkRangerEvent};
use parkranger_core::{Error, Result};
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::{TcpFlags, TcpPacket};
use pnet_packet::Packet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// The fields of a TCP/IPv4 packet relevant to flow tracking, decoupled from
/// the raw bytes so the classification logic can be exercised without
/// constructing real Ethernet frames.
#[derive(Debug, Clone, Copy)]
pub struct ParsedTcpPacket {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub flags: u8,
    pub total_len: u64,
}

/// Parses an Ethernet frame down to its TCP/IPv4 payload. Returns `None` for
/// anything that isn't a well-formed Ethernet→IPv4→TCP frame (non-IP
/// ethertypes, IPv6, fragments too short to hold a TCP header, etc.) — such
/// frames are simply discarded per §7's "input defect" handling.
pub fn parse_tcp_ipv4(frame: &[u8]) -> Option<ParsedTcpPacket> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ipv4 = Ipv4Packet::new(eth.payload())?;
    if ipv4.get_next_level_protocol() != pnet_packet::ip::IpNextHeaderProtocols::Tcp {
        return None;
    }
    let tcp = TcpPacket::new(ipv4.payload())?;

    Some(ParsedTcpPacket {
        src_ip: IpAddr::V4(ipv4.get_source()),
        src_port: tcp.get_source(),
        dst_ip: IpAddr::V4(ipv4.get_destination()),
        dst_port: tcp.get_destination(),
        flags: tcp.get_flags(),
        total_len: ipv4.get_total_length() as u64,
    })
}

/// Attaches to a network interface and turns raw packets into connection
/// table updates, RTT samples, and bus events.
#[derive(Clone)]
pub struct PacketObserver {
    local_addrs: LocalAddressSet,
    connections: ConnectionTable,
    rtt_tracker: RTTTracker,
    event_bus: EventBus,
    running: Arc<AtomicBool>,
}

impl PacketObserver {
    pub fn new(
        local_addrs: LocalAddressSet,
        connections: ConnectionTable,
        rtt_tracker: RTTTracker,
        event_bus: EventBus,
    ) -> Self {
        PacketObserver {
            local_addrs,
            connections,
            rtt_tracker,
            event_bus,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Signals the capture loop to stop at the next packet/timeout boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Opens `interface` (or the first non-loopback, up interface if `None`)
    /// with `bpf_filter` applied and runs the capture loop until `stop()` is
    /// called or a fatal capture error occurs. Blocking; call from
    /// `tokio::task::spawn_blocking`.
    pub fn run_capture_loop(&self, interface: Option<&str>, bpf_filter: &str) -> Result<()> {
        let device = match interface {
            Some(name) => pcap::Device::list()
                .map_err(|e| Error::Capture(format!("failed to list devices: {}", e)))?
                .into_iter()
                .find(|d| d.name == name)
                .ok_or_else(|| Error::Capture(format!("interface not found: {}", name)))?,
            None => pcap::Device::lookup()
                .map_err(|e| Error::Capture(format!("device lookup failed: {}", e)))?
                .ok_or_else(|| Error::Capture("no capture device available".into()))?,
        };

        info!("opening packet capture on {}", device.name);

        let mut cap = pcap::Capture::from_device(device)
            .map_err(|e| Error::Capture(format!("failed to open device: {}", e)))?
            .promisc(true)
            .immediate_mode(true)
            .timeout(100)
            .snaplen(262_144)
            .open()
            .map_err(|e| {
                Error::Privilege(format!(
                    "failed to activate capture (requires elevated privileges): {}",
                    e
                ))
            })?;

        cap.filter(bpf_filter, true)
            .map_err(|e| Error::Capture(format!("invalid BPF filter {:?}: {}", bpf_filter, e)))?;

        info!("capture active with filter {:?}", bpf_filter);

        while self.is_running() {
            match cap.next_packet() {
                Ok(packet) => {
                    if let Some(parsed) = parse_tcp_ipv4(packet.data) {
                        self.handle_parsed(parsed);
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => {
                    error!("capture read error, stopping observer: {}", e);
                    self.running.store(false, Ordering::SeqCst);
                    return Err(Error::Capture(format!("capture read failed: {}", e)));
                }
            }
        }

        debug!("capture loop exiting");
        Ok(())
    }

    /// Classifies one parsed packet, updates the connection table, drives
    /// handshake timing, and publishes events (§4.1's per-packet algorithm).
    pub fn handle_parsed(&self, pkt: ParsedTcpPacket) {
        let src_local = self.local_addrs.is_local(pkt.src_ip);
        let dst_local = self.local_addrs.is_local(pkt.dst_ip);
        if src_local == dst_local {
            // both local or both remote: not a flow we track
            return;
        }

        let (remote_ip, remote_port, local_ip, local_port) = if src_local {
            (pkt.dst_ip, pkt.dst_port, pkt.src_ip, pkt.src_port)
        } else {
            (pkt.src_ip, pkt.src_port, pkt.dst_ip, pkt.dst_port)
        };

        let key = FlowKey::new(pkt.src_ip, pkt.src_port, pkt.dst_ip, pkt.dst_port);
        let now = unix_now();

        let Some((connection, is_new)) = self.connections.observe_packet(
            key,
            remote_ip,
            remote_port,
            local_ip,
            local_port,
            pkt.total_len,
        ) else {
            // table full; drop silently, same as any other capacity bound
            return;
        };

        if is_new {
            self.event_bus.publish(ParkRangerEvent::NewConnection {
                peer_ip: remote_ip,
                connection,
                timestamp: now,
            });
        }

        let syn_only = pkt.flags & TcpFlags::SYN != 0 && pkt.flags & TcpFlags::ACK == 0;
        let syn_ack = pkt.flags & TcpFlags::SYN != 0 && pkt.flags & TcpFlags::ACK != 0;
        let ack_only = !syn_only && !syn_ack && pkt.flags & TcpFlags::ACK != 0;
        let fin_or_rst = pkt.flags & TcpFlags::FIN != 0 || pkt.flags & TcpFlags::RST != 0;

        if syn_only {
            self.rtt_tracker
                .record_syn(pkt.src_ip, pkt.src_port, pkt.dst_ip, pkt.dst_port);
            self.connections.advance_state(key, ConnectionState::SynSent);
        } else if syn_ack {
            let rtt = self
                .rtt_tracker
                .record_syn_ack(pkt.src_ip, pkt.src_port, pkt.dst_ip, pkt.dst_port);
            self.connections
                .advance_state(key, ConnectionState::SynAckReceived);
            if let Some(tcp_rtt_ms) = rtt {
                self.event_bus.publish(ParkRangerEvent::RttUpdate {
                    peer_ip: pkt.src_ip,
                    tcp_rtt_ms,
                    timestamp: now,
                });
            }
        } else if ack_only {
            if let Some(existing) = self.connections.get(&key) {
                if existing.state == ConnectionState::SynAckReceived {
                    self.connections
                        .advance_state(key, ConnectionState::Established);
                }
            }
        }

        if fin_or_rst {
            self.connections.advance_state(key, ConnectionState::Closed);
        }
    }
}

/// Builds the BPF filter string for the configured port list (§6):
/// `"tcp"` when empty, else `"tcp and (port P1 or port P2 ...)"`.
pub fn bpf_filter_for_ports(ports: &[u16]) -> String {
    if ports.is_empty() {
        return "tcp".to_string();
    }
    let conditions = ports
        .iter()
        .map(|p| format!("port {}", p))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("tcp and ({})", conditions)
}
