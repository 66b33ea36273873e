//! Command-line argument parsing
//!
//! Every flag here overlays [`parkranger_core::Config`] on top of whatever a
//! `--config` TOML file and `PARKRANGER_*` environment variables already
//! produced (§6's configuration table); CLI flags win last.

use clap::Parser;
use std::path::PathBuf;

/// ParkRanger - passive/active RTT VPN fingerprinting
///
/// Observes TCP handshake timing and active ICMP probes for peers this host
/// talks to, compares the two round-trip estimates, and infers whether a
/// peer is likely terminating a VPN tunnel along with a ranked list of
/// candidate real-world exit cities.
#[derive(Parser, Debug)]
#[command(
    name = "parkranger",
    version,
    about = "Passive/active RTT VPN fingerprinting engine",
    after_help = "EXAMPLES:\n\
    # Auto-select interface, default ports\n\
    sudo parkranger\n\n\
    # Pin a capture interface and port set\n\
    sudo parkranger --interface eth0 --ports 80,443,8080\n\n\
    # Point at a local GeoIP database instead of relying on HTTP providers\n\
    sudo parkranger --geoip-db /usr/share/GeoIP/GeoLite2-City.mmdb\n\n\
    # Subtract a known baseline offset before estimating distance\n\
    sudo parkranger --vpn-latency-offset-ms 5"
)]
pub struct Args {
    /// Capture interface name; auto-selects the first non-loopback, up
    /// interface when omitted.
    #[arg(long)]
    pub interface: Option<String>,

    /// Comma-separated list of TCP ports to observe. Defaults to 80, 443,
    /// 8080, 8443 when neither this flag nor a config file/environment
    /// variable sets it.
    #[arg(long, value_delimiter = ',')]
    pub ports: Option<Vec<u16>>,

    /// Per-probe ICMP timeout, in seconds.
    #[arg(long)]
    pub ping_timeout: Option<f64>,

    /// Number of ICMP probes per measurement.
    #[arg(long)]
    pub ping_count: Option<u32>,

    /// Idle connection eviction threshold, in seconds.
    #[arg(long)]
    pub connection_timeout: Option<u64>,

    /// Upper bound on the connection table size.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Path to a local MaxMind-style GeoIP database file.
    #[arg(long)]
    pub geoip_db_path: Option<PathBuf>,

    /// Fiber propagation constant used to convert one-way delay to distance,
    /// in km/ms.
    #[arg(long)]
    pub speed_of_light_km_ms: Option<f64>,

    /// Subtracted from the measured RTT difference before estimating
    /// distance, in milliseconds.
    #[arg(long)]
    pub vpn_latency_offset_ms: Option<f64>,

    /// Path to a TOML configuration file, overlaid before these flags.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file; defaults to `~/.parkranger/parkranger.db`.
    #[arg(long)]
    pub database_path: Option<PathBuf>,

    /// List detected network interfaces and exit.
    #[arg(long)]
    pub list_interfaces: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Overlays this CLI invocation's explicitly-set flags onto `config`.
    /// Flags left at their default `None`/empty leave the existing value
    /// (which may already have come from a config file or environment
    /// variable) untouched.
    pub fn apply_to(&self, config: &mut parkranger_core::Config) {
        if self.interface.is_some() {
            config.capture.interface = self.interface.clone();
        }
        if let Some(ports) = &self.ports {
            config.capture.port_filter = ports.clone();
        }
        if let Some(v) = self.ping_timeout {
            config.rtt.ping_timeout_secs = v;
        }
        if let Some(v) = self.ping_count {
            config.rtt.ping_count = v;
        }
        if let Some(v) = self.connection_timeout {
            config.capture.connection_timeout_secs = v;
        }
        if let Some(v) = self.max_connections {
            config.capture.max_connections = v;
        }
        if self.geoip_db_path.is_some() {
            config.geo.geoip_db_path = self.geoip_db_path.clone();
        }
        if let Some(v) = self.speed_of_light_km_ms {
            config.rtt.speed_of_light_km_ms = v;
        }
        if let Some(v) = self.vpn_latency_offset_ms {
            config.rtt.vpn_latency_offset_ms = v;
        }
        if self.database_path.is_some() {
            config.store.database_path = self.database_path.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn unset_ports_flag_leaves_config_defaults_in_place() {
        let args = Args::parse_from(["parkranger"]);
        assert!(args.ports.is_none());
        let mut config = parkranger_core::Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.capture.port_filter, vec![80, 443, 8080, 8443]);
    }

    #[test]
    fn explicit_ports_flag_overrides_config_default() {
        let args = Args::parse_from(["parkranger", "--ports", "22,8022"]);
        let mut config = parkranger_core::Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.capture.port_filter, vec![22, 8022]);
    }

    #[test]
    fn explicit_flag_overrides_config_default() {
        let args = Args::parse_from(["parkranger", "--vpn-latency-offset-ms", "5"]);
        let mut config = parkranger_core::Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.rtt.vpn_latency_offset_ms, 5.0);
    }

    #[test]
    fn unset_flag_leaves_config_default_in_place() {
        let args = Args::parse_from(["parkranger"]);
        let mut config = parkranger_core::Config::default();
        let original_offset = config.rtt.vpn_latency_offset_ms;
        args.apply_to(&mut config);
        assert_eq!(config.rtt.vpn_latency_offset_ms, original_offset);
    }
}
