//! Configuration management for ParkRanger

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub rtt: RttConfig,
    pub geo: GeoConfig,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capture: CaptureConfig::default(),
            rtt: RttConfig::default(),
            geo: GeoConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
        Self::load_from_str(&contents)
    }

    /// Load configuration from a TOML string
    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `PARKRANGER_*` environment variables onto this configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PARKRANGER_INTERFACE") {
            self.capture.interface = Some(v);
        }
        if let Ok(v) = std::env::var("PARKRANGER_PORTS") {
            if let Some(ports) = parse_port_list(&v) {
                self.capture.port_filter = ports;
            }
        }
        if let Ok(v) = std::env::var("PARKRANGER_PING_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.rtt.ping_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PARKRANGER_PING_COUNT") {
            if let Ok(n) = v.parse() {
                self.rtt.ping_count = n;
            }
        }
        if let Ok(v) = std::env::var("PARKRANGER_CONN_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.capture.connection_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PARKRANGER_MAX_CONNS") {
            if let Ok(n) = v.parse() {
                self.capture.max_connections = n;
            }
        }
        if let Ok(v) = std::env::var("PARKRANGER_GEOIP_DB") {
            self.geo.geoip_db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PARKRANGER_VPN_LATENCY_OFFSET") {
            if let Ok(n) = v.parse() {
                self.rtt.vpn_latency_offset_ms = n;
            }
        }
        if let Ok(v) = std::env::var("PARKRANGER_SPEED_OF_LIGHT_KM_MS") {
            if let Ok(n) = v.parse() {
                self.rtt.speed_of_light_km_ms = n;
            }
        }
    }

    /// Validate configuration; malformed values are rejected rather than
    /// silently clamped, so the caller can fall back to defaults (§7: input
    /// defect handling).
    pub fn validate(&self) -> Result<()> {
        if self.rtt.ping_timeout_secs <= 0.0 {
            return Err(Error::Config("ping_timeout must be greater than 0".into()));
        }
        if self.rtt.ping_count == 0 {
            return Err(Error::Config("ping_count must be greater than 0".into()));
        }
        if self.capture.max_connections == 0 {
            return Err(Error::Config("max_connections must be greater than 0".into()));
        }
        if self.rtt.vpn_latency_offset_ms < 0.0 {
            return Err(Error::Config(
                "vpn_latency_offset_ms cannot be negative".into(),
            ));
        }
        if self.rtt.speed_of_light_km_ms <= 0.0 {
            return Err(Error::Config(
                "speed_of_light_km_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Packet capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture interface name; `None` auto-selects the first non-loopback, up interface.
    pub interface: Option<String>,
    pub port_filter: Vec<u16>,
    pub connection_timeout_secs: u64,
    pub max_connections: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: None,
            port_filter: vec![80, 443, 8080, 8443],
            connection_timeout_secs: 300,
            max_connections: 1000,
        }
    }
}

impl CaptureConfig {
    /// BPF filter string for this port list, e.g. `"tcp and (port 80 or port 443)"`.
    pub fn bpf_filter(&self) -> String {
        if self.port_filter.is_empty() {
            return "tcp".to_string();
        }
        let conditions = self
            .port_filter
            .iter()
            .map(|p| format!("port {}", p))
            .collect::<Vec<_>>()
            .join(" or ");
        format!("tcp and ({})", conditions)
    }
}

/// RTT sensing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RttConfig {
    pub ping_timeout_secs: f64,
    pub ping_count: u32,
    pub ping_cache_ttl_secs: f64,
    pub handshake_timeout_secs: f64,
    pub speed_of_light_km_ms: f64,
    pub vpn_latency_offset_ms: f64,
}

impl Default for RttConfig {
    fn default() -> Self {
        RttConfig {
            ping_timeout_secs: 2.0,
            ping_count: 3,
            ping_cache_ttl_secs: 60.0,
            handshake_timeout_secs: 30.0,
            speed_of_light_km_ms: 200.0,
            vpn_latency_offset_ms: 0.0,
        }
    }
}

/// Geolocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    pub geoip_db_path: Option<PathBuf>,
    pub memory_cache_ttl_secs: f64,
    pub disk_cache_ttl_secs: f64,
    pub http_timeout_secs: f64,
    pub min_city_population: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            geoip_db_path: None,
            memory_cache_ttl_secs: 3600.0,
            disk_cache_ttl_secs: 86400.0,
            http_timeout_secs: 5.0,
            min_city_population: 100_000,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: Option<PathBuf>,
    pub fingerprint_max_age_secs: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database_path: None,
            fingerprint_max_age_secs: 86400.0,
        }
    }
}

/// Returns the per-user data directory, e.g. `~/.parkranger/`.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parkranger")
}

fn parse_port_list(s: &str) -> Option<Vec<u16>> {
    let ports: std::result::Result<Vec<u16>, _> = s.split(',').map(|p| p.trim().parse()).collect();
    ports.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_ping_timeout_is_rejected() {
        let mut config = Config::default();
        config.rtt.ping_timeout_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bpf_filter_for_default_ports() {
        let config = CaptureConfig::default();
        assert_eq!(
            config.bpf_filter(),
            "tcp and (port 80 or port 443 or port 8080 or port 8443)"
        );
    }

    #[test]
    fn bpf_filter_with_no_ports_is_bare_tcp() {
        let config = CaptureConfig {
            port_filter: vec![],
            ..CaptureConfig::default()
        };
        assert_eq!(config.bpf_filter(), "tcp");
    }

    #[test]
    fn env_override_applies_ports() {
        std::env::set_var("PARKRANGER_PORTS", "22,8022");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.capture.port_filter, vec![22, 8022]);
        std::env::remove_var("PARKRANGER_PORTS");
    }

    #[test]
    fn load_from_str_round_trips_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let loaded = Config::load_from_str(&toml_str).unwrap();
        assert_eq!(loaded.capture.port_filter, config.capture.port_filter);
    }
}
