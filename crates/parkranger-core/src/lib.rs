//! ParkRanger Core Library
//!
//! Shared types, configuration, error handling, and the event bus for the
//! ParkRanger passive/active RTT VPN fingerprinting engine.
//!
//! # Examples
//!
//! ```
//! use parkranger_core::{Config, FlowKey};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let config = Config::default();
//! assert!(config.validate().is_ok());
//!
//! let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
//! let b = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5));
//! let key = FlowKey::new(a, 54321, b, 443);
//! assert_eq!(key, FlowKey::new(b, 443, a, 54321));
//! ```

pub mod config;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod store;
pub mod types;

pub use config::{CaptureConfig, Config, GeoConfig, RttConfig, StoreConfig};
pub use error::{Error, Result};
pub use event_bus::EventBus;
pub use events::ParkRangerEvent;
pub use store::{CachedGeoLocation, FingerprintStore};
pub use types::{
    City, CityMatch, Connection, ConnectionState, FlowKey, GeoLocation, RTTSnapshot,
    VPNFingerprint,
};
