//! Persistence contract
//!
//! [`FingerprintStore`] describes the durable key-value contract the
//! fingerprint engine depends on (§4.6), independent of the backing
//! implementation. `parkranger-engine` provides a `sqlx`-backed
//! implementation for production use and an in-memory implementation for
//! tests, mirroring how the scanner workspace's `StorageBackend` abstracts
//! over memory vs SQLite result storage.

use crate::error::Result;
use crate::types::{GeoLocation, VPNFingerprint};
use async_trait::async_trait;

/// A cached geolocation row, including when it was cached (for TTL eviction).
#[derive(Debug, Clone)]
pub struct CachedGeoLocation {
    pub location: GeoLocation,
    pub cached_at: f64,
}

/// Durable persistence for fingerprints and the geolocation cache.
///
/// All writes are synchronous from the caller's perspective (committed
/// before the method returns); failures are the caller's responsibility to
/// swallow or log per §7 — this trait itself always surfaces them as
/// `Result::Err` so callers can choose.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn save_fingerprint(&self, fingerprint: &VPNFingerprint) -> Result<()>;
    async fn load_all_fingerprints(&self) -> Result<Vec<VPNFingerprint>>;
    async fn delete_fingerprint(&self, ip: &str) -> Result<()>;
    /// Deletes fingerprints whose `last_updated` is older than `max_age` seconds
    /// relative to now; returns the number deleted.
    async fn cleanup_old_fingerprints(&self, max_age_secs: f64) -> Result<u64>;

    async fn save_geo_cache(&self, ip: &str, location: &GeoLocation) -> Result<()>;
    /// Loads geo-cache rows cached within the last `max_age` seconds.
    async fn load_geo_cache(&self, max_age_secs: f64) -> Result<Vec<CachedGeoLocation>>;
}
