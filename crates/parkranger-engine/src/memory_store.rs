//! In-memory `FingerprintStore` test double
//!
//! No I/O, no schema, no durability across restarts — a drop-in replacement
//! for [`crate::sqlite_store::SqliteStore`] in tests that only care about the
//! fusion logic, mirroring `prtip-scanner::MemoryStorage`'s role relative to
//! `ScanStorage`.

use parkranger_core::store::{CachedGeoLocation, FingerprintStore};
use parkranger_core::types::unix_now;
use parkranger_core::{GeoLocation, Result, VPNFingerprint};
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct MemoryStore {
    fingerprints: RwLock<HashMap<String, VPNFingerprint>>,
    geo_cache: RwLock<HashMap<String, CachedGeoLocation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            fingerprints: RwLock::new(HashMap::new()),
            geo_cache: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FingerprintStore for MemoryStore {
    async fn save_fingerprint(&self, fingerprint: &VPNFingerprint) -> Result<()> {
        self.fingerprints
            .write()
            .insert(fingerprint.ip.clone(), fingerprint.clone());
        Ok(())
    }

    async fn load_all_fingerprints(&self) -> Result<Vec<VPNFingerprint>> {
        Ok(self.fingerprints.read().values().cloned().collect())
    }

    async fn delete_fingerprint(&self, ip: &str) -> Result<()> {
        self.fingerprints.write().remove(ip);
        Ok(())
    }

    async fn cleanup_old_fingerprints(&self, max_age_secs: f64) -> Result<u64> {
        let now = unix_now();
        let mut fingerprints = self.fingerprints.write();
        let before = fingerprints.len();
        fingerprints.retain(|_, fp| now - fp.last_updated <= max_age_secs);
        Ok((before - fingerprints.len()) as u64)
    }

    async fn save_geo_cache(&self, ip: &str, location: &GeoLocation) -> Result<()> {
        self.geo_cache.write().insert(
            ip.to_string(),
            CachedGeoLocation {
                location: location.clone(),
                cached_at: unix_now(),
            },
        );
        Ok(())
    }

    async fn load_geo_cache(&self, max_age_secs: f64) -> Result<Vec<CachedGeoLocation>> {
        let now = unix_now();
        Ok(self
            .geo_cache
            .read()
            .values()
            .filter(|c| now - c.cached_at <= max_age_secs)
            .cloned()
            .collect())
    }
}
