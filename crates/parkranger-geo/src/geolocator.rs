//! Tiered IP geolocation (§4.3)
//!
//! Resolution order: private/loopback addresses are skipped outright, then
//! an in-memory TTL cache, then the local MaxMind-style database (if one was
//! opened), then each configured HTTP [`GeoProvider`] in turn. A hit at any
//! tier is written back into the memory cache and handed to the caller for
//! durable persistence (the geo-cache table is owned by `parkranger-engine`,
//! not this crate, per the same layering `prtip-scanner::storage` uses to
//! keep its backends ignorant of the scanner loop above them).

use crate::geoip_db::LocalGeoDatabase;
use crate::providers::GeoProvider;
use parkranger_core::GeoLocation;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

fn is_private_or_loopback(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

struct CacheEntry {
    location: GeoLocation,
    cached_at: f64,
}

/// Orchestrates the local-database/HTTP-provider lookup chain behind a
/// single in-memory TTL cache.
pub struct Geolocator {
    local_db: LocalGeoDatabase,
    providers: Vec<Box<dyn GeoProvider>>,
    cache: Arc<Mutex<HashMap<IpAddr, CacheEntry>>>,
    cache_ttl_secs: f64,
}

impl Geolocator {
    pub fn new(
        local_db: LocalGeoDatabase,
        providers: Vec<Box<dyn GeoProvider>>,
        cache_ttl_secs: f64,
    ) -> Self {
        Geolocator {
            local_db,
            providers,
            cache: Arc::new(Mutex::new(HashMap::new())),
            cache_ttl_secs,
        }
    }

    /// `true` iff a local MaxMind-style database was successfully opened
    /// (§4.3: reported for UI/telemetry).
    pub fn has_local_database(&self) -> bool {
        self.local_db.is_available()
    }

    /// Seeds the memory cache from durably persisted rows at startup, so a
    /// restart doesn't immediately re-hit every HTTP provider for peers
    /// already known (§10.3: geo-cache persistence with its own TTL).
    pub fn seed_cache(&self, entries: impl IntoIterator<Item = (String, GeoLocation, f64)>) {
        let mut cache = self.cache.lock();
        for (ip_str, location, cached_at) in entries {
            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                cache.insert(ip, CacheEntry { location, cached_at });
            }
        }
    }

    /// Resolves `ip` to a location, or `None` if it is private/loopback or
    /// every tier missed. On a fresh (non-cache) hit, the location is also
    /// returned so the caller can persist it to the durable geo-cache.
    pub async fn locate(&self, ip: IpAddr) -> Option<GeoLocation> {
        if is_private_or_loopback(&ip) {
            return None;
        }

        let now = unix_now();
        if let Some(entry) = self.cache.lock().get(&ip) {
            if now - entry.cached_at <= self.cache_ttl_secs {
                return Some(entry.location.clone());
            }
        }

        if let Some(location) = self.local_db.lookup(ip) {
            self.cache.lock().insert(
                ip,
                CacheEntry {
                    location: location.clone(),
                    cached_at: now,
                },
            );
            return Some(location);
        }

        for provider in &self.providers {
            if let Some(location) = provider.lookup(ip).await {
                debug!("{} resolved {}", provider.name(), ip);
                self.cache.lock().insert(
                    ip,
                    CacheEntry {
                        location: location.clone(),
                        cached_at: now,
                    },
                );
                return Some(location);
            }
        }

        None
    }

    /// Drops cache entries older than `max_age_secs`; returns the number removed.
    pub fn cleanup_cache(&self, max_age_secs: f64) -> usize {
        let now = unix_now();
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| now - entry.cached_at <= max_age_secs);
        before - cache.len()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}
