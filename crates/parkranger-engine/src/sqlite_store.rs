//! SQLite-backed durable persistence (§4.6)
//!
//! Two tables: `fingerprints` (one row per peer IP, location and
//! possible_cities serialized as JSON text, `is_vpn_likely` as a 0/1
//! integer) and `geo_cache` (one row per peer IP, flattened `GeoLocation`
//! fields plus `cached_at`). WAL mode and the pragma set are adopted
//! verbatim from `prtip-scanner::storage::ScanStorage`.

use async_trait::async_trait;
use parkranger_core::store::{CachedGeoLocation, FingerprintStore};
use parkranger_core::types::unix_now;
use parkranger_core::{Error, GeoLocation, Result, VPNFingerprint};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `database_path`, applies
    /// performance pragmas, and ensures the schema exists.
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let path_str = database_path.as_ref().to_string_lossy().to_string();

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
            .map_err(|e| Error::Storage(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to database: {}", e)))?;

        info!("Connected to SQLite database: {}", path_str);

        let store = SqliteStore { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        debug!("Initializing ParkRanger database schema");

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("PRAGMA cache_size = -64000")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("PRAGMA busy_timeout = 10000")
            .execute(&self.pool)
            .await
            .ok();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fingerprints (
                ip TEXT PRIMARY KEY,
                location_json TEXT,
                tcp_rtt_ms REAL,
                icmp_rtt_ms REAL,
                rtt_difference_ms REAL,
                estimated_distance_km REAL,
                possible_cities_json TEXT NOT NULL,
                confidence REAL NOT NULL,
                last_updated REAL NOT NULL,
                is_vpn_likely INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create fingerprints table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS geo_cache (
                ip TEXT PRIMARY KEY,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                city TEXT,
                region TEXT,
                country TEXT,
                country_code TEXT,
                isp TEXT,
                org TEXT,
                timezone TEXT,
                cached_at REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create geo_cache table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_last_updated ON fingerprints(last_updated)")
            .execute(&self.pool)
            .await
            .ok();

        debug!("ParkRanger database schema initialized");
        Ok(())
    }
}

#[async_trait]
impl FingerprintStore for SqliteStore {
    async fn save_fingerprint(&self, fingerprint: &VPNFingerprint) -> Result<()> {
        let location_json = match &fingerprint.location {
            Some(loc) => Some(serde_json::to_string(loc)?),
            None => None,
        };
        let cities_json = serde_json::to_string(&fingerprint.possible_cities)?;

        sqlx::query(
            r#"
            INSERT INTO fingerprints
                (ip, location_json, tcp_rtt_ms, icmp_rtt_ms, rtt_difference_ms,
                 estimated_distance_km, possible_cities_json, confidence, last_updated, is_vpn_likely)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip) DO UPDATE SET
                location_json = excluded.location_json,
                tcp_rtt_ms = excluded.tcp_rtt_ms,
                icmp_rtt_ms = excluded.icmp_rtt_ms,
                rtt_difference_ms = excluded.rtt_difference_ms,
                estimated_distance_km = excluded.estimated_distance_km,
                possible_cities_json = excluded.possible_cities_json,
                confidence = excluded.confidence,
                last_updated = excluded.last_updated,
                is_vpn_likely = excluded.is_vpn_likely
            "#,
        )
        .bind(&fingerprint.ip)
        .bind(location_json)
        .bind(fingerprint.tcp_rtt_ms)
        .bind(fingerprint.icmp_rtt_ms)
        .bind(fingerprint.rtt_difference_ms)
        .bind(fingerprint.estimated_distance_km)
        .bind(cities_json)
        .bind(fingerprint.confidence)
        .bind(fingerprint.last_updated)
        .bind(fingerprint.is_vpn_likely as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to save fingerprint: {}", e)))?;

        Ok(())
    }

    async fn load_all_fingerprints(&self) -> Result<Vec<VPNFingerprint>> {
        let rows = sqlx::query(
            r#"
            SELECT ip, location_json, tcp_rtt_ms, icmp_rtt_ms, rtt_difference_ms,
                   estimated_distance_km, possible_cities_json, confidence, last_updated, is_vpn_likely
            FROM fingerprints
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to load fingerprints: {}", e)))?;

        let mut fingerprints = Vec::with_capacity(rows.len());
        for row in rows {
            let location_json: Option<String> = row.get(1);
            let location = match location_json {
                Some(s) => Some(serde_json::from_str(&s)?),
                None => None,
            };
            let cities_json: String = row.get(6);
            let possible_cities = serde_json::from_str(&cities_json).unwrap_or_default();
            let is_vpn_likely: i64 = row.get(9);

            fingerprints.push(VPNFingerprint {
                ip: row.get(0),
                location,
                tcp_rtt_ms: row.get(2),
                icmp_rtt_ms: row.get(3),
                rtt_difference_ms: row.get(4),
                estimated_distance_km: row.get(5),
                possible_cities,
                confidence: row.get(7),
                last_updated: row.get(8),
                is_vpn_likely: is_vpn_likely != 0,
            });
        }

        Ok(fingerprints)
    }

    async fn delete_fingerprint(&self, ip: &str) -> Result<()> {
        sqlx::query("DELETE FROM fingerprints WHERE ip = ?")
            .bind(ip)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete fingerprint: {}", e)))?;
        Ok(())
    }

    async fn cleanup_old_fingerprints(&self, max_age_secs: f64) -> Result<u64> {
        let cutoff = unix_now() - max_age_secs;
        let result = sqlx::query("DELETE FROM fingerprints WHERE last_updated < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to clean up fingerprints: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn save_geo_cache(&self, ip: &str, location: &GeoLocation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO geo_cache
                (ip, lat, lon, city, region, country, country_code, isp, org, timezone, cached_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip) DO UPDATE SET
                lat = excluded.lat,
                lon = excluded.lon,
                city = excluded.city,
                region = excluded.region,
                country = excluded.country,
                country_code = excluded.country_code,
                isp = excluded.isp,
                org = excluded.org,
                timezone = excluded.timezone,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(ip)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(&location.city)
        .bind(&location.region)
        .bind(&location.country)
        .bind(&location.country_code)
        .bind(&location.isp)
        .bind(&location.org)
        .bind(&location.timezone)
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to save geo cache entry: {}", e)))?;

        Ok(())
    }

    async fn load_geo_cache(&self, max_age_secs: f64) -> Result<Vec<CachedGeoLocation>> {
        let cutoff = unix_now() - max_age_secs;
        let rows = sqlx::query(
            r#"
            SELECT ip, lat, lon, city, region, country, country_code, isp, org, timezone, cached_at
            FROM geo_cache
            WHERE cached_at >= ?
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to load geo cache: {}", e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let ip: String = row.get(0);
            entries.push(CachedGeoLocation {
                location: GeoLocation {
                    ip,
                    latitude: row.get(1),
                    longitude: row.get(2),
                    city: row.get(3),
                    region: row.get(4),
                    country: row.get(5),
                    country_code: row.get(6),
                    isp: row.get(7),
                    org: row.get(8),
                    timezone: row.get(9),
                },
                cached_at: row.get(10),
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parkranger-test.db");
        let store = SqliteStore::new(&path).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn save_and_reload_fingerprint_round_trips() {
        let (store, _dir) = temp_store().await;
        let mut fp = VPNFingerprint::new("203.0.113.5");
        fp.tcp_rtt_ms = Some(42.0);
        fp.confidence = 0.6;
        store.save_fingerprint(&fp).await.unwrap();

        let all = store.load_all_fingerprints().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].ip, "203.0.113.5");
        assert_eq!(all[0].tcp_rtt_ms, Some(42.0));
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_row() {
        let (store, _dir) = temp_store().await;
        let mut fp = VPNFingerprint::new("203.0.113.5");
        fp.confidence = 0.1;
        store.save_fingerprint(&fp).await.unwrap();
        fp.confidence = 0.9;
        store.save_fingerprint(&fp).await.unwrap();

        let all = store.load_all_fingerprints().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let (store, _dir) = temp_store().await;
        store
            .save_fingerprint(&VPNFingerprint::new("203.0.113.5"))
            .await
            .unwrap();
        store.delete_fingerprint("203.0.113.5").await.unwrap();
        assert!(store.load_all_fingerprints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn geo_cache_round_trips_and_respects_max_age() {
        let (store, _dir) = temp_store().await;
        let loc = GeoLocation {
            ip: "203.0.113.5".into(),
            latitude: 48.8566,
            longitude: 2.3522,
            city: Some("Paris".into()),
            region: None,
            country: Some("France".into()),
            country_code: Some("FR".into()),
            isp: None,
            org: None,
            timezone: None,
        };
        store.save_geo_cache("203.0.113.5", &loc).await.unwrap();
        let fresh = store.load_geo_cache(3600.0).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].location.city.as_deref(), Some("Paris"));
        let expired = store.load_geo_cache(0.0).await.unwrap();
        assert!(expired.is_empty());
    }
}
