//! Local MaxMind-style city database lookup (§4.3, §6)
//!
//! A thin wrapper around `maxminddb::Reader`, in the style of
//! `pknull-termart::net_geo::GeoIpLookup`: the reader is opened once at
//! startup and every subsequent lookup is an in-process B-tree search with
//! no I/O.

use maxminddb::geoip2;
use parkranger_core::GeoLocation;
use std::net::IpAddr;
use std::path::Path;
use tracing::warn;

/// Local database lookup, backed by a MaxMind-compatible `.mmdb` file.
pub struct LocalGeoDatabase {
    reader: Option<maxminddb::Reader<Vec<u8>>>,
}

impl LocalGeoDatabase {
    /// Opens `path` if given; a missing path, missing file, or unparseable
    /// database degrades to "no local database" rather than a fatal error
    /// (§7: input defect / transient external handling apply identically
    /// here — the local tier is just as optional as the HTTP tiers).
    pub fn open(path: Option<&Path>) -> Self {
        let reader = path.and_then(|p| match maxminddb::Reader::open_readfile(p) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("failed to open GeoIP database {:?}: {}", p, e);
                None
            }
        });
        LocalGeoDatabase { reader }
    }

    /// `true` iff a local database was successfully loaded (§4.3: reported
    /// for UI/telemetry).
    pub fn is_available(&self) -> bool {
        self.reader.is_some()
    }

    pub fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        let reader = self.reader.as_ref()?;
        let city: geoip2::City = reader.lookup(ip).ok()?;
        let location = city.location?;
        let latitude = location.latitude?;
        let longitude = location.longitude?;

        let city_name = city
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|n| n.get("en"))
            .map(|s| s.to_string());
        let region_name = city
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|s| s.names.as_ref())
            .and_then(|n| n.get("en"))
            .map(|s| s.to_string());
        let country_name = city
            .country
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|n| n.get("en"))
            .map(|s| s.to_string());
        let country_code = city
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(|s| s.to_string());

        Some(GeoLocation {
            ip: ip.to_string(),
            latitude,
            longitude,
            city: city_name,
            region: region_name,
            country: country_name,
            country_code,
            isp: None,
            org: None,
            timezone: None,
        })
    }
}
