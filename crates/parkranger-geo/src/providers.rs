//! HTTP geolocation provider contracts (§4.3, §6, §9: `GeoProvider` capability)
//!
//! Each provider is a thin, swappable collaborator behind one method:
//! `lookup(ip) -> Option<GeoLocation>`. Network, HTTP-status, and parse
//! errors are all treated as a miss for that tier (§7: transient external
//! failures are swallowed, never propagated).

use async_trait::async_trait;
use parkranger_core::GeoLocation;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "parkranger/1.0 (+https://github.com/B00TK1D/parkranger)";

/// A geolocation data source tried in sequence by [`crate::Geolocator`].
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Option<GeoLocation>;
    fn name(&self) -> &'static str;
}

fn http_client(timeout_secs: f64) -> Option<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs_f64(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .ok()
}

/// `ip-api.com` — free, no API key; success iff `status == "success"` (§6).
pub struct IpApiProvider {
    timeout_secs: f64,
}

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    isp: Option<String>,
    org: Option<String>,
}

impl IpApiProvider {
    pub fn new(timeout_secs: f64) -> Self {
        IpApiProvider { timeout_secs }
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    fn name(&self) -> &'static str {
        "ip-api.com"
    }

    async fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        let client = http_client(self.timeout_secs)?;
        let url = format!(
            "http://ip-api.com/json/{}?fields=status,message,country,countryCode,region,regionName,city,lat,lon,timezone,isp,org",
            ip
        );
        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("ip-api.com request failed for {}: {}", ip, e);
                return None;
            }
        };
        let body: IpApiResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                debug!("ip-api.com response unparseable for {}: {}", ip, e);
                return None;
            }
        };
        if body.status != "success" {
            return None;
        }
        Some(GeoLocation {
            ip: ip.to_string(),
            latitude: body.lat.unwrap_or(0.0),
            longitude: body.lon.unwrap_or(0.0),
            city: body.city,
            region: body.region_name,
            country: body.country,
            country_code: body.country_code,
            isp: body.isp,
            org: body.org,
            timezone: body.timezone,
        })
    }
}

/// `ipinfo.io` — success iff the response has a `loc` field of the form
/// `"lat,lon"` (§6).
pub struct IpInfoProvider {
    timeout_secs: f64,
}

#[derive(Deserialize)]
struct IpInfoResponse {
    loc: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    org: Option<String>,
    timezone: Option<String>,
}

impl IpInfoProvider {
    pub fn new(timeout_secs: f64) -> Self {
        IpInfoProvider { timeout_secs }
    }
}

#[async_trait]
impl GeoProvider for IpInfoProvider {
    fn name(&self) -> &'static str {
        "ipinfo.io"
    }

    async fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        let client = http_client(self.timeout_secs)?;
        let url = format!("https://ipinfo.io/{}/json", ip);
        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("ipinfo.io request failed for {}: {}", ip, e);
                return None;
            }
        };
        let body: IpInfoResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                debug!("ipinfo.io response unparseable for {}: {}", ip, e);
                return None;
            }
        };
        let loc = body.loc?;
        let (lat_str, lon_str) = loc.split_once(',')?;
        let latitude: f64 = lat_str.trim().parse().ok()?;
        let longitude: f64 = lon_str.trim().parse().ok()?;
        Some(GeoLocation {
            ip: ip.to_string(),
            latitude,
            longitude,
            city: body.city,
            region: body.region,
            country: body.country,
            country_code: None,
            isp: None,
            org: body.org,
            timezone: body.timezone,
        })
    }
}
