//! ParkRanger Geo
//!
//! IP geolocation (tiered local-database/HTTP lookup behind a TTL cache,
//! §4.3) and populated-places city matching (§4.4).

pub mod city;
pub mod geoip_db;
pub mod geolocator;
pub mod providers;

pub use city::CityFinder;
pub use geoip_db::LocalGeoDatabase;
pub use geolocator::Geolocator;
pub use providers::{GeoProvider, IpApiProvider, IpInfoProvider};
