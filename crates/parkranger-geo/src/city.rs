//! City database and great-circle distance queries
//!
//! Loaded once at startup from a bundled populated-places CSV (embedded at
//! compile time with `include_str!`, the same bundled-dataset idiom as
//! `prtip-core::service_db`'s `nmap-service-probes` and `os_db`'s
//! `os-db-subset.txt`), filtered to cities at or above a minimum population
//! (§4.4). All distance math uses the haversine formula on a sphere of
//! radius 6371 km, matching `geo/cities.py`'s `haversine_distance`.

use parkranger_core::{City, CityMatch};

const EMBEDDED_CITIES_CSV: &str = include_str!("../data/cities.csv");

/// Mean Earth radius in kilometers, as used throughout the distance/ring math.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// In-memory, immutable-after-load database of populated places.
#[derive(Debug, Clone)]
pub struct CityFinder {
    cities: Vec<City>,
}

impl CityFinder {
    /// Loads the bundled dataset, keeping only cities with
    /// `population >= min_population` (default 100,000, §4.4).
    pub fn load(min_population: u64) -> Self {
        let cities = parse_csv(EMBEDDED_CITIES_CSV)
            .into_iter()
            .filter(|c| c.population >= min_population)
            .collect();
        CityFinder { cities }
    }

    /// Builds a finder from an explicit city list; used by tests that need
    /// deterministic, hand-picked cities rather than the full bundled set.
    pub fn from_cities(cities: Vec<City>) -> Self {
        CityFinder { cities }
    }

    /// Number of cities held after the population filter (§10.3: `get_city_count`).
    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    /// Great-circle distance between two points, in kilometers.
    pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let lat1_rad = lat1.to_radians();
        let lat2_rad = lat2.to_radians();
        let delta_lat = (lat2 - lat1).to_radians();
        let delta_lon = (lon2 - lon1).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// The single closest city to `(lat, lon)`, or `None` if the database is empty.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<CityMatch> {
        self.cities
            .iter()
            .map(|city| {
                let distance =
                    Self::haversine_distance_km(lat, lon, city.latitude, city.longitude);
                CityMatch {
                    city: city.clone(),
                    distance_from_center_km: distance,
                }
            })
            .min_by(|a, b| {
                a.distance_from_center_km
                    .partial_cmp(&b.distance_from_center_km)
                    .unwrap()
            })
    }

    /// Cities within `radius_km` of `(lat, lon)`, sorted by population
    /// descending and truncated to `max_results`.
    pub fn within_radius(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        max_results: usize,
    ) -> Vec<CityMatch> {
        let mut matches: Vec<CityMatch> = self
            .cities
            .iter()
            .filter_map(|city| {
                let distance =
                    Self::haversine_distance_km(lat, lon, city.latitude, city.longitude);
                (distance <= radius_km).then_some(CityMatch {
                    city: city.clone(),
                    distance_from_center_km: distance,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.city.population.cmp(&a.city.population));
        matches.truncate(max_results);
        matches
    }

    /// Cities whose distance from `(lat, lon)` is within `tolerance_km` of
    /// `ring_radius_km`, sorted by population descending, breaking ties by
    /// closeness to the ring, and truncated to `max_results` (§4.4, §4.5).
    pub fn near_ring(
        &self,
        lat: f64,
        lon: f64,
        ring_radius_km: f64,
        tolerance_km: f64,
        max_results: usize,
    ) -> Vec<CityMatch> {
        let mut matches: Vec<CityMatch> = self
            .cities
            .iter()
            .filter_map(|city| {
                let distance =
                    Self::haversine_distance_km(lat, lon, city.latitude, city.longitude);
                let distance_from_ring = (distance - ring_radius_km).abs();
                (distance_from_ring <= tolerance_km).then_some(CityMatch {
                    city: city.clone(),
                    distance_from_center_km: distance,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.city.population.cmp(&a.city.population).then_with(|| {
                let a_ring = (a.distance_from_center_km - ring_radius_km).abs();
                let b_ring = (b.distance_from_center_km - ring_radius_km).abs();
                a_ring.partial_cmp(&b_ring).unwrap()
            })
        });
        matches.truncate(max_results);
        matches
    }
}

fn parse_csv(contents: &str) -> Vec<City> {
    let mut cities = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if i == 0 || line.trim().is_empty() {
            continue; // header row
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 6 {
            continue; // malformed row discarded (§7: input defect)
        }
        let (Ok(latitude), Ok(longitude), Ok(population)) = (
            fields[3].parse::<f64>(),
            fields[4].parse::<f64>(),
            fields[5].parse::<u64>(),
        ) else {
            continue;
        };
        cities.push(City {
            name: fields[0].to_string(),
            country: fields[1].to_string(),
            country_code: fields[2].to_string(),
            latitude,
            longitude,
            population,
        });
    }
    cities
}
