//! ParkRanger Engine
//!
//! Fuses RTT measurements with geolocation and city data into confidence-scored
//! fingerprints ([`fingerprint_engine::FingerprintEngine`]), persists them durably
//! ([`sqlite_store::SqliteStore`], with an in-memory test double in
//! [`memory_store::MemoryStore`]), and runs the background janitor and prober
//! sweeps (§4.5, §4.6, §5).

pub mod fingerprint_engine;
pub mod janitor;
pub mod memory_store;
pub mod prober;
pub mod sqlite_store;

pub use fingerprint_engine::FingerprintEngine;
pub use janitor::JanitorConfig;
pub use memory_store::MemoryStore;
pub use prober::ProberConfig;
pub use sqlite_store::SqliteStore;
