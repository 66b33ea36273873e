//! ParkRanger process bootstrap (§10.1)
//!
//! Wires the five pipeline stages — packet capture, RTT tracking, event bus,
//! fingerprint engine, and geolocation — into a single long-running process,
//! then drives them with a shared shutdown flag until Ctrl-C or a fatal
//! capture error ends the run.

mod args;
mod event_processor;
mod privilege;
mod sink;

use anyhow::{anyhow, Context, Result};
use args::Args;
use clap::Parser;
use parkranger_capture::{ConnectionTable, IcmpProber, LocalAddressSet, PacketObserver, RTTTracker};
use parkranger_core::{Config, EventBus, FingerprintStore};
use parkranger_engine::{FingerprintEngine, JanitorConfig, ProberConfig, SqliteStore};
use parkranger_geo::{CityFinder, GeoProvider, Geolocator, IpApiProvider, IpInfoProvider, LocalGeoDatabase};
use sink::{FingerprintSink, LoggingSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const EVENT_BUS_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if args.list_interfaces {
        list_interfaces();
        return Ok(());
    }

    if !privilege::running_as_root() {
        warn!("not running as root or with CAP_NET_RAW; opening the capture device will likely fail");
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path).context("loading --config file")?,
        None => Config::default(),
    };
    config.apply_env_overrides();
    args.apply_to(&mut config);
    config.validate().context("invalid configuration")?;

    let database_path = config
        .store
        .database_path
        .clone()
        .unwrap_or_else(|| parkranger_core::config::data_dir().join("parkranger.db"));
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {:?}", parent))?;
    }

    let store: Arc<dyn FingerprintStore> = Arc::new(
        SqliteStore::new(&database_path)
            .await
            .with_context(|| format!("opening persistence store at {:?}", database_path))?,
    );

    let prober = IcmpProber::new(config.rtt.ping_count, config.rtt.ping_timeout_secs);
    let rtt_tracker = RTTTracker::new(prober, config.rtt.ping_cache_ttl_secs);
    let local_addrs = LocalAddressSet::detect();
    let connections = ConnectionTable::new(config.capture.max_connections);
    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

    let local_db = LocalGeoDatabase::open(config.geo.geoip_db_path.as_deref());
    let providers: Vec<Box<dyn GeoProvider>> = vec![
        Box::new(IpApiProvider::new(config.geo.http_timeout_secs)),
        Box::new(IpInfoProvider::new(config.geo.http_timeout_secs)),
    ];
    let geolocator = Arc::new(Geolocator::new(
        local_db,
        providers,
        config.geo.memory_cache_ttl_secs,
    ));
    if !geolocator.has_local_database() {
        info!("no local GeoIP database configured; relying on HTTP providers");
    }

    let city_finder = Arc::new(CityFinder::load(config.geo.min_city_population));
    info!(cities = city_finder.city_count(), "loaded city database");

    let engine = FingerprintEngine::new(
        store,
        rtt_tracker.clone(),
        geolocator,
        city_finder,
        config.rtt.vpn_latency_offset_ms,
        config.rtt.speed_of_light_km_ms,
    );
    engine.rehydrate().await;

    let observer = PacketObserver::new(
        local_addrs,
        connections.clone(),
        rtt_tracker.clone(),
        event_bus.clone(),
    );
    let event_rx = event_bus.subscribe();
    let shutdown = Arc::new(AtomicBool::new(false));

    let bpf_filter = config.capture.bpf_filter();
    let interface = config.capture.interface.clone();
    let capture_observer = observer.clone();
    let capture_handle =
        tokio::task::spawn_blocking(move || capture_observer.run_capture_loop(interface.as_deref(), &bpf_filter));

    let sinks: Vec<Arc<dyn FingerprintSink>> = vec![Arc::new(LoggingSink)];
    let processor_handle = tokio::spawn(event_processor::run(
        event_rx,
        engine.clone(),
        event_bus.clone(),
        sinks,
        shutdown.clone(),
    ));

    let prober_handle = tokio::spawn(parkranger_engine::prober::run(
        connections.clone(),
        rtt_tracker.clone(),
        engine.clone(),
        ProberConfig { interval_secs: 10 },
        shutdown.clone(),
    ));

    let janitor_handle = tokio::spawn(parkranger_engine::janitor::run(
        connections,
        rtt_tracker,
        engine,
        JanitorConfig {
            interval_secs: 60,
            connection_max_age_secs: config.capture.connection_timeout_secs as f64,
            pending_syn_max_age_secs: config.rtt.handshake_timeout_secs,
            fingerprint_max_age_secs: config.store.fingerprint_max_age_secs,
        },
        shutdown.clone(),
    ));

    info!("parkranger running; press Ctrl-C to stop");

    let capture_result = tokio::select! {
        result = capture_handle => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            None
        }
    };

    observer.stop();
    shutdown.store(true, Ordering::SeqCst);

    let _ = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, processor_handle).await;
    let _ = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, prober_handle).await;
    let _ = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, janitor_handle).await;

    match capture_result {
        None => Ok(()),
        Some(Ok(Ok(()))) => {
            info!("capture loop exited cleanly");
            Ok(())
        }
        Some(Ok(Err(e))) => Err(anyhow!("capture failed: {}", e)),
        Some(Err(e)) => Err(anyhow!("capture task panicked: {}", e)),
    }
}

fn list_interfaces() {
    for iface in pnet_datalink::interfaces() {
        let addrs = iface
            .ips
            .iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{}{}{}",
            iface.name,
            if iface.is_up() { " [up]" } else { " [down]" },
            if addrs.is_empty() {
                String::new()
            } else {
                format!(" - {}", addrs)
            }
        );
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = match verbose {
        0 => "parkranger=info",
        1 => "parkranger=debug",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}
