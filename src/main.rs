use clap::Parser;
use miette::{IntoDiagnostic, Result};
use smartlocker::application::coordinator::{LockerService, Stores};
use smartlocker::application::devices::DeviceMonitor;
use smartlocker::config::{
    DEFAULT_OFFLINE_AFTER, DEFAULT_SWEEP_INTERVAL, ServiceConfig, load_billing_policy,
};
use smartlocker::domain::billing::BillingPolicy;
use smartlocker::domain::ports::{
    DeviceRegistry, LockerRegistry, OrderLedger, UnitOfWork, UserAccountStore,
};
use smartlocker::infrastructure::actuator::SimulatedActuator;
use smartlocker::infrastructure::auth::StaticAllowList;
use smartlocker::infrastructure::clock::SystemClock;
use smartlocker::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use smartlocker::infrastructure::rocksdb::RocksDBStore;
use smartlocker::interfaces::csv::locker_writer::LockerWriter;
use smartlocker::interfaces::jsonl::dispatcher::Dispatcher;
use smartlocker::interfaces::jsonl::request::RequestReader;
use smartlocker::interfaces::jsonl::response::ResponseWriter;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Request script, one JSON request per line
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Billing policy JSON file. Defaults to the built-in metered tariff.
    #[arg(long)]
    billing_config: Option<PathBuf>,

    /// Caller id allowed to run admin actions (repeatable)
    #[arg(long = "admin")]
    admins: Vec<String>,

    /// Timeout for a single door-open attempt, in milliseconds
    #[arg(long, default_value_t = 5000)]
    hardware_timeout_ms: u64,

    /// Extra door-open attempts after a failure
    #[arg(long, default_value_t = 0)]
    hardware_retries: u32,

    /// Write the final locker table to this CSV file
    #[arg(long)]
    lockers_out: Option<PathBuf>,
}

struct Runtime {
    service: LockerService,
    monitor: Arc<DeviceMonitor>,
}

fn build<S>(store: S, cli: &Cli, billing: BillingPolicy) -> Runtime
where
    S: LockerRegistry + OrderLedger + UserAccountStore + DeviceRegistry + UnitOfWork + Clone + 'static,
{
    let config = ServiceConfig {
        hardware_timeout: Duration::from_millis(cli.hardware_timeout_ms),
        hardware_retries: cli.hardware_retries,
    };
    let monitor = DeviceMonitor::new(
        Box::new(store.clone()),
        Box::new(SystemClock),
        DEFAULT_OFFLINE_AFTER,
    );
    let service = LockerService::new(
        Stores::from_backend(store),
        Box::new(SimulatedActuator::new()),
        Box::new(StaticAllowList::new(cli.admins.iter().cloned())),
        Box::new(SystemClock),
        billing,
        config,
    );
    Runtime {
        service,
        monitor: Arc::new(monitor),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "smartlocker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let billing = match &cli.billing_config {
        Some(path) => load_billing_policy(path).into_diagnostic()?,
        None => BillingPolicy::default(),
    };

    let runtime = match &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            build(store, &cli, billing)
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            build(InMemoryStore::new(), &cli, billing)
        }
        None => build(InMemoryStore::new(), &cli, billing),
    };

    let sweeper = runtime.monitor.clone().spawn_offline_sweep(DEFAULT_SWEEP_INTERVAL);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = RequestReader::new(BufReader::new(file));
    let dispatcher = Dispatcher::new(&runtime.service, &runtime.monitor);
    let stdout = io::stdout();
    let mut writer = ResponseWriter::new(stdout.lock());
    for request in reader.requests() {
        let response = dispatcher.handle(request).await;
        writer.write(&response).into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;
    sweeper.abort();

    if let Some(path) = &cli.lockers_out {
        let lockers = runtime.service.lockers().await.into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        LockerWriter::new(file)
            .write_lockers(&lockers)
            .into_diagnostic()?;
    }

    Ok(())
}
