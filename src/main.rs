use clap::Parser;
use irrigation_sync::clock::SystemClock;
use irrigation_sync::config::{self, Config, StoreBackend};
use irrigation_sync::dashboard;
use irrigation_sync::http;
use irrigation_sync::instance_lock::InstanceLock;
use irrigation_sync::service::IrrigationService;
use irrigation_sync::store::{BoundedStore, FileStore, MemoryStore, Store};
use log::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "irrigation-sync")]
#[command(about = "Irrigation configuration and telemetry sync server")]
struct Cli {
    /// Address the HTTP API listens on
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Store backend
    #[arg(long, value_enum)]
    store: Option<StoreBackend>,

    /// Data file for the file backend
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Log a dashboard frame for every change
    #[arg(long)]
    console_dashboard: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

async fn open_store(config: &Config) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    let policy = config.store.policy();
    let store: Arc<dyn Store> = match config.store.backend {
        StoreBackend::Memory => Arc::new(BoundedStore::new(MemoryStore::new(), policy)),
        StoreBackend::File => {
            let file = FileStore::open(&config.store.data_file).await?;
            Arc::new(BoundedStore::new(file, policy))
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> ExitCode {
    config::load_dotenv();
    init_logger();
    info!("Starting irrigation-sync");

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(bind) = cli.bind {
        config.http.bind = bind;
    }
    if let Some(backend) = cli.store {
        config.store.backend = backend;
    }
    if let Some(data_file) = cli.data_file {
        config.store.data_file = data_file;
    }
    if cli.console_dashboard {
        config.dashboard.console = true;
    }

    info!("Configuration loaded:");
    info!("  Bind: {}", config.http.bind);
    info!("  Store: {:?}", config.store.backend);
    if config.store.backend == StoreBackend::File {
        info!("  Data file: {}", config.store.data_file.display());
    }
    info!(
        "  Store timeout: {}ms, read attempts: {}",
        config.store.timeout_ms, config.store.read_attempts
    );
    info!("  Subscriber queue: {}", config.broker.queue_capacity);

    // Only one server may own a data file
    let _lock = match config.store.backend {
        StoreBackend::File => match InstanceLock::acquire(&config.store.data_file) {
            Ok(lock) => Some(lock),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        StoreBackend::Memory => None,
    };

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = match IrrigationService::open(
        store,
        Arc::new(SystemClock),
        config.broker.queue_capacity,
    )
    .await
    {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to load state: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();

    let dashboard_task = config.dashboard.console.then(|| {
        tokio::spawn(dashboard::run_console(
            service.broker().clone(),
            cancel.child_token(),
        ))
    });

    let mut http_task = tokio::spawn(http::serve(
        config.http.bind,
        service.clone(),
        cancel.child_token(),
    ));

    let mut code = ExitCode::SUCCESS;
    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
        result = &mut http_task => {
            match result {
                Ok(Ok(())) => info!("HTTP server exited"),
                Ok(Err(e)) => error!("HTTP server error: {}", e),
                Err(e) => error!("HTTP task panicked: {}", e),
            }
            code = ExitCode::FAILURE;
        }
    }

    cancel.cancel();
    if !http_task.is_finished()
        && let Ok(Err(e)) = http_task.await
    {
        error!("HTTP server error during shutdown: {}", e);
    }
    if let Some(task) = dashboard_task {
        let _ = task.await;
    }

    info!("irrigation-sync stopped");
    code
}
