use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lottery_server::config::ServerConfig;
use lottery_server::error::ServerError;
use lottery_server::server::Server;
use lottery_server::store::{BetStore, InMemoryStore};

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lottery_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();
}

fn build_store(config: &ServerConfig) -> Result<Arc<dyn BetStore + Send + Sync>, ServerError> {
    match &config.database_url {
        Some(url) => {
            #[cfg(feature = "database")]
            {
                let store = lottery_server::store::SqliteStore::new(url)?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "database"))]
            {
                let _ = url;
                Err(ServerError::config(
                    "database_url set but this binary was built without the `database` feature",
                ))
            }
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn run() -> Result<(), ServerError> {
    init_logging();

    let config = ServerConfig::from_env_and_args()?;
    let store = build_store(&config)?;
    let server = Server::bind(&config, store)?;

    // `signal_hook::flag::register` sets its flag to `true` on receipt of the
    // signal; the accept loop's `running` flag has the opposite polarity
    // (true = keep going), so a small watcher thread translates one into the
    // other rather than inverting the library's own convention.
    let term_requested = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, term_requested.clone())
        .map_err(|e| ServerError::config(e.to_string()))?;
    flag::register(SIGINT, term_requested.clone())
        .map_err(|e| ServerError::config(e.to_string()))?;

    let running = server.shutdown_handle();
    thread::spawn(move || loop {
        if term_requested.load(Ordering::SeqCst) {
            running.store(false, Ordering::SeqCst);
            break;
        }
        thread::sleep(Duration::from_millis(200));
    });

    server.run()
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, action = "main", result = "fail");
            ExitCode::FAILURE
        }
    }
}
