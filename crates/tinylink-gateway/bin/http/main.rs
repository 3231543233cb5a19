use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tinylink_gateway::{App, AppState, Cli, Config, CookieSigner};
use tinylink_shortener::ShortenerService;
use tinylink_storage::{FileRepository, MemoryRepository, PostgresRepository, Storage};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load(Cli::parse())?;
    tinylink_telemetry::init(config.log_format)?;

    if config.uses_default_cookie_secret() {
        warn!("no cookie secret configured, using the development default");
    }

    let file = FileRepository::open(&config.file_storage_path)
        .await
        .with_context(|| {
            format!(
                "failed to open file storage at {}",
                config.file_storage_path.display()
            )
        })?;

    let database = match &config.database_dsn {
        Some(dsn) => match PostgresRepository::connect(dsn).await {
            Ok(repository) => {
                info!("connected to database");
                Some(repository)
            }
            Err(e) => {
                warn!(error = %e, "database unavailable, running without the database tier");
                None
            }
        },
        None => None,
    };

    let has_database = database.is_some();
    let storage = Storage::with_delete_workers(
        MemoryRepository::new(),
        file,
        database,
        config.delete_workers,
    );
    let shortener = ShortenerService::new(storage, config.base_url.clone());
    let cookies = CookieSigner::new(config.cookie_secret.as_bytes())?;
    let app = App::router(AppState::new(Arc::new(shortener), cookies));

    let listener = TcpListener::bind(config.server_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server_address))?;
    info!(
        listen_addr = %listener.local_addr()?,
        base_url = %config.base_url,
        file_storage_path = %config.file_storage_path.display(),
        database = has_database,
        "starting gateway server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining connections");
}
