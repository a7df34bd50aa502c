use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hvac_telemetry_service::{
    api::{self, AppState},
    config::Config,
    db::{self, RoomRepository},
    forwarder::Forwarder,
    frame_log::FrameLog,
    listener::IngestService,
    room_store::RoomStore,
    stream::Shutdown,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; env vars may be set externally
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    // In-memory room state, optionally backed by Postgres
    let mut store = RoomStore::new(config.history_limit);
    if let Some(url) = &config.database_url {
        let pool = db::create_pool(url).await?;
        db::run_migrations(&pool).await?;

        let repo = RoomRepository::new(pool);
        let states = repo.load_states().await?;
        let history = repo.load_history(config.history_limit).await?;
        info!(rooms = states.len(), samples = history.len(), "Room state restored");

        store.hydrate(states, history).await;
        store = store.with_repository(repo);
    } else {
        info!("DATABASE_URL not set, room state is memory-only");
    }

    // Raw controller frames
    {
        let mut ingest = IngestService::new(store.clone());
        if let Some(url) = &config.forward_url {
            ingest = ingest.with_forwarder(Forwarder::spawn(url.clone(), config.forward_timeout)?);
            info!(url = %url, "Relaying decoded frames");
        }
        if let Some(path) = &config.frame_log_path {
            ingest = ingest.with_frame_log(FrameLog::new(path));
            info!(path = %path.display(), "Logging decoded frames");
        }

        let addr = format!("{}:{}", config.ingest_host, config.ingest_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind frame listener on {addr}"))?;
        tokio::spawn(ingest.run(listener));
    }

    // HTTP API and live stream
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server on {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    let shutdown = Shutdown::new();
    let state = AppState::new(store, config.stream_settings()).with_shutdown(shutdown.clone());
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.trigger();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
