use std::sync::Arc;

use anyhow::Context as _;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hedron_controller::config::Config;
use hedron_controller::context::Context;
use hedron_controller::runtime::{Controller, ControllerSettings};
use hedron_controller::source::GitResolver;
use hedron_controller::store::{MemoryStore, ObjectStore, PostgresStore};
use hedron_controller::{api, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hedron_controller=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hedron Controller...");

    let config = Config::from_env().context("Invalid configuration")?;

    let store: Arc<dyn ObjectStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Arc::new(PostgresStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, objects are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let resolver = Arc::new(GitResolver::new(config.scratch_dir.clone()));
    let ctx = Context::new(Arc::clone(&store), resolver, config.poll_interval);

    // One signal stops both the controller and the HTTP server
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let controller = Controller::new(ctx, ControllerSettings::from(&config));
    let controller_handle = tokio::spawn(controller.run(wait_for(shutdown_rx.clone())));

    // Build router with all API endpoints
    let app = api::create_router(store);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for(shutdown_rx))
        .await
        .context("Failed to start server")?;

    controller_handle
        .await
        .context("Controller task panicked")?;

    tracing::info!("Hedron Controller stopped");
    Ok(())
}

async fn wait_for(mut shutdown: tokio::sync::watch::Receiver<bool>) {
    // A dropped sender also means shut down
    let _ = shutdown.wait_for(|stop| *stop).await;
}
