// Main entry point for the listing engine API server

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use toq_core::kernel::{
    start_scheduler, BaseNotificationService, LogNotifier, NatsClientPublisher,
    NatsProcessingQueue, NatsPublisher, PostgresStore, ServerDeps, SignedUrlStorage, SystemClock,
    WebhookNotifier,
};
use toq_core::{server::build_app, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,toq_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting toq listing engine");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Connect to NATS (processing jobs + status events)
    let nats = async_nats::connect(&config.nats_url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats_url))?;
    let events: Arc<dyn NatsPublisher> = Arc::new(NatsClientPublisher::new(nats));
    tracing::info!(url = %config.nats_url, "NATS connected");

    let storage = SignedUrlStorage::new(
        &config.storage_base_url,
        &config.storage_bucket,
        &config.storage_signing_key,
    )?;

    let notifications: Arc<dyn BaseNotificationService> = match &config.notifications_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => {
            tracing::warn!("NOTIFICATIONS_WEBHOOK_URL not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let deps = Arc::new(ServerDeps::new(
        Arc::new(PostgresStore::new(pool)),
        Arc::new(storage),
        Arc::new(NatsProcessingQueue::new(events.clone())),
        events,
        notifications,
        Arc::new(SystemClock),
        config.engine.clone(),
    ));

    let _scheduler = start_scheduler(deps.clone())
        .await
        .context("Failed to start scheduled tasks")?;

    let app = build_app(deps);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
