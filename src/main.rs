use arcus::{
    config::AppConfig,
    db,
    queue::{MessageQueue, SqliteQueue},
    repositories::{SqliteTokenRepository, SqliteUserRepository},
    routes::app_router,
    services::{
        create_mail_sender, spawn_token_sweeper, ActivationService, MailConsumer,
        QueueNotificationPublisher,
    },
    AppState,
};

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arcus=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    tracing::info!(environment = %config.environment, "Starting arcus");

    // Database connection
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to open database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    // Queue and its two ends
    let queue: Arc<dyn MessageQueue> = Arc::new(
        SqliteQueue::open(pool.clone(), config.queue.visibility_timeout)
            .await
            .context("Failed to open message queue")?,
    );
    let publisher = Arc::new(
        QueueNotificationPublisher::new(queue.clone())
            .await
            .context("Failed to declare notification queue")?,
    );
    if config.is_production() && config.smtp.is_none() {
        tracing::warn!("SMTP is not configured in production, welcome emails will only be logged");
    }
    let mail_sender = create_mail_sender(config.smtp.as_ref(), &config.base_url);
    let consumer = MailConsumer::new(
        queue.clone(),
        mail_sender,
        config.mail_send_timeout,
        config.queue,
    )
    .await
    .context("Failed to start mail consumer")?;

    // Initialize repositories and services
    let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));
    let token_repository = Arc::new(SqliteTokenRepository::new(pool.clone()));
    let activation_service = Arc::new(
        ActivationService::new(
            user_repository,
            token_repository,
            publisher,
            config.password_hashing,
            config.activation_token_ttl,
        )
        .context("Failed to build activation service")?,
    );

    // Background tasks
    let shutdown = CancellationToken::new();
    let consumer_task = consumer.spawn(shutdown.clone());
    let sweeper_task = spawn_token_sweeper(
        activation_service.clone(),
        config.token_sweep_interval,
        shutdown.clone(),
    );

    let app_state = AppState { activation_service };
    let app = app_router(app_state);

    // Start server
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    // The server may also stop on its own; make sure workers follow
    shutdown.cancel();
    for (name, task) in [("mail consumer", consumer_task), ("token sweeper", sweeper_task)] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task panicked");
        }
    }

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
    shutdown.cancel();
}
