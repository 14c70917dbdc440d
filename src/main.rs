//! Shelfdesk Server - Library Reservation Desk
//!
//! REST API backing the library admin dashboard.

use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use shelfdesk_server::{
    api,
    config::{AppConfig, LoggingConfig},
    repository::Repository,
    services::{sweeper::spawn_expiry_sweeper, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Shelfdesk Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database migrations completed");

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let repository = Repository::new(pool);
    let services = Services::new(repository, &config);

    if let Some(admin) = services.users.ensure_bootstrap_admin().await? {
        tracing::info!("Bootstrap admin {} is ready", admin.username);
    }

    tracing::info!(
        "Pending reservations expire after {} hours; sweeping every {}s",
        config.reservations.max_age_hours,
        config.reservations.sweep_interval().as_secs()
    );
    spawn_expiry_sweeper(
        services.reservations.clone(),
        config.reservations.sweep_interval(),
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Console output in the configured format, plus an optional daily log file
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("shelfdesk_server={},tower_http=debug", logging.level).into()
    });

    let console = if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let (file, guard) = match logging.directory.as_deref() {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "shelfdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    guard
}
