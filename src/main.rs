//! Rap Rounds server entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rap_rounds::config::Config;
use rap_rounds::db::{self, Repository};
use rap_rounds::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration; a missing store connection string is fatal
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Rap Rounds");
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!(
        "Store pool: {} connections, {:?} timeout",
        config.max_connections,
        config.store_timeout
    );

    // Connect to the shared store
    let pool = db::init_database(
        &config.database_url,
        config.max_connections,
        config.store_timeout,
    )
    .await?;
    let repo = Arc::new(Repository::new(pool));

    match repo.get_active_round().await {
        Ok(round) => tracing::info!("Active round #{} ({})", round.round_number, round.id),
        Err(e) => tracing::warn!("{}", e),
    }

    let state = AppState { repo };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
