//! Repodeck binary entry point

use repodeck::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Read configuration from file and environment
/// 2. Initialize tracing/logging from the logging section
/// 3. Validate configuration
/// 4. Initialize AppState
/// 5. Build Axum router
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Read configuration
    let mut config = config::AppConfig::from_sources()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    tracing::info!("Starting Repodeck...");

    // 3. Validate configuration
    config.finalize()?;
    tracing::info!(
        environment = ?config.server.environment,
        base_url = %config.app.base_url,
        "Configuration loaded"
    );

    // 4. Initialize metrics and application state
    repodeck::metrics::init_metrics();
    let state = AppState::new(config.clone())?;

    // 5. Build Axum router
    let app = repodeck::build_router(state);

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.app.base_url);

    axum::serve(listener, app).await?;

    Ok(())
}

/// `RUST_LOG` if set, else `logging.level` applied to this crate;
/// `logging.format` selects pretty or JSON output
fn init_tracing(logging: &config::LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter_directive().into());

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
