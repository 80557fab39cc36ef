//! SEO Opportunity Engine: Binary Entrypoint
//! Boots the Axum HTTP server: config, tracing, metrics, shared state, routes.

use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use seo_opportunity_engine::{config::EngineConfig, create_router, metrics::Metrics, AppState};

/// Compact logs in development, JSON lines otherwise.
/// `ENGINE_LOG_JSON=1` forces JSON; `RUST_LOG` overrides the filter.
fn init_tracing() {
    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );
    let force_json = std::env::var("ENGINE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("seo_opportunity_engine=info,warn"));

    // Shuttle may already have a subscriber installed; ignore that case.
    let _ = if is_dev_env && !force_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = EngineConfig::load().map_err(anyhow::Error::from)?;
    let metrics = Metrics::init()?;
    let state = AppState::from_config(config, metrics)?;
    info!(
        min_sample_size = state.config().significance.min_sample_size,
        weights_file = %state.config().paths.weights_file.display(),
        "seo opportunity engine starting"
    );

    let router = create_router(state);
    Ok(router.into())
}
