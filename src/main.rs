//! deal_scout — Lost Ark auction deal scout.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! starts the status server and runs the fetch→normalize→analyze cycle
//! on a fixed interval until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use deal_scout::config::AppConfig;
use deal_scout::engine::build_analyzer;
use deal_scout::engine::scheduler::CycleScheduler;
use deal_scout::marketplace::lostark::LostArkClient;
use deal_scout::status;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("DEAL_SCOUT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut cfg = AppConfig::load(&config_path)?;
    cfg.apply_env_overrides()?;
    cfg.validate().context("Invalid configuration")?;

    init_logging();

    info!(
        config = %config_path,
        poll_interval_secs = cfg.scheduler.poll_interval_secs,
        mode = %cfg.marketplace.query.mode,
        category = cfg.marketplace.query.category_code,
        grade = %cfg.marketplace.query.item_grade,
        engine = ?cfg.analysis.engine,
        "deal_scout starting up"
    );

    // -- Initialise components -------------------------------------------

    let api_key = cfg.marketplace.resolve_api_key()?;
    let source = Arc::new(LostArkClient::new(
        cfg.marketplace.base_url.clone(),
        api_key,
        cfg.marketplace.timeout(),
    )?);
    let analyzer = build_analyzer(&cfg.analysis);

    let scheduler = CycleScheduler::new(
        source,
        analyzer,
        cfg.marketplace.query.clone(),
        cfg.poll_interval(),
    );

    if cfg.status.enabled {
        status::spawn_status_server(scheduler.status(), cfg.status.db_type.clone(), cfg.status.port)
            .await?;
    }

    // -- Main loop -------------------------------------------------------

    info!("Entering main loop. Press Ctrl+C to stop.");
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let state = scheduler.status().snapshot().await;
    info!(
        cycles = state.cycles_run,
        consecutive_failures = state.consecutive_failures,
        "deal_scout shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("deal_scout=info"));

    if std::env::var("DEAL_SCOUT_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
