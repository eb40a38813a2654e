use std::sync::Arc;

use tokio::sync::watch;

use pulsecheck::db::{self, repos::configs};
use pulsecheck::engine::enrichment::{EnrichmentProvider, HttpEnrichment, NoopEnrichment};
use pulsecheck::engine::notify::LogNotifier;
use pulsecheck::engine::sweep::{self, SweeperState};
use pulsecheck::engine::CheckInEngine;
use pulsecheck::http::{self, AppState};
use pulsecheck::logging;
use pulsecheck::settings::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    logging::init();

    let settings = Settings::from_env();
    tracing::info!(db = %settings.db_path.display(), org = %settings.org_id, "Starting pulsecheck");

    let pool = db::init_db(&settings.db_path)?;

    // The process must not serve traffic without a resolvable default policy.
    configs::ensure_org_default(&pool, &settings.org_id, settings.seed_org_default)?;

    let enrichment: Arc<dyn EnrichmentProvider> = match settings.enrichment_url.as_deref() {
        Some(url) => {
            tracing::info!(url, "Enrichment gateway enabled");
            Arc::new(HttpEnrichment::new(url, settings.enrichment_timeout)?)
        }
        None => {
            tracing::info!("No enrichment gateway configured, running without analysis");
            Arc::new(NoopEnrichment)
        }
    };

    let engine = Arc::new(CheckInEngine::new(
        pool.clone(),
        settings.org_id.clone(),
        enrichment,
        Arc::new(LogNotifier),
        settings.enrichment_timeout,
    ));

    let sweeper = Arc::new(SweeperState::new());
    sweep::start_loops(
        sweeper.clone(),
        engine.clone(),
        settings.schedule_sweep_interval,
        settings.expiry_sweep_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState {
        pool,
        engine,
        sweeper: sweeper.clone(),
        org_id: settings.org_id.clone(),
    };

    let server = tokio::spawn(http::serve(state, settings.port, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    sweep::stop_loops(&sweeper);
    let _ = shutdown_tx.send(true);

    match server.await {
        Ok(result) => result?,
        Err(e) => tracing::error!("Server task panicked: {e}"),
    }

    Ok(())
}
