use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod api;
mod cache;
mod config;
mod governor;
mod normalize;
mod reader;
mod retry;
mod scheduler;
mod sources;
mod store;

use api::AppState;
use cache::Cache;
use config::Config;
use reader::{ReadService, ReadTtls};
use retry::RetryPolicy;
use scheduler::Scheduler;
use sources::{ApiFootballAdapter, ScrapeAdapter, SourceAdapter, SportsDbAdapter};
use store::Database;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // The store is the one hard dependency: nothing can be served or
    // persisted without it, so failing to open it is fatal.
    let store = Database::open(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path))?;
    info!("Database opened: {}", config.database_path);

    let retry = RetryPolicy::new(3, Duration::from_secs(config.request_timeout_secs));

    // Adapters in priority order: paid API first, free API second, scraping
    // as last resort. Each one is optional; the service runs with whatever
    // subset the configuration allows.
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    match &config.api_football_key {
        Some(key) => {
            adapters.push(Arc::new(ApiFootballAdapter::new(
                &config.api_football_url,
                key,
                &config.api_football_host,
                config.api_football_hourly_limit,
                retry.clone(),
            )?));
        }
        None => warn!("API_FOOTBALL_KEY not set, skipping the API-Football adapter"),
    }

    adapters.push(Arc::new(SportsDbAdapter::new(
        &config.sportsdb_url,
        Some(&config.sportsdb_key),
        config.sportsdb_minute_limit,
        retry.clone(),
    )?));

    if config.scrape_enabled {
        adapters.push(Arc::new(ScrapeAdapter::new(
            &config.scrape_url,
            config.scrape_minute_limit,
            retry.clone(),
        )?));
    }

    info!("Configured {} source adapter(s)", adapters.len());

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        adapters,
        Duration::from_secs(config.poll_interval_mins * 60),
        config.retention_days,
    ));
    scheduler.start();

    let cache = if config.cache_disabled {
        info!("In-memory cache disabled, reads go straight to SQLite");
        Cache::disabled()
    } else {
        Cache::new()
    };
    let ttls = ReadTtls {
        live: Duration::from_secs(config.ttl_live_secs),
        today: Duration::from_secs(config.ttl_today_secs),
        leagues: Duration::from_secs(config.ttl_leagues_secs),
        standings: Duration::from_secs(config.ttl_standings_secs),
        fixture: Duration::from_secs(config.ttl_fixture_secs),
    };
    let reader = ReadService::new(store, cache, ttls);

    let app = api::router(AppState { reader, scheduler });
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Fixtures API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
