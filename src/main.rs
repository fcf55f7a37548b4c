// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:    Configuration structs loaded from JSON
// - error:     Error taxonomy shared by every layer
// - schema:    Strongly typed catalog / record definitions
// - util:      Shared helper utilities (time, ids, strings)
// - upstream:  Catalog API adapters
// - store:     Relational persistence (reconcile, retention)
// - cache:     Key-value projection for consumers
// - collector: Cycle runtime (limiter, pool, aggregation)
//
mod cache;
mod collector;
mod config;
mod error;
mod metrics;
mod schema;
mod store;
mod upstream;
mod util;

#[cfg(test)]
mod testing;

// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{LevelFilter, error, info};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use cache::{CacheWriter, RedisCache};
use collector::{Collaborators, Collector, CycleKind, run_schedule};
use config::Config;
use metrics::METRICS;
use store::PgStore;
use upstream::steam::SteamProvider;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Load and validate configuration
// - Connect the store, the cache and the upstream client
// - Start the info and player-count schedules
// - Shut down cleanly on Ctrl-C
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --------------------------------------------------------
    // Load configuration from disk
    //
    // NOTE:
    // - The config file contains credentials (store / cache URLs).
    // - It must not be committed to version control.
    // --------------------------------------------------------
    let path = std::env::var("COLLECTOR_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = load_config(&path)?;

    init_logging(config.debug_log());
    info!("configuration loaded from {path}");

    // --------------------------------------------------------
    // Connect collaborators
    //
    // Any failure here is fatal: a collector without its store
    // or cache has nothing useful to do.
    // --------------------------------------------------------
    let store = Arc::new(
        PgStore::connect(&config.database)
            .await
            .context("connecting to the relational store")?,
    );
    let cache = Arc::new(
        RedisCache::connect(&config.redis.url)
            .await
            .context("connecting to the cache")?,
    );
    let provider = Arc::new(SteamProvider::new(
        Duration::from_secs(config.collector.request_timeout_secs),
        config.collector.proxy.as_deref(),
    )?);

    let collector = Arc::new(Collector::new(
        Collaborators {
            provider,
            store,
            cache: CacheWriter::new(cache),
        },
        &config.collector,
    ));

    // --------------------------------------------------------
    // Start metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(Duration::from_secs(60)) => {}
                }
                info!("[METRICS] {}", METRICS.summary());
            }
        });
    }

    // --------------------------------------------------------
    // Start both schedules
    //
    // Each runs one cycle immediately, then on its interval.
    // They share the worker pool and the rate limiters.
    // --------------------------------------------------------
    let info_schedule = tokio::spawn(run_schedule(
        collector.clone(),
        CycleKind::Info,
        config.collector.info_interval(),
        shutdown.clone(),
    ));
    let player_schedule = tokio::spawn(run_schedule(
        collector,
        CycleKind::Players,
        config.collector.player_interval(),
        shutdown.clone(),
    ));

    // --------------------------------------------------------
    // Wait for Ctrl-C, then let in-flight cycles wind down
    // --------------------------------------------------------
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for shutdown signal: {e}");
    }
    info!("shutdown requested");
    shutdown.cancel();

    let (info_res, player_res) = tokio::join!(info_schedule, player_schedule);
    info_res?;
    player_res?;

    info!("[METRICS] final {}", METRICS.summary());
    Ok(())
}

// ------------------------------------------------------------
// Logging
// ------------------------------------------------------------
//
// `RUST_LOG` wins when set. Otherwise this crate logs at `info`,
// or `debug` when `debug.log` is enabled in the config.
//
fn init_logging(debug: bool) {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .parse_default_env()
        .init();
}

// ------------------------------------------------------------
// Configuration loader
// ------------------------------------------------------------
//
// Reads a JSON configuration file from disk, deserializes it into
// the strongly typed `Config` structure and validates it.
//
fn load_config(path: &str) -> anyhow::Result<Config> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let cfg: Config = serde_json::from_str(&data).with_context(|| format!("parsing {path}"))?;
    cfg.validate()?;
    Ok(cfg)
}
