use std::time::Duration;

use serde::Deserialize;

use crate::error::CollectError;
use crate::schema::{Language, Probe};

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// This is the top-level configuration structure loaded from
// `config.json` (or the path in `COLLECTOR_CONFIG`).
//
// It defines:
// - Relational store connection
// - Cache connection
// - Collector tuning (pool size, intervals, limiter, probes)
// - Optional debug configuration
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,

    pub redis: RedisConfig,

    pub collector: CollectorConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

// ------------------------------------------------------------
// Store / cache connections
// ------------------------------------------------------------
//
// Notes:
// - URLs may carry credentials and must never be logged.
//
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (redis://[:password@]host:port/db)
    pub url: String,
}

// ------------------------------------------------------------
// Collector configuration
// ------------------------------------------------------------
//
// Controls the shape of every collection cycle.
//
// IMPORTANT:
// - `probes` order matters: the first successful probe for a
//   language wins every descriptive field of that language.
// - `workers` is independent of the number of tracked games.
//
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Maximum number of entity tasks running at once
    pub workers: usize,

    /// Hours between two info+news cycles
    pub info_interval_hours: u64,

    /// Hours between two player-count cycles
    pub player_interval_hours: u64,

    pub limiter: LimiterConfig,

    /// Player-count samples kept per game
    #[serde(default = "default_retention_threshold")]
    pub retention_threshold: i64,

    /// Announcements collected per game and language
    #[serde(default = "default_news_count")]
    pub news_count: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Optional outbound HTTP proxy (http://host:port)
    pub proxy: Option<String>,

    #[serde(default = "default_probes")]
    pub probes: Vec<Probe>,
}

impl CollectorConfig {
    pub fn info_interval(&self) -> Duration {
        hours(self.info_interval_hours)
    }

    pub fn player_interval(&self) -> Duration {
        hours(self.player_interval_hours)
    }
}

fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60 * 60))
}

// ------------------------------------------------------------
// Rate limiter configuration
// ------------------------------------------------------------
//
// One token bucket per upstream class. Refill is one token
// every N seconds, up to `burst` tokens.
//
// Observed upstream thresholds (undocumented):
// - storefront: roughly 150-250 requests / 5 minutes
// - public stats: roughly 100 requests / minute
//
#[derive(Debug, Deserialize, Clone)]
pub struct LimiterConfig {
    pub storefront_secs: u64,

    pub public_stats_secs: u64,

    #[serde(default = "default_burst")]
    pub burst: u32,
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Lowers this crate's log filter to `debug`
    pub log: Option<bool>,
}

fn default_max_connections() -> u32 {
    8
}

fn default_retention_threshold() -> i64 {
    120
}

fn default_news_count() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_burst() -> u32 {
    3
}

fn default_probes() -> Vec<Probe> {
    vec![
        Probe { code: "CN".into(), lang: Language::Zh },
        Probe { code: "HK".into(), lang: Language::Zh },
        Probe { code: "US".into(), lang: Language::En },
    ]
}

impl Config {
    /// Rejects configurations that would make a cycle meaningless.
    ///
    /// Called once at startup; any error here is fatal.
    pub fn validate(&self) -> Result<(), CollectError> {
        let c = &self.collector;
        let invalid = |msg: &str| Err(CollectError::ConfigurationInvalid(msg.to_string()));

        if c.workers == 0 {
            return invalid("collector.workers must be > 0");
        }
        if c.info_interval_hours == 0 || c.player_interval_hours == 0 {
            return invalid("collector intervals must be > 0 hours");
        }
        if c.limiter.storefront_secs == 0 || c.limiter.public_stats_secs == 0 {
            return invalid("collector.limiter refill intervals must be > 0");
        }
        if c.limiter.burst == 0 {
            return invalid("collector.limiter.burst must be > 0");
        }
        if c.retention_threshold < 1 {
            return invalid("collector.retention_threshold must be >= 1");
        }
        if c.news_count == 0 {
            return invalid("collector.news_count must be > 0");
        }
        for lang in Language::ALL {
            if !c.probes.iter().any(|p| p.lang == lang) {
                return Err(CollectError::ConfigurationInvalid(format!(
                    "collector.probes has no probe for language '{}'",
                    lang.tag()
                )));
            }
        }
        Ok(())
    }

    pub fn debug_log(&self) -> bool {
        self.debug
            .as_ref()
            .map_or(false, |d| d.log.unwrap_or(false))
    }
}
