/// Key-value cache projection.
///
/// The cache is a read model for external consumers; the relational
/// store stays authoritative. Every value is a JSON document with a
/// time-to-live.
///
pub mod redis;
pub mod writer;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CollectResult;
use crate::schema::Language;

pub use self::redis::RedisCache;
pub use writer::CacheWriter;

/// Canonical records and announcements.
pub const RECORD_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Latest player-count sample.
pub const ONLINE_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// Minimal write surface of a cache backend.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Writes `value` only if `key` is absent. Returns whether it wrote.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CollectResult<bool>;

    /// Unconditional write; the TTL restarts from now.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CollectResult<()>;
}

// ------------------------------------------------------------
// Cache keys
// ------------------------------------------------------------
//
// Key shapes are part of the consumer contract:
// - game:{lang}-info{game_id}
// - game:{lang}-news{game_id}-{index}
// - game:online{game_id}
//

pub fn record_key(lang: Language, game_id: i64) -> String {
    format!("game:{}-info{}", lang.tag(), game_id)
}

pub fn news_key(lang: Language, game_id: i64, index: i64) -> String {
    format!("game:{}-news{}-{}", lang.tag(), game_id, index)
}

pub fn online_key(game_id: i64) -> String {
    format!("game:online{game_id}")
}
