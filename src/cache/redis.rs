use std::time::Duration;

use async_trait::async_trait;
use log::info;
use redis::aio::ConnectionManager;

use crate::cache::CacheBackend;
use crate::error::CollectResult;

/// Redis cache backend.
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so
/// every call works on a clone instead of locking a shared connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// The URL may carry a password and is never logged.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("cache connected");
        Ok(Self { conn })
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CollectResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CollectResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
