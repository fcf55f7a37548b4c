use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;

use crate::cache::CacheBackend;
use crate::error::CollectResult;
use crate::metrics::{METRICS, RuntimeMetrics};

/// Publishes snapshots to the cache.
///
/// Every publish is a two-step write: create-if-absent, then an
/// unconditional overwrite. After a successful publish the key holds the
/// new payload and its TTL counts from the overwrite, whether or not the
/// key existed before.
#[derive(Clone)]
pub struct CacheWriter {
    backend: Arc<dyn CacheBackend>,
}

impl CacheWriter {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CollectResult<()> {
        let payload = serde_json::to_string(value)?;

        // A failed first step is not fatal: the overwrite below decides.
        if let Err(e) = self.backend.set_if_absent(key, &payload, ttl).await {
            warn!("cache {key}: create-if-absent failed: {e}");
        }

        match self.backend.set_with_expiry(key, &payload, ttl).await {
            Ok(()) => {
                RuntimeMetrics::incr(&METRICS.cache_writes);
                debug!("cache {key} refreshed ({}s)", ttl.as_secs());
                Ok(())
            }
            Err(e) => {
                RuntimeMetrics::incr(&METRICS.cache_errors);
                warn!("cache {key}: write failed: {e}");
                Err(e)
            }
        }
    }
}
