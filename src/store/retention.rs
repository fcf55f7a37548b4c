use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, warn};

use crate::error::{CollectError, CollectResult};
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::PlayerCountSample;
use crate::store::CatalogStore;

/// Keeps at most `threshold` player-count samples per game.
///
/// Admission evicts the oldest samples first so that, once the new
/// sample is stored, exactly `threshold` remain. A history that was
/// already over the bound (threshold lowered) is trimmed in one pass.
#[derive(Clone)]
pub struct RetentionPolicy {
    store: Arc<dyn CatalogStore>,
    threshold: i64,
}

impl RetentionPolicy {
    pub fn new(store: Arc<dyn CatalogStore>, threshold: i64) -> Self {
        Self { store, threshold }
    }

    /// Stores `sample`, evicting older ones when the bound is reached.
    /// Returns the number of evicted samples.
    ///
    /// Any store failure aborts the admission before the insert, so the
    /// bound can never be overshot.
    pub async fn admit(&self, sample: &PlayerCountSample) -> CollectResult<u64> {
        let game_id = sample.game_id;

        let count = self.store.count_samples(game_id).await.map_err(|e| fail(game_id, e))?;

        let mut evicted = 0;
        if count >= self.threshold {
            let stale = self
                .store
                .samples_beyond(game_id, self.threshold - 1)
                .await
                .map_err(|e| fail(game_id, e))?;

            if !stale.is_empty() {
                evicted = self.store.delete_samples(&stale).await.map_err(|e| fail(game_id, e))?;
                METRICS.samples_evicted.fetch_add(evicted as usize, Ordering::Relaxed);
                debug!("game {game_id}: evicted {evicted} player samples");
            }
        }

        self.store.insert_sample(sample).await.map_err(|e| fail(game_id, e))?;
        Ok(evicted)
    }
}

fn fail(game_id: i64, err: sqlx::Error) -> CollectError {
    RuntimeMetrics::incr(&METRICS.store_errors);
    warn!("game {game_id}: player sample retention failed: {err}");
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn sample(id: i64, game_id: i64, minute: i64) -> PlayerCountSample {
        PlayerCountSample {
            id,
            game_id,
            count: 1000 + minute,
            create_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minute),
        }
    }

    #[tokio::test]
    async fn admission_at_threshold_evicts_the_oldest() {
        let store = Arc::new(MemoryStore::default());
        for m in 0..120 {
            store.push_sample(sample(m + 1, 9, m));
        }
        let policy = RetentionPolicy::new(store.clone(), 120);

        let evicted = policy.admit(&sample(500, 9, 500)).await.unwrap();
        assert_eq!(evicted, 1);

        let ids: Vec<i64> = store.samples(9).iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 120);
        assert!(!ids.contains(&1), "oldest sample should be gone");
        assert!(ids.contains(&2));
        assert!(ids.contains(&500));
    }

    #[tokio::test]
    async fn below_threshold_only_appends() {
        let store = Arc::new(MemoryStore::default());
        store.push_sample(sample(1, 9, 0));
        let policy = RetentionPolicy::new(store.clone(), 120);

        assert_eq!(policy.admit(&sample(2, 9, 1)).await.unwrap(), 0);
        assert_eq!(store.samples(9).len(), 2);
    }

    #[tokio::test]
    async fn oversized_history_is_trimmed_in_one_pass() {
        let store = Arc::new(MemoryStore::default());
        for m in 0..10 {
            store.push_sample(sample(m + 1, 4, m));
        }
        // Another game's history is never touched.
        store.push_sample(sample(99, 5, 0));
        let policy = RetentionPolicy::new(store.clone(), 3);

        assert_eq!(policy.admit(&sample(100, 4, 100)).await.unwrap(), 8);

        let mut ids: Vec<i64> = store.samples(4).iter().map(|s| s.id).collect();
        ids.sort();
        assert_eq!(ids, [9, 10, 100]);
        assert_eq!(store.samples(5).len(), 1);
    }

    #[tokio::test]
    async fn store_failure_skips_the_insert() {
        let store = Arc::new(MemoryStore::default());
        store.fail_writes(true);
        let policy = RetentionPolicy::new(store.clone(), 120);
        assert!(policy.admit(&sample(1, 9, 0)).await.is_err());
        assert!(store.samples(9).is_empty());
    }
}
