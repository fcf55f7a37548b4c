use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::error::{CollectError, CollectResult};
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::{AnnouncementItem, CanonicalRecord};
use crate::store::{CatalogStore, StoreResult};
use crate::util::generate_id;

/// Row type that can be upserted on its natural key.
///
/// Implementors describe how to find, insert and update themselves, and
/// which fields of an existing row survive an update.
#[async_trait]
pub trait Reconcile: Send + Sync + Sized {
    /// Human-readable natural key, for logs.
    fn natural_key(&self) -> String;

    async fn lookup(&self, store: &dyn CatalogStore) -> StoreResult<Option<Self>>;

    async fn insert(&self, store: &dyn CatalogStore) -> StoreResult<()>;

    async fn update(&self, store: &dyn CatalogStore) -> StoreResult<()>;

    fn assign_identity(&mut self, id: i64);

    /// Copies identity and store-owned fields from the row being
    /// replaced.
    fn adopt(&mut self, existing: Self);
}

#[async_trait]
impl Reconcile for CanonicalRecord {
    fn natural_key(&self) -> String {
        format!("record {}/{}", self.game_id, self.lang.tag())
    }

    async fn lookup(&self, store: &dyn CatalogStore) -> StoreResult<Option<Self>> {
        store.find_record(self.game_id, self.lang).await
    }

    async fn insert(&self, store: &dyn CatalogStore) -> StoreResult<()> {
        store.insert_record(self).await
    }

    async fn update(&self, store: &dyn CatalogStore) -> StoreResult<()> {
        store.update_record(self).await
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = id;
    }

    fn adopt(&mut self, existing: Self) {
        self.id = existing.id;
        self.hot_index = existing.hot_index;
    }
}

#[async_trait]
impl Reconcile for AnnouncementItem {
    fn natural_key(&self) -> String {
        format!("news {}/{}/{}", self.game_id, self.lang.tag(), self.index)
    }

    async fn lookup(&self, store: &dyn CatalogStore) -> StoreResult<Option<Self>> {
        store.find_announcement(self.game_id, self.lang, self.index).await
    }

    async fn insert(&self, store: &dyn CatalogStore) -> StoreResult<()> {
        store.insert_announcement(self).await
    }

    async fn update(&self, store: &dyn CatalogStore) -> StoreResult<()> {
        store.update_announcement(self).await
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = id;
    }

    fn adopt(&mut self, existing: Self) {
        self.id = existing.id;
        self.create_time = existing.create_time;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Natural-key upsert.
///
/// - Not found: insert with a fresh identity.
/// - Found: update in place, keeping the existing identity.
/// - Lookup/write failure: logged and returned; the existing row is left
///   untouched.
///
/// At most one row per natural key exists as long as keys are not
/// reconciled concurrently, which the orchestrator guarantees (one task
/// per game per phase).
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Returns the persisted row (with its final identity) alongside the
    /// kind of write performed.
    pub async fn upsert<T: Reconcile>(&self, mut candidate: T) -> CollectResult<(Upsert, T)> {
        let store = self.store.as_ref();

        let existing = candidate
            .lookup(store)
            .await
            .map_err(|e| Self::failed(&candidate, "lookup", e))?;

        let kind = match existing {
            None => {
                candidate.assign_identity(generate_id());
                candidate
                    .insert(store)
                    .await
                    .map_err(|e| Self::failed(&candidate, "insert", e))?;
                RuntimeMetrics::incr(&METRICS.rows_inserted);
                Upsert::Inserted
            }
            Some(row) => {
                candidate.adopt(row);
                candidate
                    .update(store)
                    .await
                    .map_err(|e| Self::failed(&candidate, "update", e))?;
                RuntimeMetrics::incr(&METRICS.rows_updated);
                Upsert::Updated
            }
        };

        debug!("{} {:?}", candidate.natural_key(), kind);
        Ok((kind, candidate))
    }

    fn failed<T: Reconcile>(row: &T, op: &str, err: sqlx::Error) -> CollectError {
        RuntimeMetrics::incr(&METRICS.store_errors);
        warn!("{} {op} failed: {err}", row.natural_key());
        err.into()
    }
}
