/// Relational store layer.
///
/// This module groups:
/// - The `CatalogStore` abstraction (one implementation per backend)
/// - The natural-key reconciler (upsert without duplicates)
/// - The bounded player-count history
///
/// Design notes:
/// - The collector only talks to `dyn CatalogStore`; SQL lives in the
///   backend module.
/// - The catalog table is read-only from here.
///
pub mod postgres;
pub mod reconcile;
pub mod retention;

use async_trait::async_trait;

use crate::schema::{AnnouncementItem, CanonicalRecord, CatalogEntry, Language, PlayerCountSample};

pub use postgres::PgStore;
pub use reconcile::{Reconciler, Upsert};
pub use retention::RetentionPolicy;

pub type StoreResult<T> = Result<T, sqlx::Error>;

/// Persistence contract of the collector.
///
/// CONTRACT:
/// - `update_*` never touches the identity, the natural key, or
///   store-owned columns (`hot_index`, announcement `create_time`).
/// - Lookups return `Ok(None)` for a missing row; `Err` is reserved for
///   backend failures.
///
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every tracked game.
    async fn list_catalog(&self) -> StoreResult<Vec<CatalogEntry>>;

    async fn find_record(&self, game_id: i64, lang: Language) -> StoreResult<Option<CanonicalRecord>>;

    async fn insert_record(&self, record: &CanonicalRecord) -> StoreResult<()>;

    async fn update_record(&self, record: &CanonicalRecord) -> StoreResult<()>;

    async fn find_announcement(
        &self,
        game_id: i64,
        lang: Language,
        index: i64,
    ) -> StoreResult<Option<AnnouncementItem>>;

    async fn insert_announcement(&self, item: &AnnouncementItem) -> StoreResult<()>;

    async fn update_announcement(&self, item: &AnnouncementItem) -> StoreResult<()>;

    async fn count_samples(&self, game_id: i64) -> StoreResult<i64>;

    /// Ids of the samples of `game_id` that are not among the `keep`
    /// newest ones.
    async fn samples_beyond(&self, game_id: i64, keep: i64) -> StoreResult<Vec<i64>>;

    async fn delete_samples(&self, ids: &[i64]) -> StoreResult<u64>;

    async fn insert_sample(&self, sample: &PlayerCountSample) -> StoreResult<()>;
}
