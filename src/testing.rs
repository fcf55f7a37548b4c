//! In-memory doubles of the store, cache and upstream used by the unit
//! tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cache::CacheBackend;
use crate::error::{CollectError, CollectResult};
use crate::schema::{
    AnnouncementItem, AppDetails, CanonicalRecord, CatalogEntry, Language, LocalizedNews,
    NewsItem, PlayerCountSample, Probe,
};
use crate::store::{CatalogStore, StoreResult};
use crate::upstream::CatalogProvider;

// ------------------------------------------------------------
// Store
// ------------------------------------------------------------

#[derive(Default)]
struct Tables {
    catalog: Vec<CatalogEntry>,
    records: Vec<CanonicalRecord>,
    news: Vec<AnnouncementItem>,
    samples: Vec<PlayerCountSample>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_catalog(entries: &[CatalogEntry]) -> Self {
        let store = Self::default();
        store.tables.lock().unwrap().catalog = entries.to_vec();
        store
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<CanonicalRecord> {
        self.tables.lock().unwrap().records.clone()
    }

    pub fn announcements(&self) -> Vec<AnnouncementItem> {
        self.tables.lock().unwrap().news.clone()
    }

    pub fn samples(&self, game_id: i64) -> Vec<PlayerCountSample> {
        self.tables
            .lock()
            .unwrap()
            .samples
            .iter()
            .filter(|s| s.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn push_sample(&self, sample: PlayerCountSample) {
        self.tables.lock().unwrap().samples.push(sample);
    }

    pub fn set_hot_index(&self, game_id: i64, lang: Language, hot_index: i64) {
        let mut t = self.tables.lock().unwrap();
        for r in t.records.iter_mut().filter(|r| r.game_id == game_id && r.lang == lang) {
            r.hot_index = hot_index;
        }
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("write refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_catalog(&self) -> StoreResult<Vec<CatalogEntry>> {
        Ok(self.tables.lock().unwrap().catalog.clone())
    }

    async fn find_record(&self, game_id: i64, lang: Language) -> StoreResult<Option<CanonicalRecord>> {
        let t = self.tables.lock().unwrap();
        Ok(t.records.iter().find(|r| r.game_id == game_id && r.lang == lang).cloned())
    }

    async fn insert_record(&self, record: &CanonicalRecord) -> StoreResult<()> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if t.records.iter().any(|r| r.game_id == record.game_id && r.lang == record.lang) {
            return Err(sqlx::Error::Protocol("duplicate (game_id, lang)".into()));
        }
        let mut row = record.clone();
        row.hot_index = 0;
        t.records.push(row);
        Ok(())
    }

    async fn update_record(&self, record: &CanonicalRecord) -> StoreResult<()> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if let Some(row) = t.records.iter_mut().find(|r| r.id == record.id) {
            let hot_index = row.hot_index;
            *row = CanonicalRecord { hot_index, ..record.clone() };
        }
        Ok(())
    }

    async fn find_announcement(
        &self,
        game_id: i64,
        lang: Language,
        index: i64,
    ) -> StoreResult<Option<AnnouncementItem>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .news
            .iter()
            .find(|n| n.game_id == game_id && n.lang == lang && n.index == index)
            .cloned())
    }

    async fn insert_announcement(&self, item: &AnnouncementItem) -> StoreResult<()> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if t
            .news
            .iter()
            .any(|n| n.game_id == item.game_id && n.lang == item.lang && n.index == item.index)
        {
            return Err(sqlx::Error::Protocol("duplicate (game_id, lang, idx)".into()));
        }
        t.news.push(item.clone());
        Ok(())
    }

    async fn update_announcement(&self, item: &AnnouncementItem) -> StoreResult<()> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if let Some(row) = t.news.iter_mut().find(|n| n.id == item.id) {
            let create_time = row.create_time;
            *row = AnnouncementItem { create_time, ..item.clone() };
        }
        Ok(())
    }

    async fn count_samples(&self, game_id: i64) -> StoreResult<i64> {
        Ok(self.samples(game_id).len() as i64)
    }

    async fn samples_beyond(&self, game_id: i64, keep: i64) -> StoreResult<Vec<i64>> {
        let mut rows = self.samples(game_id);
        rows.sort_by(|a, b| b.create_time.cmp(&a.create_time).then(b.id.cmp(&a.id)));
        Ok(rows.into_iter().skip(keep.max(0) as usize).map(|s| s.id).collect())
    }

    async fn delete_samples(&self, ids: &[i64]) -> StoreResult<u64> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        let before = t.samples.len();
        t.samples.retain(|s| !ids.contains(&s.id));
        Ok((before - t.samples.len()) as u64)
    }

    async fn insert_sample(&self, sample: &PlayerCountSample) -> StoreResult<()> {
        self.check_write()?;
        self.tables.lock().unwrap().samples.push(sample.clone());
        Ok(())
    }
}

// ------------------------------------------------------------
// Cache
// ------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(v, _)| v.clone())
    }

    /// Remaining time-to-live of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(_, expires)| *expires - now)
    }

    fn check_write(&self) -> CollectResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(redis::RedisError::from(std::io::Error::other("cache down")).into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CollectResult<bool> {
        self.check_write()?;
        if self.get(key).is_some() {
            return Ok(false);
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CollectResult<()> {
        self.check_write()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

// ------------------------------------------------------------
// Upstream
// ------------------------------------------------------------

/// Scripted answer of one `(app_id, region)` probe.
#[derive(Clone)]
pub enum Scripted {
    Answer(AppDetails),
    Rejected,
    Unavailable,
    Panic,
}

#[derive(Default)]
pub struct ScriptedProvider {
    details: HashMap<(i64, String), Scripted>,
    news: HashMap<i64, Vec<NewsItem>>,
    localized: HashMap<i64, Vec<LocalizedNews>>,
    players: HashMap<i64, i64>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn details(mut self, app_id: i64, region: &str, answer: Scripted) -> Self {
        self.details.insert((app_id, region.to_string()), answer);
        self
    }

    pub fn news(mut self, app_id: i64, primary: Vec<NewsItem>, localized: Vec<LocalizedNews>) -> Self {
        self.news.insert(app_id, primary);
        self.localized.insert(app_id, localized);
        self
    }

    pub fn players(mut self, app_id: i64, count: i64) -> Self {
        self.players.insert(app_id, count);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn called(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn app_details(&self, app_id: i64, probe: &Probe) -> CollectResult<AppDetails> {
        self.called();
        match self.details.get(&(app_id, probe.code.clone())) {
            Some(Scripted::Answer(d)) => Ok(d.clone()),
            Some(Scripted::Rejected) | None => Err(CollectError::UpstreamRejected {
                probe: probe.code.clone(),
                reason: "success=false".into(),
            }),
            Some(Scripted::Unavailable) => Err(CollectError::UpstreamUnavailable("timeout".into())),
            Some(Scripted::Panic) => panic!("scripted panic for app {app_id}"),
        }
    }

    async fn news(&self, app_id: i64, count: usize) -> CollectResult<Vec<NewsItem>> {
        self.called();
        let mut items = self.news.get(&app_id).cloned().unwrap_or_default();
        items.truncate(count);
        Ok(items)
    }

    async fn localized_news(&self, app_id: i64, count: usize) -> CollectResult<Vec<LocalizedNews>> {
        self.called();
        let mut items = self.localized.get(&app_id).cloned().unwrap_or_default();
        items.truncate(count);
        Ok(items)
    }

    async fn current_players(&self, app_id: i64) -> CollectResult<i64> {
        self.called();
        self.players
            .get(&app_id)
            .copied()
            .ok_or_else(|| CollectError::UpstreamUnavailable(format!("no count for {app_id}")))
    }
}
