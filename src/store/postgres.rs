use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use crate::config::DatabaseConfig;
use crate::schema::{
    AnnouncementItem, CanonicalRecord, CatalogEntry, Language, Movie, PcRequirements,
    PlayerCountSample, Price, Screenshot, SupportInfo,
};
use crate::store::{CatalogStore, StoreResult};

// ------------------------------------------------------------
// Postgres backend
// ------------------------------------------------------------
//
// Tables (see migrations/):
// - games               catalog, read-only here
// - game_records        one row per (game_id, lang)
// - game_news           one row per (game_id, lang, idx)
// - game_player_counts  append-only samples, bounded per game
//
// Nested values (support, media lists, requirements) are stored as
// JSONB. The price is flattened into columns so it can be queried.
//
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and applies pending migrations.
    ///
    /// The URL may carry credentials and is never logged.
    pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&cfg.url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("store connected, migrations applied");

        Ok(Self { pool })
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: i64,
    game_id: i64,
    initial: i64,
    final_price: i64,
    currency: String,
    discount_percent: i64,
    initial_formatted: String,
    final_formatted: String,
    price_list: String,
    supported_languages: String,
    developers: String,
    publishers: String,
    platforms: String,
    release_date: String,
    header_image: String,
    short_description: String,
    required_age: String,
    support: Json<SupportInfo>,
    website: String,
    content_descriptors: String,
    screenshots: Json<Vec<Screenshot>>,
    movies: Json<Vec<Movie>>,
    detailed_description: String,
    about_the_game: String,
    pc_requirements: Json<PcRequirements>,
    hot_index: i64,
}

impl RecordRow {
    fn into_record(self, lang: Language) -> CanonicalRecord {
        CanonicalRecord {
            id: self.id,
            game_id: self.game_id,
            lang,
            price: Price {
                initial: self.initial,
                final_price: self.final_price,
                currency: self.currency,
                discount_percent: self.discount_percent,
                initial_formatted: self.initial_formatted,
                final_formatted: self.final_formatted,
            },
            price_list: self.price_list,
            supported_languages: self.supported_languages,
            developers: self.developers,
            publishers: self.publishers,
            platforms: self.platforms,
            date: self.release_date,
            header_image: self.header_image,
            short_description: self.short_description,
            required_age: self.required_age,
            support: self.support.0,
            website: self.website,
            content_descriptors: self.content_descriptors,
            screenshots: self.screenshots.0,
            movies: self.movies.0,
            detailed_description: self.detailed_description,
            about_the_game: self.about_the_game,
            pc_requirements: self.pc_requirements.0,
            hot_index: self.hot_index,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NewsRow {
    id: i64,
    game_id: i64,
    idx: i64,
    headline: String,
    content: String,
    author: String,
    url: String,
    post_time: Option<DateTime<Utc>>,
    total: i64,
    create_time: DateTime<Utc>,
}

impl NewsRow {
    fn into_item(self, lang: Language) -> AnnouncementItem {
        AnnouncementItem {
            id: self.id,
            game_id: self.game_id,
            lang,
            index: self.idx,
            headline: self.headline,
            content: self.content,
            author: self.author,
            url: self.url,
            post_time: self.post_time,
            total: self.total,
            create_time: self.create_time,
        }
    }
}

const RECORD_COLUMNS: &str = "id, game_id, initial, final_price, currency, discount_percent, \
     initial_formatted, final_formatted, price_list, supported_languages, developers, \
     publishers, platforms, release_date, header_image, short_description, required_age, \
     support, website, content_descriptors, screenshots, movies, detailed_description, \
     about_the_game, pc_requirements, hot_index";

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_catalog(&self) -> StoreResult<Vec<CatalogEntry>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as("SELECT id, appid FROM games ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, app_id)| CatalogEntry { id, app_id })
            .collect())
    }

    async fn find_record(&self, game_id: i64, lang: Language) -> StoreResult<Option<CanonicalRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM game_records WHERE game_id = $1 AND lang = $2");
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(game_id)
            .bind(lang.tag())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_record(lang)))
    }

    async fn insert_record(&self, r: &CanonicalRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO game_records (
                id, game_id, lang, initial, final_price, currency, discount_percent,
                initial_formatted, final_formatted, price_list, supported_languages,
                developers, publishers, platforms, release_date, header_image,
                short_description, required_age, support, website, content_descriptors,
                screenshots, movies, detailed_description, about_the_game,
                pc_requirements, update_time
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, NOW()
            )",
        )
        .bind(r.id)
        .bind(r.game_id)
        .bind(r.lang.tag())
        .bind(r.price.initial)
        .bind(r.price.final_price)
        .bind(&r.price.currency)
        .bind(r.price.discount_percent)
        .bind(&r.price.initial_formatted)
        .bind(&r.price.final_formatted)
        .bind(&r.price_list)
        .bind(&r.supported_languages)
        .bind(&r.developers)
        .bind(&r.publishers)
        .bind(&r.platforms)
        .bind(&r.date)
        .bind(&r.header_image)
        .bind(&r.short_description)
        .bind(&r.required_age)
        .bind(Json(&r.support))
        .bind(&r.website)
        .bind(&r.content_descriptors)
        .bind(Json(&r.screenshots))
        .bind(Json(&r.movies))
        .bind(&r.detailed_description)
        .bind(&r.about_the_game)
        .bind(Json(&r.pc_requirements))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Leaves id, the natural key and hot_index untouched.
    async fn update_record(&self, r: &CanonicalRecord) -> StoreResult<()> {
        sqlx::query(
            "UPDATE game_records SET
                initial = $2, final_price = $3, currency = $4, discount_percent = $5,
                initial_formatted = $6, final_formatted = $7, price_list = $8,
                supported_languages = $9, developers = $10, publishers = $11,
                platforms = $12, release_date = $13, header_image = $14,
                short_description = $15, required_age = $16, support = $17,
                website = $18, content_descriptors = $19, screenshots = $20,
                movies = $21, detailed_description = $22, about_the_game = $23,
                pc_requirements = $24, update_time = NOW()
             WHERE id = $1",
        )
        .bind(r.id)
        .bind(r.price.initial)
        .bind(r.price.final_price)
        .bind(&r.price.currency)
        .bind(r.price.discount_percent)
        .bind(&r.price.initial_formatted)
        .bind(&r.price.final_formatted)
        .bind(&r.price_list)
        .bind(&r.supported_languages)
        .bind(&r.developers)
        .bind(&r.publishers)
        .bind(&r.platforms)
        .bind(&r.date)
        .bind(&r.header_image)
        .bind(&r.short_description)
        .bind(&r.required_age)
        .bind(Json(&r.support))
        .bind(&r.website)
        .bind(&r.content_descriptors)
        .bind(Json(&r.screenshots))
        .bind(Json(&r.movies))
        .bind(&r.detailed_description)
        .bind(&r.about_the_game)
        .bind(Json(&r.pc_requirements))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_announcement(
        &self,
        game_id: i64,
        lang: Language,
        index: i64,
    ) -> StoreResult<Option<AnnouncementItem>> {
        let row: Option<NewsRow> = sqlx::query_as(
            "SELECT id, game_id, idx, headline, content, author, url, post_time, total, create_time
             FROM game_news WHERE game_id = $1 AND lang = $2 AND idx = $3",
        )
        .bind(game_id)
        .bind(lang.tag())
        .bind(index)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_item(lang)))
    }

    async fn insert_announcement(&self, item: &AnnouncementItem) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO game_news
                (id, game_id, lang, idx, headline, content, author, url, post_time, total, create_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(item.id)
        .bind(item.game_id)
        .bind(item.lang.tag())
        .bind(item.index)
        .bind(&item.headline)
        .bind(&item.content)
        .bind(&item.author)
        .bind(&item.url)
        .bind(item.post_time)
        .bind(item.total)
        .bind(item.create_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_announcement(&self, item: &AnnouncementItem) -> StoreResult<()> {
        sqlx::query(
            "UPDATE game_news SET
                headline = $2, content = $3, author = $4, url = $5, post_time = $6, total = $7
             WHERE id = $1",
        )
        .bind(item.id)
        .bind(&item.headline)
        .bind(&item.content)
        .bind(&item.author)
        .bind(&item.url)
        .bind(item.post_time)
        .bind(item.total)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_samples(&self, game_id: i64) -> StoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM game_player_counts WHERE game_id = $1")
                .bind(game_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn samples_beyond(&self, game_id: i64, keep: i64) -> StoreResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM game_player_counts
             WHERE game_id = $1
             ORDER BY create_time DESC, id DESC
             OFFSET $2",
        )
        .bind(game_id)
        .bind(keep)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn delete_samples(&self, ids: &[i64]) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM game_player_counts WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn insert_sample(&self, s: &PlayerCountSample) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO game_player_counts (id, game_id, count, create_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(s.id)
        .bind(s.game_id)
        .bind(s.count)
        .bind(s.create_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
