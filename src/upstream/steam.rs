use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::warn;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{CollectError, CollectResult},
    schema::{AppDetails, LocalizedNews, NewsItem, Probe},
    util,
};

use super::adapter::CatalogProvider;

const APP_DETAILS_URL: &str = "https://store.steampowered.com/api/appdetails";
const NEWS_URL: &str = "https://api.steampowered.com/ISteamNews/GetNewsForApp/v2";
const LOCALIZED_NEWS_URL: &str = "https://store.steampowered.com/events/ajaxgetadjacentpartnerevents";
const PLAYERS_URL: &str = "https://api.steampowered.com/ISteamUserStats/GetNumberOfCurrentPlayers/v1/";

/// Localized feed language list: schinese.
const LOCALIZED_LANG_LIST: &str = "6_0";

const CLIENT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Steam storefront / public API adapter
///
/// Endpoints:
/// - store `appdetails` (per region, per language)
/// - `ISteamNews/GetNewsForApp` (English, full metadata)
/// - store `ajaxgetadjacentpartnerevents` (Chinese headline/body)
/// - `ISteamUserStats/GetNumberOfCurrentPlayers`
pub struct SteamProvider {
    client: reqwest::Client,
}

impl SteamProvider {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("invalid collector.proxy")?);
        }
        let client = builder.build().context("building HTTP client")?;
        Ok(Self { client })
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept_language: Option<&str>,
    ) -> CollectResult<Value> {
        let mut req = self
            .client
            .get(url)
            .query(query)
            .header(USER_AGENT, CLIENT_USER_AGENT);
        if let Some(lang) = accept_language {
            req = req.header(ACCEPT_LANGUAGE, lang);
        }
        let resp = req.send().await?.error_for_status()?;
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait::async_trait]
impl CatalogProvider for SteamProvider {

    fn name(&self) -> &'static str {
        "steam"
    }

    async fn app_details(&self, app_id: i64, probe: &Probe) -> CollectResult<AppDetails> {
        let body = self
            .get_json(
                APP_DETAILS_URL,
                &[("appids", app_id.to_string()), ("cc", probe.code.clone())],
                Some(probe.lang.accept_language()),
            )
            .await?;
        parse_app_details(&body, app_id, &probe.code)
    }

    async fn news(&self, app_id: i64, count: usize) -> CollectResult<Vec<NewsItem>> {
        let body = self
            .get_json(
                NEWS_URL,
                &[("appid", app_id.to_string()), ("count", count.to_string())],
                None,
            )
            .await?;
        parse_news(&body, count)
    }

    async fn localized_news(&self, app_id: i64, count: usize) -> CollectResult<Vec<LocalizedNews>> {
        let body = self
            .get_json(
                LOCALIZED_NEWS_URL,
                &[
                    ("appid", app_id.to_string()),
                    ("count_before", "1".to_string()),
                    ("count_after", count.to_string()),
                    ("lang_list", LOCALIZED_LANG_LIST.to_string()),
                ],
                None,
            )
            .await?;
        parse_localized_news(&body, count)
    }

    async fn current_players(&self, app_id: i64) -> CollectResult<i64> {
        let body = self
            .get_json(PLAYERS_URL, &[("appid", app_id.to_string())], None)
            .await?;
        parse_player_count(&body, app_id)
    }
}

// ------------------------------------------------------------
// Payload parsing
// ------------------------------------------------------------
//
// Everything below is pure and network-free so it can be tested
// against captured payloads.
//

/// Decodes one `appdetails` answer.
///
/// Envelope:
/// { "<appid>": { "success": true, "data": { ... } } }
pub fn parse_app_details(body: &Value, app_id: i64, probe: &str) -> CollectResult<AppDetails> {
    let rejected = |reason: &str| CollectError::UpstreamRejected {
        probe: probe.to_string(),
        reason: reason.to_string(),
    };

    let envelope = body
        .get(app_id.to_string())
        .ok_or_else(|| rejected("no envelope for app"))?;

    if !envelope["success"].as_bool().unwrap_or(false) {
        return Err(rejected("success=false"));
    }

    let data = envelope
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| CollectError::MalformedPayload(format!("app {app_id} [{probe}]: missing data")))?;

    let ctx = FieldCtx { app_id, probe };

    Ok(AppDetails {
        is_free: data["is_free"].as_bool().unwrap_or(false),
        price: ctx.field(data, &["price_overview"]),
        supported_languages: ctx.text(data, &["supported_languages"]),
        release: ctx.field(data, &["release_date"]),
        platforms: ctx.field(data, &["platforms"]),
        developers: ctx.field(data, &["developers"]),
        publishers: ctx.field(data, &["publishers"]),
        header_image: ctx.text(data, &["header_image"]),
        short_description: ctx.text(data, &["short_description"]),
        required_age: ctx.text(data, &["ratings", "steam_germany", "required_age"]),
        support: ctx.field(data, &["support_info"]),
        website: ctx.text(data, &["website"]),
        content_notes: ctx.text(data, &["content_descriptors", "notes"]),
        screenshots: ctx.field(data, &["screenshots"]),
        movies: ctx.field(data, &["movies"]),
        detailed_description: ctx.text(data, &["detailed_description"]),
        about_the_game: ctx.text(data, &["about_the_game"]),
        // The storefront sends `[]` instead of an object when empty.
        pc_requirements: match lookup(data, &["pc_requirements"]) {
            Some(Value::Array(items)) if items.is_empty() => Some(Default::default()),
            _ => ctx.field(data, &["pc_requirements"]),
        },
    })
}

/// Decodes the primary announcement feed.
///
/// { "appnews": { "count": 42, "newsitems": [ { title, author, url, contents, date } ] } }
pub fn parse_news(body: &Value, count: usize) -> CollectResult<Vec<NewsItem>> {
    let appnews = body
        .get("appnews")
        .ok_or_else(|| CollectError::MalformedPayload("news feed: missing appnews".into()))?;
    let total = appnews["count"].as_i64().unwrap_or(0);

    let items = appnews["newsitems"]
        .as_array()
        .map(|a| a.as_slice())
        .unwrap_or_default();

    Ok(items
        .iter()
        .take(count)
        .map(|n| NewsItem {
            title: n["title"].as_str().unwrap_or_default().to_string(),
            author: n["author"].as_str().unwrap_or_default().to_string(),
            url: n["url"].as_str().unwrap_or_default().to_string(),
            contents: util::expand_clan_images(n["contents"].as_str().unwrap_or_default()),
            published_at: n["date"]
                .as_i64()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            total,
        })
        .collect())
}

/// Decodes the localized announcement feed.
///
/// { "events": [ { "announcement_body": { "headline": .., "body": .. } } ] }
pub fn parse_localized_news(body: &Value, count: usize) -> CollectResult<Vec<LocalizedNews>> {
    let events = body["events"]
        .as_array()
        .ok_or_else(|| CollectError::MalformedPayload("localized feed: missing events".into()))?;

    Ok(events
        .iter()
        .take(count)
        .map(|e| {
            let ann = &e["announcement_body"];
            LocalizedNews {
                headline: ann["headline"].as_str().unwrap_or_default().to_string(),
                body: util::expand_clan_images(ann["body"].as_str().unwrap_or_default()),
            }
        })
        .collect())
}

/// { "response": { "player_count": 1234, "result": 1 } }
pub fn parse_player_count(body: &Value, app_id: i64) -> CollectResult<i64> {
    body["response"]["player_count"]
        .as_i64()
        .ok_or_else(|| CollectError::UpstreamRejected {
            probe: format!("players:{app_id}"),
            reason: "no player_count in response".into(),
        })
}

fn lookup<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = data;
    for key in path {
        cur = cur.get(key)?;
    }
    (!cur.is_null()).then_some(cur)
}

/// Per-call context so field warnings name the app and probe.
struct FieldCtx<'a> {
    app_id: i64,
    probe: &'a str,
}

impl FieldCtx<'_> {
    /// Absent → None. Present but malformed → logged, zero value.
    fn field<T: DeserializeOwned + Default>(&self, data: &Value, path: &[&str]) -> Option<T> {
        let raw = lookup(data, path)?;
        match T::deserialize(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    "app {} [{}]: malformed field {}: {}",
                    self.app_id,
                    self.probe,
                    path.join("."),
                    e
                );
                Some(T::default())
            }
        }
    }

    /// Like `field` but also accepts numbers for text fields.
    fn text(&self, data: &Value, path: &[&str]) -> Option<String> {
        match lookup(data, path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => {
                warn!(
                    "app {} [{}]: malformed text field {}",
                    self.app_id,
                    self.probe,
                    path.join(".")
                );
                Some(String::new())
            }
        }
    }
}
