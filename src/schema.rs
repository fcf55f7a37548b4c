use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data model shared by the whole collection pipeline.
///
/// Flow of these types:
/// - `CatalogEntry` is read from the store at the start of each cycle
/// - the upstream adapter produces `AppDetails` / `NewsItem` DTOs
/// - the collector folds them into `CanonicalRecord` and `AnnouncementItem`
/// - the reconciler persists them; the cache writer projects them
///
/// DESIGN NOTES:
/// - Serde field names are part of the cache contract read by external
///   consumers. Renaming a field here changes what they see.
///

// ------------------------------------------------------------
// Language variants
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Primary variant (simplified Chinese storefront).
    #[default]
    Zh,
    /// Secondary variant (English storefront).
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Zh, Language::En];

    /// Tag used in store rows and cache keys.
    pub fn tag(self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }

    pub fn accept_language(self) -> &'static str {
        match self {
            Language::Zh => "zh-CN,zh;q=0.9",
            Language::En => "en-US,en;q=0.9",
        }
    }

    /// Release-date marker for titles flagged as not yet released.
    pub fn coming_soon(self) -> &'static str {
        match self {
            Language::Zh => "即将推出",
            Language::En => "coming soon",
        }
    }

    /// Formatted label and currency of the synthesized free price.
    pub fn free_label(self) -> (&'static str, &'static str) {
        match self {
            Language::Zh => ("免费", "CNY"),
            Language::En => ("free", "USD"),
        }
    }
}

// ------------------------------------------------------------
// Catalog
// ------------------------------------------------------------

/// One tracked game, owned by the catalog (never written here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Internal identity.
    pub id: i64,
    /// Storefront application id.
    pub app_id: i64,
}

/// Region/language probe sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Storefront country code (`cc` parameter), e.g. "CN".
    pub code: String,
    pub lang: Language,
}

// ------------------------------------------------------------
// Storefront payload pieces
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub initial: i64,
    #[serde(default, rename = "final")]
    pub final_price: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub discount_percent: i64,
    #[serde(default)]
    pub initial_formatted: String,
    #[serde(default)]
    pub final_formatted: String,
}

impl Price {
    pub fn free(lang: Language) -> Self {
        let (label, currency) = lang.free_label();
        Self {
            currency: currency.to_string(),
            initial_formatted: label.to_string(),
            final_formatted: label.to_string(),
            ..Default::default()
        }
    }
}

/// Entry of the per-region price list shared by both language records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListEntry {
    pub price: String,
    pub country: String,
}

impl PriceListEntry {
    pub fn free() -> Self {
        Self {
            price: "free".to_string(),
            country: "免费".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub coming_soon: bool,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Platforms {
    #[serde(default)]
    pub windows: bool,
    #[serde(default)]
    pub mac: bool,
    #[serde(default)]
    pub linux: bool,
}

impl Platforms {
    /// Ordered subset of "windows, mac, linux".
    pub fn display(&self) -> String {
        [
            (self.windows, "windows"),
            (self.mac, "mac"),
            (self.linux, "linux"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub path_thumbnail: String,
    #[serde(default)]
    pub path_full: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub dash_av1: String,
    #[serde(default)]
    pub dash_h264: String,
    #[serde(default)]
    pub hls_h264: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PcRequirements {
    #[serde(default)]
    pub minimum: String,
    #[serde(default)]
    pub recommended: String,
}

/// Typed view of one storefront `appdetails` answer.
///
/// `None` means the field was absent from the payload. A field that was
/// present but malformed is already replaced by its zero value by the
/// adapter, so it arrives here as `Some(Default::default())`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppDetails {
    pub is_free: bool,
    pub price: Option<Price>,
    pub supported_languages: Option<String>,
    pub release: Option<ReleaseInfo>,
    pub platforms: Option<Platforms>,
    pub developers: Option<Vec<String>>,
    pub publishers: Option<Vec<String>>,
    pub header_image: Option<String>,
    pub short_description: Option<String>,
    pub required_age: Option<String>,
    pub support: Option<SupportInfo>,
    pub website: Option<String>,
    pub content_notes: Option<String>,
    pub screenshots: Option<Vec<Screenshot>>,
    pub movies: Option<Vec<Movie>>,
    pub detailed_description: Option<String>,
    pub about_the_game: Option<String>,
    pub pc_requirements: Option<PcRequirements>,
}

/// Item of the primary (English) announcement feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub author: String,
    pub url: String,
    pub contents: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Total announcements known upstream at fetch time.
    pub total: i64,
}

/// Item of the localized announcement feed (headline/body only).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalizedNews {
    pub headline: String,
    pub body: String,
}

// ------------------------------------------------------------
// Canonical rows
// ------------------------------------------------------------

/// Per-entity, per-language canonical projection of the storefront.
///
/// Natural key: `(game_id, lang)`.
/// `hot_index` is owned by the store (maintained elsewhere) and is never
/// derived by the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: i64,
    pub game_id: i64,
    pub lang: Language,
    pub price: Price,
    pub price_list: String,
    pub supported_languages: String,
    pub developers: String,
    pub publishers: String,
    pub platforms: String,
    pub date: String,
    pub header_image: String,
    pub short_description: String,
    pub required_age: String,
    pub support: SupportInfo,
    pub website: String,
    pub content_descriptors: String,
    pub screenshots: Vec<Screenshot>,
    pub movies: Vec<Movie>,
    pub detailed_description: String,
    pub about_the_game: String,
    pub pc_requirements: PcRequirements,
    #[serde(skip)]
    pub hot_index: i64,
}

/// One announcement at a fixed position.
///
/// Natural key: `(game_id, lang, index)`. Keyed by position, not content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementItem {
    pub id: i64,
    pub game_id: i64,
    pub lang: Language,
    pub index: i64,
    pub headline: String,
    pub content: String,
    pub author: String,
    pub url: String,
    pub post_time: Option<DateTime<Utc>>,
    pub total: i64,
    pub create_time: DateTime<Utc>,
}

impl AnnouncementItem {
    /// Upstream returns blank items when it has fewer than requested.
    pub fn is_blank(&self) -> bool {
        self.headline.is_empty() && self.content.is_empty()
    }
}

/// Append-only player-count fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCountSample {
    pub id: i64,
    pub game_id: i64,
    pub count: i64,
    pub create_time: DateTime<Utc>,
}

// ------------------------------------------------------------
// Cache snapshots
// ------------------------------------------------------------

/// Cached view of a `CanonicalRecord` plus the time it was collected.
#[derive(Debug, Serialize)]
pub struct RecordSnapshot<'a> {
    #[serde(flatten)]
    pub record: &'a CanonicalRecord,
    pub collect_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platforms_display_keeps_fixed_order() {
        let p = Platforms { windows: true, mac: false, linux: true };
        assert_eq!(p.display(), "windows, linux");
        assert_eq!(Platforms::default().display(), "");
    }

    #[test]
    fn free_price_is_zero_with_localized_label() {
        let zh = Price::free(Language::Zh);
        assert_eq!(zh.final_formatted, "免费");
        assert_eq!(zh.currency, "CNY");
        let en = Price::free(Language::En);
        assert_eq!(en.initial_formatted, "free");
        assert_eq!(en.final_price, 0);
        assert_eq!(en.discount_percent, 0);
    }

    #[test]
    fn record_snapshot_flattens_and_hides_store_owned_fields() {
        let record = CanonicalRecord {
            game_id: 7,
            lang: Language::En,
            hot_index: 99,
            ..Default::default()
        };
        let snap = RecordSnapshot { record: &record, collect_date: Utc::now() };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["game_id"], 7);
        assert_eq!(v["lang"], "en");
        assert!(v.get("hot_index").is_none());
        assert!(v.get("collect_date").is_some());
        assert_eq!(v["price"]["final"], 0);
    }
}
