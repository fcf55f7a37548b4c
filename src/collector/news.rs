use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::collector::limiter::{RateLimiters, RequestClass};
use crate::error::CollectResult;
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::{AnnouncementItem, CatalogEntry, Language, LocalizedNews, NewsItem};
use crate::upstream::CatalogProvider;

/// Pairs the primary and localized feeds position by position.
///
/// The localized feed only carries headline and body; author, url,
/// post time and total are borrowed from the primary item at the same
/// index. Blank items (nothing at that position upstream) are dropped
/// per language, so a blank localized item never hides its primary
/// counterpart.
pub fn pair_announcements(
    game_id: i64,
    primary: &[NewsItem],
    localized: &[LocalizedNews],
    count: usize,
    now: DateTime<Utc>,
) -> Vec<AnnouncementItem> {
    let mut items = Vec::with_capacity(count * 2);

    for index in 0..count {
        let base = primary.get(index).cloned().unwrap_or_default();
        let local = localized.get(index).cloned().unwrap_or_default();

        let build = |lang: Language, headline: String, content: String| AnnouncementItem {
            id: 0,
            game_id,
            lang,
            index: index as i64,
            headline,
            content,
            author: base.author.clone(),
            url: base.url.clone(),
            post_time: base.published_at,
            total: base.total,
            create_time: now,
        };

        let en = build(Language::En, base.title.clone(), base.contents.clone());
        let zh = build(Language::Zh, local.headline, local.body);

        items.extend([zh, en].into_iter().filter(|item| !item.is_blank()));
    }

    items
}

/// Fetches both feeds of one game and pairs them.
///
/// A failure of either feed aborts the game's news phase; nothing is
/// persisted from a half-fetched pair.
pub async fn collect_announcements(
    provider: &dyn CatalogProvider,
    limiters: &RateLimiters,
    cancel: &CancellationToken,
    entry: CatalogEntry,
    count: usize,
) -> CollectResult<Vec<AnnouncementItem>> {
    limiters.acquire(RequestClass::PublicStats, cancel).await?;
    RuntimeMetrics::incr(&METRICS.upstream_requests);
    let primary = provider.news(entry.app_id, count).await?;

    limiters.acquire(RequestClass::Storefront, cancel).await?;
    RuntimeMetrics::incr(&METRICS.upstream_requests);
    let localized = provider.localized_news(entry.app_id, count).await?;

    Ok(pair_announcements(entry.id, &primary, &localized, count, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary(title: &str, author: &str) -> NewsItem {
        NewsItem {
            title: title.into(),
            author: author.into(),
            url: format!("https://news/{title}"),
            contents: format!("{title} body"),
            published_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0),
            total: 42,
        }
    }

    fn localized(headline: &str) -> LocalizedNews {
        LocalizedNews { headline: headline.into(), body: format!("{headline} 正文") }
    }

    #[test]
    fn localized_item_borrows_primary_metadata() {
        let now = Utc::now();
        let items = pair_announcements(
            7,
            &[primary("Patch 1", "dev")],
            &[localized("补丁 1")],
            1,
            now,
        );

        assert_eq!(items.len(), 2);
        let zh = items.iter().find(|i| i.lang == Language::Zh).unwrap();
        assert_eq!(zh.headline, "补丁 1");
        assert_eq!(zh.author, "dev");
        assert_eq!(zh.url, "https://news/Patch 1");
        assert_eq!(zh.total, 42);
        assert_eq!(zh.post_time, DateTime::<Utc>::from_timestamp(1_700_000_000, 0));
        assert_eq!(zh.game_id, 7);
        assert_eq!(zh.index, 0);
    }

    #[test]
    fn blank_positions_are_skipped_per_language() {
        let items = pair_announcements(
            1,
            &[primary("A", "x"), primary("B", "y")],
            &[localized("甲")],
            3,
            Utc::now(),
        );

        let zh: Vec<_> = items.iter().filter(|i| i.lang == Language::Zh).map(|i| i.index).collect();
        let en: Vec<_> = items.iter().filter(|i| i.lang == Language::En).map(|i| i.index).collect();
        assert_eq!(zh, [0]);
        assert_eq!(en, [0, 1]);
    }
}
