use crate::error::CollectResult;
use crate::schema::{AppDetails, LocalizedNews, NewsItem, Probe};

/// CatalogProvider is the abstraction layer between:
/// - The generic collection runtime
/// - A concrete upstream catalog API
///
/// Each implementation must:
/// - Perform exactly one upstream request per call
/// - Map transport failures to `UpstreamUnavailable`
/// - Map explicit refusals (success flag false) to `UpstreamRejected`
/// - Decode fields one by one, falling back to zero values on malformed
///   fields instead of failing the whole call
///
/// Rate limiting is NOT the adapter's job: the caller acquires a token
/// of the right class before every call.
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One instance is shared by every task of every cycle
///
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {

    /// Returns the provider name used in logs.
    fn name(&self) -> &'static str;

    /// Storefront details of one app for one region/language probe.
    ///
    /// ERRORS:
    /// - `UpstreamRejected` when the storefront refuses the probe
    ///   (typically region-locked titles)
    /// - `MalformedPayload` when the envelope itself is unreadable
    /// - `UpstreamUnavailable` on network / HTTP failures
    ///
    async fn app_details(&self, app_id: i64, probe: &Probe) -> CollectResult<AppDetails>;

    /// Primary announcement feed: up to `count` items, newest first,
    /// with full metadata.
    async fn news(&self, app_id: i64, count: usize) -> CollectResult<Vec<NewsItem>>;

    /// Localized announcement feed: up to `count` items carrying only
    /// headline and body, assumed to be in the same order as `news`.
    async fn localized_news(&self, app_id: i64, count: usize) -> CollectResult<Vec<LocalizedNews>>;

    /// Current concurrent player count.
    async fn current_players(&self, app_id: i64) -> CollectResult<i64>;
}
