/// Utility helpers shared across the collector.
///
/// This module contains:
/// - Time helpers
/// - Surrogate id generation
/// - Small string helpers used when projecting upstream data
///
/// IMPORTANT:
/// - No upstream-specific or store-specific logic should live here.
///
use std::time::{SystemTime, UNIX_EPOCH};

use rand::random_range;

/// Placeholder used by the storefront in announcement bodies.
const CLAN_IMAGE_PLACEHOLDER: &str = "{STEAM_CLAN_IMAGE}";
const CLAN_IMAGE_PREFIX: &str = "https://clan.fastly.steamstatic.com/images/";

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before UNIX_EPOCH.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Generates a new surrogate identity.
///
/// Layout: `now_ms << 20 | 20 random bits`. Ids are positive, roughly
/// time ordered, and unique with overwhelming probability across
/// concurrent tasks.
pub fn generate_id() -> i64 {
    let ts = now_ms() & ((1i64 << 43) - 1);
    let noise = random_range(0..(1i64 << 20));
    (ts << 20) | noise
}

/// Joins a list of names the way records store them ("A, B").
pub fn join_names(names: &[String]) -> String {
    names.join(", ")
}

/// Expands storefront image placeholders in announcement bodies.
///
/// Markup rendering itself (BBCode → HTML) is done by consumers.
pub fn expand_clan_images(body: &str) -> String {
    body.replace(CLAN_IMAGE_PLACEHOLDER, CLAN_IMAGE_PREFIX)
}
