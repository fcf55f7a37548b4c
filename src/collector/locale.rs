use std::collections::BTreeMap;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::collector::limiter::{RateLimiters, RequestClass};
use crate::error::{CollectError, CollectResult};
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::{
    AppDetails, CanonicalRecord, CatalogEntry, Language, Movie, PcRequirements, Price,
    PriceListEntry, Probe, Screenshot, SupportInfo,
};
use crate::upstream::CatalogProvider;
use crate::util::join_names;

// ------------------------------------------------------------
// Locale aggregation
// ------------------------------------------------------------
//
// Folds the answers of every region probe of one game into one
// canonical record per language.
//
// RULES:
// - Probes are merged in configuration order.
// - Descriptive fields are fill-once: the first probe of a language
//   that carries a field wins it; later probes only fill gaps.
// - Region prices are recorded per region code, first answer wins.
// - A free answer from any probe is sticky for the whole game: it
//   replaces every region price and both language prices.
// - A language with no successful probe yields no record, so a cycle
//   never blanks out data collected earlier.
//

/// Partially filled record of one language.
#[derive(Debug, Default)]
struct LocaleSlot {
    seen: bool,
    price: Option<Price>,
    supported_languages: Option<String>,
    date: Option<String>,
    platforms: Option<String>,
    developers: Option<String>,
    publishers: Option<String>,
    header_image: Option<String>,
    short_description: Option<String>,
    required_age: Option<String>,
    support: Option<SupportInfo>,
    website: Option<String>,
    content_descriptors: Option<String>,
    screenshots: Option<Vec<Screenshot>>,
    movies: Option<Vec<Movie>>,
    detailed_description: Option<String>,
    about_the_game: Option<String>,
    pc_requirements: Option<PcRequirements>,
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Merge state of one game across all probes.
#[derive(Debug, Default)]
pub struct LocaleAggregate {
    free: bool,
    regions: Vec<(String, Price)>,
    slots: BTreeMap<Language, LocaleSlot>,
}

impl LocaleAggregate {
    /// Merges one successful probe answer.
    pub fn merge(&mut self, probe: &Probe, details: AppDetails) {
        let lang = probe.lang;

        if details.is_free {
            self.free = true;
            self.regions.clear();
        } else if !self.free {
            let price = details.price.clone().unwrap_or_default();
            if !self.regions.iter().any(|(code, _)| *code == probe.code) {
                self.regions.push((probe.code.clone(), price.clone()));
            }
            fill(&mut self.slot(lang).price, Some(price));
        }

        let slot = self.slot(lang);
        slot.seen = true;

        fill(&mut slot.supported_languages, details.supported_languages);
        fill(
            &mut slot.date,
            details.release.map(|r| {
                if r.coming_soon {
                    lang.coming_soon().to_string()
                } else {
                    r.date
                }
            }),
        );
        fill(&mut slot.platforms, details.platforms.map(|p| p.display()));
        fill(&mut slot.developers, details.developers.map(|d| join_names(&d)));
        fill(&mut slot.publishers, details.publishers.map(|p| join_names(&p)));
        fill(&mut slot.header_image, details.header_image);
        fill(&mut slot.short_description, details.short_description);
        fill(&mut slot.required_age, details.required_age);
        fill(&mut slot.support, details.support);
        fill(&mut slot.website, details.website);
        fill(&mut slot.content_descriptors, details.content_notes);
        fill(&mut slot.screenshots, details.screenshots);
        fill(&mut slot.movies, details.movies);
        fill(&mut slot.detailed_description, details.detailed_description);
        fill(&mut slot.about_the_game, details.about_the_game);
        fill(&mut slot.pc_requirements, details.pc_requirements);
    }

    pub fn is_free(&self) -> bool {
        self.free
    }

    fn slot(&mut self, lang: Language) -> &mut LocaleSlot {
        self.slots.entry(lang).or_default()
    }

    /// JSON price list shared by both language records.
    pub fn price_list(&self) -> CollectResult<String> {
        let entries: Vec<PriceListEntry> = if self.free {
            vec![PriceListEntry::free()]
        } else {
            self.regions
                .iter()
                .map(|(code, price)| PriceListEntry {
                    price: price.final_formatted.clone(),
                    country: code.clone(),
                })
                .collect()
        };
        Ok(serde_json::to_string(&entries)?)
    }

    /// Produces the candidate records (identity not yet assigned).
    pub fn finish(self, game_id: i64) -> CollectResult<Vec<CanonicalRecord>> {
        let price_list = self.price_list()?;
        let free = self.free;

        let records = self
            .slots
            .into_iter()
            .filter(|(_, slot)| slot.seen)
            .map(|(lang, slot)| CanonicalRecord {
                id: 0,
                game_id,
                lang,
                price: if free {
                    Price::free(lang)
                } else {
                    slot.price.unwrap_or_default()
                },
                price_list: price_list.clone(),
                supported_languages: slot.supported_languages.unwrap_or_default(),
                developers: slot.developers.unwrap_or_default(),
                publishers: slot.publishers.unwrap_or_default(),
                platforms: slot.platforms.unwrap_or_default(),
                date: slot.date.unwrap_or_default(),
                header_image: slot.header_image.unwrap_or_default(),
                short_description: slot.short_description.unwrap_or_default(),
                required_age: slot.required_age.unwrap_or_default(),
                support: slot.support.unwrap_or_default(),
                website: slot.website.unwrap_or_default(),
                content_descriptors: slot.content_descriptors.unwrap_or_default(),
                screenshots: slot.screenshots.unwrap_or_default(),
                movies: slot.movies.unwrap_or_default(),
                detailed_description: slot.detailed_description.unwrap_or_default(),
                about_the_game: slot.about_the_game.unwrap_or_default(),
                pc_requirements: slot.pc_requirements.unwrap_or_default(),
                hot_index: 0,
            })
            .collect();

        Ok(records)
    }
}

/// Probes every configured region for one game and aggregates the
/// answers.
///
/// ERRORS:
/// - `Cancelled` / `UpstreamUnavailable` abort the whole game: no
///   record is produced from a partial probe set.
/// - `UpstreamRejected` / `MalformedPayload` only skip that probe.
///
pub async fn collect_records(
    provider: &dyn CatalogProvider,
    limiters: &RateLimiters,
    cancel: &CancellationToken,
    entry: CatalogEntry,
    probes: &[Probe],
) -> CollectResult<Vec<CanonicalRecord>> {
    let mut agg = LocaleAggregate::default();

    for probe in probes {
        limiters.acquire(RequestClass::Storefront, cancel).await?;
        RuntimeMetrics::incr(&METRICS.upstream_requests);

        match provider.app_details(entry.app_id, probe).await {
            Ok(details) => agg.merge(probe, details),
            Err(err @ (CollectError::UpstreamRejected { .. } | CollectError::MalformedPayload(_))) => {
                RuntimeMetrics::incr(&METRICS.upstream_rejections);
                warn!(
                    "[{}] app {} probe {}: skipped ({err})",
                    provider.name(),
                    entry.app_id,
                    probe.code
                );
            }
            Err(err) => return Err(err),
        }
    }

    debug!(
        "[{}] app {} aggregated (free={})",
        provider.name(),
        entry.app_id,
        agg.is_free()
    );
    agg.finish(entry.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Platforms, ReleaseInfo};

    fn probe(code: &str, lang: Language) -> Probe {
        Probe { code: code.into(), lang }
    }

    fn priced(formatted: &str, final_price: i64) -> AppDetails {
        AppDetails {
            price: Some(Price {
                final_price,
                final_formatted: formatted.into(),
                currency: "X".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn record(records: &[CanonicalRecord], lang: Language) -> &CanonicalRecord {
        records.iter().find(|r| r.lang == lang).unwrap()
    }

    #[test]
    fn first_probe_of_a_language_wins_each_field() {
        let mut agg = LocaleAggregate::default();

        let mut cn = priced("¥ 98", 9800);
        cn.short_description = Some("cn description".into());
        cn.release = Some(ReleaseInfo { coming_soon: false, date: "2024 年 1 月 1 日".into() });
        agg.merge(&probe("CN", Language::Zh), cn);

        let mut hk = priced("HK$ 120", 12000);
        hk.short_description = Some("hk description".into());
        hk.website = Some("https://hk.example".into());
        agg.merge(&probe("HK", Language::Zh), hk);

        let records = agg.finish(5).unwrap();
        let zh = record(&records, Language::Zh);
        assert_eq!(zh.short_description, "cn description");
        assert_eq!(zh.website, "https://hk.example");
        assert_eq!(zh.date, "2024 年 1 月 1 日");
        assert_eq!(zh.price.final_formatted, "¥ 98");
        assert!(records.iter().all(|r| r.lang != Language::En));
    }

    #[test]
    fn first_developer_wins() {
        let mut agg = LocaleAggregate::default();
        for (code, dev) in [("CN", "A"), ("HK", "B")] {
            agg.merge(
                &probe(code, Language::Zh),
                AppDetails { developers: Some(vec![dev.into()]), ..Default::default() },
            );
        }
        let records = agg.finish(1).unwrap();
        assert_eq!(record(&records, Language::Zh).developers, "A");
    }

    #[test]
    fn free_first_probe_ignores_later_prices() {
        let mut agg = LocaleAggregate::default();
        agg.merge(
            &probe("CN", Language::Zh),
            AppDetails { is_free: true, ..Default::default() },
        );
        agg.merge(&probe("HK", Language::Zh), priced("HK$ 120", 12000));
        agg.merge(&probe("US", Language::En), priced("$ 14.99", 1499));

        assert_eq!(agg.price_list().unwrap(), r#"[{"price":"free","country":"免费"}]"#);
        let records = agg.finish(1).unwrap();
        assert_eq!(record(&records, Language::En).price, Price::free(Language::En));
    }

    #[test]
    fn later_region_fills_language_price_when_first_was_rejected() {
        let mut agg = LocaleAggregate::default();
        agg.merge(&probe("HK", Language::Zh), priced("HK$ 120", 12000));
        agg.merge(&probe("US", Language::En), priced("$ 14.99", 1499));

        let records = agg.finish(1).unwrap();
        assert_eq!(record(&records, Language::Zh).price.final_price, 12000);
        assert_eq!(record(&records, Language::En).price.final_price, 1499);

        let list: Vec<PriceListEntry> =
            serde_json::from_str(&record(&records, Language::En).price_list).unwrap();
        let countries: Vec<_> = list.iter().map(|e| e.country.as_str()).collect();
        assert_eq!(countries, ["HK", "US"]);
        assert_eq!(list[1].price, "$ 14.99");
    }

    #[test]
    fn free_answer_short_circuits_all_pricing() {
        let mut agg = LocaleAggregate::default();
        agg.merge(&probe("CN", Language::Zh), priced("¥ 98", 9800));
        agg.merge(
            &probe("US", Language::En),
            AppDetails { is_free: true, ..Default::default() },
        );
        // A paid answer after the free one must not bring prices back.
        agg.merge(&probe("HK", Language::Zh), priced("HK$ 120", 12000));

        let records = agg.finish(1).unwrap();
        let zh = record(&records, Language::Zh);
        let en = record(&records, Language::En);
        assert_eq!(zh.price, Price::free(Language::Zh));
        assert_eq!(en.price, Price::free(Language::En));
        assert_eq!(zh.price_list, r#"[{"price":"free","country":"免费"}]"#);
        assert_eq!(zh.price_list, en.price_list);
    }

    #[test]
    fn coming_soon_and_list_fields_are_projected() {
        let mut agg = LocaleAggregate::default();
        agg.merge(
            &probe("US", Language::En),
            AppDetails {
                release: Some(ReleaseInfo { coming_soon: true, date: "Q3".into() }),
                platforms: Some(Platforms { windows: true, mac: true, linux: false }),
                developers: Some(vec!["A".into(), "B".into()]),
                ..Default::default()
            },
        );
        agg.merge(
            &probe("CN", Language::Zh),
            AppDetails {
                release: Some(ReleaseInfo { coming_soon: true, date: String::new() }),
                ..Default::default()
            },
        );

        let records = agg.finish(1).unwrap();
        let en = record(&records, Language::En);
        assert_eq!(en.date, "coming soon");
        assert_eq!(en.platforms, "windows, mac");
        assert_eq!(en.developers, "A, B");
        assert_eq!(record(&records, Language::Zh).date, "即将推出");
    }

    #[test]
    fn malformed_field_still_counts_as_filled() {
        let mut agg = LocaleAggregate::default();
        // The adapter hands malformed fields over as zero values.
        agg.merge(
            &probe("CN", Language::Zh),
            AppDetails { screenshots: Some(Vec::new()), ..Default::default() },
        );
        agg.merge(
            &probe("HK", Language::Zh),
            AppDetails {
                screenshots: Some(vec![Screenshot { id: 1, ..Default::default() }]),
                ..Default::default()
            },
        );
        let records = agg.finish(1).unwrap();
        assert!(record(&records, Language::Zh).screenshots.is_empty());
    }
}
