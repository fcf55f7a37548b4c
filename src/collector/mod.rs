/// Collector module
///
/// This module groups all logic responsible for:
/// - Shaping upstream traffic (limiter)
/// - Running entity tasks with bounded concurrency (pool, task)
/// - Turning upstream answers into canonical rows (locale, news)
/// - Driving scheduled cycles (runner)
///
/// The collector layer sits between:
/// - The upstream adapter (`upstream::CatalogProvider`)
/// - The store and cache projections
///
/// Design notes:
/// - Upstream-specific parsing MUST NOT live here
/// - SQL and cache commands MUST NOT live here
///
pub mod limiter;
pub mod locale;
pub mod news;
pub mod pool;
pub mod runner;
pub mod task;

pub use runner::{Collaborators, Collector, CycleKind, run_schedule};
