//! Upstream provider layer
//!
//! This module provides:
//! - The `CatalogProvider` contract consumed by the collector
//! - The storefront adapter speaking the real HTTP endpoints
//!
//! Transport details (URLs, query parameters, field paths) must live in
//! adapter modules. The rest of the application only sees typed DTOs
//! from `crate::schema`.

pub mod adapter;
pub mod steam;

pub use adapter::CatalogProvider;
