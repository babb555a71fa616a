//! Rate-limit aware client for the Yandex XML search API.
//!
//! Discovers the account's quota schedule, paces real network calls so
//! they never come closer together than the quota allows, and caches both
//! the schedule and individual responses in a shared store.

pub mod client;
pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod rate_limit;
pub mod search;
pub mod store;
mod xml;

pub use client::YandexXml;
pub use config::Config;
pub use error::{Error, FieldError, FieldErrors, Result};
pub use models::{Account, SearchRecord, SearchResponse, Server};
pub use rate_limit::{PacingMode, QuotaPeriod, QuotaSchedule, RateInfo};
pub use search::{SearchQuery, SearchRequest};
pub use tokio_util::sync::CancellationToken;
