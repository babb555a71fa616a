//! Search queries: validation, rendering, paced execution and parsing.

mod executor;
mod query;
mod response;

pub use executor::{SearchExecutor, SearchRequest, DEFAULT_CACHE_TTL};
pub use query::{validate, SearchQuery, ValidatedQuery};
pub use response::parse_search;
