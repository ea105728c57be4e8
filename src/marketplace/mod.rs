//! Marketplace integrations.
//!
//! Defines the `ListingSource` trait and the Lost Ark Open API client that
//! implements it. The scheduler only ever talks to the trait.

pub mod lostark;

use async_trait::async_trait;

use crate::types::{FetchError, FetchOutcome, SearchQuery};

/// Abstraction over a listings search endpoint.
///
/// Implementors run one search and hand back the raw records untouched.
/// No local state is mutated and nothing is retried.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Run one search. An empty result set is `Ok(FetchOutcome::Empty)`.
    async fn fetch_listings(&self, query: &SearchQuery) -> Result<FetchOutcome, FetchError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}
