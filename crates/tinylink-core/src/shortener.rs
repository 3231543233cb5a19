use crate::hash::UrlHash;
use crate::owner::OwnerId;
use crate::repository::{Stats, UrlRecord};
use async_trait::async_trait;

type Result<T> = std::result::Result<T, crate::error::ShortenerError>;

/// A freshly shortened URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub hash: UrlHash,
    pub short_url: String,
}

/// One entry of a bulk shorten request.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Caller-chosen identifier, used as the hash of the stored record.
    pub correlation_id: String,
    /// The original URL to be shortened.
    pub original_url: String,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens a URL on behalf of `owner`.
    ///
    /// Returns `Err(Conflict)` carrying the existing short URL when the owner
    /// has already shortened the same URL.
    async fn shorten(&self, owner: &OwnerId, original_url: String) -> Result<Shortened>;

    /// Shortens several URLs at once, in request order.
    async fn shorten_batch(&self, owner: &OwnerId, items: Vec<BatchItem>)
        -> Result<Vec<Shortened>>;

    /// Resolves a hash to its live record.
    async fn resolve(&self, hash: &UrlHash) -> Result<UrlRecord>;

    /// Lists the live records created by `owner`.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>>;

    /// Schedules soft deletion of `hashes` and returns immediately.
    async fn delete(&self, hashes: Vec<UrlHash>) -> Result<()>;

    /// Checks database liveness.
    async fn ping(&self) -> Result<()>;

    /// Counts live records and distinct owners.
    async fn stats(&self) -> Result<Stats>;
}
