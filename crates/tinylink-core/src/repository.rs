use crate::error::{Result, StorageError};
use crate::hash::UrlHash;
use crate::owner::OwnerId;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A stored URL record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The browser that shortened the URL.
    pub owner_id: OwnerId,
    /// The content-derived identifier.
    pub hash: UrlHash,
    /// The original URL that was shortened.
    pub original_url: String,
    /// `base_url + "/" + hash`, stored for fast responses.
    pub short_url: String,
    /// When the record was soft-deleted, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl UrlRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Live record and distinct owner counts of a tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub urls: u64,
    pub users: u64,
}

/// The read side of a storage tier.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves a record for the given hash.
    /// Returns `None` if no owner holds the hash in this tier.
    async fn find_by_hash(&self, hash: &UrlHash) -> Result<Option<UrlRecord>>;

    /// Retrieves every record created by `owner`.
    async fn find_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>>;

    /// Checks whether `owner` already holds `hash` in this tier.
    async fn exists(&self, hash: &UrlHash, owner: &OwnerId) -> Result<bool> {
        let records = self.find_by_owner(owner).await?;
        Ok(records.iter().any(|record| &record.hash == hash))
    }

    /// Counts live records and distinct owners.
    async fn stats(&self) -> Result<Stats>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Persists a record.
    ///
    /// Whether an existing `(hash, owner)` pair is overwritten or rejected
    /// with `Err(Conflict)` is up to the tier.
    async fn save(&self, record: &UrlRecord) -> Result<()>;

    /// Persists several records. Tiers with a bulk path override this.
    async fn save_batch(&self, records: &[UrlRecord]) -> Result<()> {
        for record in records {
            self.save(record).await?;
        }
        Ok(())
    }

    /// Removes everything this tier holds.
    async fn clear(&self) -> Result<()> {
        Err(StorageError::Unsupported("clear"))
    }
}

/// A tier that supports logical deletion and liveness checks.
#[async_trait]
pub trait SoftDeleteRepository: Repository {
    /// Marks every record with one of `hashes` as deleted.
    /// Returns the number of records that changed.
    async fn delete_by_hashes(&self, hashes: &[UrlHash]) -> Result<u64>;

    /// Checks that the backing store is reachable.
    async fn ping(&self) -> Result<()>;
}
