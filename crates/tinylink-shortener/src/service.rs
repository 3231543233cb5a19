use async_trait::async_trait;
use std::sync::Arc;
use tinylink_core::{
    derive, BatchItem, OwnerId, Repository, Shortened, Shortener, ShortenerError,
    SoftDeleteRepository, Stats, StorageError, UrlHash, UrlRecord,
};
use tinylink_storage::{FileRepository, PostgresRepository, Storage};
use tracing::debug;

/// A concrete implementation of the `Shortener` trait.
///
/// This service wraps the storage coordinator to handle:
/// - URL validation
/// - Hash derivation and short URL construction
/// - Mapping storage outcomes to [`ShortenerError`]
///
/// Shortening is idempotent per owner: the hash is derived from the URL, so
/// shortening the same URL twice yields `Conflict` with the existing short URL.
#[derive(Debug)]
pub struct ShortenerService<F = FileRepository, D = PostgresRepository> {
    storage: Arc<Storage<F, D>>,
    base_url: String,
}

impl<F, D> Clone for ShortenerService<F, D> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            base_url: self.base_url.clone(),
        }
    }
}

impl<F, D> ShortenerService<F, D>
where
    F: Repository,
    D: SoftDeleteRepository,
{
    /// Creates a new `ShortenerService` producing short URLs under `base_url`.
    pub fn new(storage: Storage<F, D>, base_url: impl Into<String>) -> Self {
        Self {
            storage: Arc::new(storage),
            base_url: base_url.into(),
        }
    }

    /// Returns the underlying storage coordinator.
    pub fn storage(&self) -> &Storage<F, D> {
        &self.storage
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validates that the URL is an absolute http(s) URL with a host.
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        // Authority ends at the first path, query or fragment delimiter.
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();
        if host.is_empty() || host.starts_with(':') || url.chars().any(char::is_whitespace) {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        }

        Ok(())
    }

    fn record(&self, owner: &OwnerId, hash: UrlHash, original_url: String) -> UrlRecord {
        UrlRecord {
            owner_id: owner.clone(),
            short_url: hash.to_url(&self.base_url),
            hash,
            original_url,
            deleted_at: None,
        }
    }
}

#[async_trait]
impl<F, D> Shortener for ShortenerService<F, D>
where
    F: Repository,
    D: SoftDeleteRepository,
{
    async fn shorten(
        &self,
        owner: &OwnerId,
        original_url: String,
    ) -> Result<Shortened, ShortenerError> {
        let original_url = original_url.trim().to_string();
        Self::validate_url(&original_url)?;

        let derived = derive(&original_url, &self.base_url);
        let record = self.record(owner, derived.hash.clone(), original_url);

        match self.storage.save(&record).await {
            Ok(()) => {
                debug!(hash = %derived.hash, owner = %owner, "shortened url");
                Ok(Shortened {
                    hash: derived.hash,
                    short_url: derived.short_url,
                })
            }
            Err(StorageError::Conflict(_)) => Err(ShortenerError::Conflict {
                short_url: derived.short_url,
            }),
            Err(e) => Err(storage_to_shortener_error(e)),
        }
    }

    async fn shorten_batch(
        &self,
        owner: &OwnerId,
        items: Vec<BatchItem>,
    ) -> Result<Vec<Shortened>, ShortenerError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let hash = UrlHash::new(item.correlation_id)?;
            let original_url = item.original_url.trim().to_string();
            Self::validate_url(&original_url)?;
            records.push(self.record(owner, hash, original_url));
        }

        self.storage
            .save_batch(&records)
            .await
            .map_err(storage_to_shortener_error)?;

        debug!(owner = %owner, count = records.len(), "shortened url batch");
        Ok(records
            .into_iter()
            .map(|record| Shortened {
                hash: record.hash,
                short_url: record.short_url,
            })
            .collect())
    }

    async fn resolve(&self, hash: &UrlHash) -> Result<UrlRecord, ShortenerError> {
        let record = self
            .storage
            .find_by_hash(hash)
            .await
            .map_err(storage_to_shortener_error)?;

        match record {
            None => Err(ShortenerError::NotFound(hash.to_string())),
            Some(record) if record.is_deleted() => Err(ShortenerError::Deleted(hash.to_string())),
            Some(record) => Ok(record),
        }
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>, ShortenerError> {
        let records = self
            .storage
            .find_by_owner(owner)
            .await
            .map_err(storage_to_shortener_error)?;

        Ok(records
            .into_iter()
            .filter(|record| !record.is_deleted())
            .collect())
    }

    async fn delete(&self, hashes: Vec<UrlHash>) -> Result<(), ShortenerError> {
        self.storage
            .delete_by_hash(hashes)
            .await
            .map_err(storage_to_shortener_error)
    }

    async fn ping(&self) -> Result<(), ShortenerError> {
        self.storage.ping().await.map_err(storage_to_shortener_error)
    }

    async fn stats(&self) -> Result<Stats, ShortenerError> {
        self.storage.stats().await.map_err(storage_to_shortener_error)
    }
}

/// Converts a StorageError to a ShortenerError.
fn storage_to_shortener_error(e: StorageError) -> ShortenerError {
    ShortenerError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tinylink_storage::MemoryRepository;

    const BASE_URL: &str = "http://localhost:8080";

    async fn test_service(dir: &TempDir) -> ShortenerService {
        let file = FileRepository::open(dir.path().join("urls.jsonl"))
            .await
            .unwrap();
        let storage: Storage = Storage::new(MemoryRepository::new(), file, None);
        ShortenerService::new(storage, BASE_URL)
    }

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id)
    }

    #[tokio::test]
    async fn shorten_derives_md5_hash() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let shortened = service
            .shorten(&owner("u1"), "http://example.com/a".to_string())
            .await
            .unwrap();

        let expected = derive("http://example.com/a", BASE_URL);
        assert_eq!(shortened.hash, expected.hash);
        assert_eq!(shortened.hash.as_str().len(), 32);
        assert_eq!(
            shortened.short_url,
            format!("{BASE_URL}/{}", shortened.hash)
        );
    }

    #[tokio::test]
    async fn shorten_twice_conflicts_with_existing_short_url() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;
        let url = "https://example.com".to_string();

        let first = service.shorten(&owner("u1"), url.clone()).await.unwrap();
        let err = service.shorten(&owner("u1"), url).await.unwrap_err();

        assert_eq!(
            err,
            ShortenerError::Conflict {
                short_url: first.short_url
            }
        );
        assert_eq!(service.list(&owner("u1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_url_for_two_owners_is_not_a_conflict() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;
        let url = "https://example.com".to_string();

        let a = service.shorten(&owner("u1"), url.clone()).await.unwrap();
        let b = service.shorten(&owner("u2"), url).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(service.stats().await.unwrap(), Stats { urls: 2, users: 2 });
    }

    #[tokio::test]
    async fn shorten_with_invalid_url_fails() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        for url in ["", "not-a-valid-url", "ftp://example.com", "http://", "http:///path"] {
            let err = service
                .shorten(&owner("u1"), url.to_string())
                .await
                .unwrap_err();
            assert!(
                matches!(err, ShortenerError::InvalidUrl(_)),
                "{url} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn resolve_existing_url() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let shortened = service
            .shorten(&owner("u1"), "https://example.com".to_string())
            .await
            .unwrap();

        let record = service.resolve(&shortened.hash).await.unwrap();
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.owner_id, owner("u1"));
    }

    #[tokio::test]
    async fn resolve_nonexistent_url() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let err = service
            .resolve(&UrlHash::new_unchecked("nonexistent"))
            .await
            .unwrap_err();
        assert_eq!(err, ShortenerError::NotFound("nonexistent".to_string()));
    }

    #[tokio::test]
    async fn batch_uses_correlation_ids_as_hashes() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let shortened = service
            .shorten_batch(
                &owner("u1"),
                vec![
                    BatchItem {
                        correlation_id: "first".to_string(),
                        original_url: "https://one.example".to_string(),
                    },
                    BatchItem {
                        correlation_id: "second".to_string(),
                        original_url: "https://two.example".to_string(),
                    },
                ],
            )
            .await
            .unwrap();

        let urls: Vec<_> = shortened.iter().map(|s| s.short_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:8080/first",
                "http://localhost:8080/second"
            ]
        );

        let listed = service.list(&owner("u1")).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(service.list(&owner("u2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_rejects_bad_items_before_saving() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let err = service
            .shorten_batch(
                &owner("u1"),
                vec![
                    BatchItem {
                        correlation_id: "ok".to_string(),
                        original_url: "https://one.example".to_string(),
                    },
                    BatchItem {
                        correlation_id: "not ok".to_string(),
                        original_url: "https://two.example".to_string(),
                    },
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShortenerError::InvalidHash(_)));
        assert!(service.list(&owner("u1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ping_without_database_fails() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let err = service.ping().await.unwrap_err();
        assert_eq!(err, ShortenerError::Storage("no database connection".to_string()));
    }

    #[tokio::test]
    async fn delete_without_database_is_accepted() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let shortened = service
            .shorten(&owner("u1"), "https://example.com".to_string())
            .await
            .unwrap();
        service.delete(vec![shortened.hash.clone()]).await.unwrap();

        assert!(service.resolve(&shortened.hash).await.is_ok());
    }
}
