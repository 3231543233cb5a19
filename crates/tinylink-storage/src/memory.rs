use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use tinylink_core::error::Result;
use tinylink_core::{OwnerId, ReadRepository, Repository, Stats, UrlHash, UrlRecord};
use tracing::trace;

/// Process-lifetime storage tier backed by DashMap.
///
/// Records are keyed by `(hash, owner)`: the outer sharded map is keyed by
/// hash, each entry holds the owners of that hash in order. Saves overwrite
/// an existing pair; conflict detection belongs to the caller.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    storage: DashMap<UrlHash, BTreeMap<OwnerId, UrlRecord>>,
}

impl MemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// Creates a new in-memory repository with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: DashMap::with_capacity(capacity),
        }
    }

    /// Number of stored `(hash, owner)` pairs.
    pub fn len(&self) -> usize {
        self.storage.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `record` and returns the record it replaced for the same
    /// `(hash, owner)` pair, if any. The check and the write happen under one
    /// shard lock.
    pub fn replace(&self, record: &UrlRecord) -> Option<UrlRecord> {
        self.storage
            .entry(record.hash.clone())
            .or_default()
            .insert(record.owner_id.clone(), record.clone())
    }
}

#[async_trait]
impl ReadRepository for MemoryRepository {
    async fn find_by_hash(&self, hash: &UrlHash) -> Result<Option<UrlRecord>> {
        let record = self
            .storage
            .get(hash)
            .and_then(|owners| owners.values().next().cloned());

        trace!(hash = %hash, hit = record.is_some(), "memory lookup by hash");
        Ok(record)
    }

    async fn find_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        let records = self
            .storage
            .iter()
            .filter_map(|entry| entry.value().get(owner).cloned())
            .collect::<Vec<_>>();

        trace!(owner = %owner, count = records.len(), "memory lookup by owner");
        Ok(records)
    }

    async fn exists(&self, hash: &UrlHash, owner: &OwnerId) -> Result<bool> {
        Ok(self
            .storage
            .get(hash)
            .is_some_and(|owners| owners.contains_key(owner)))
    }

    async fn stats(&self) -> Result<Stats> {
        let mut owners = HashSet::new();
        let mut urls = 0u64;

        for entry in self.storage.iter() {
            for (owner, record) in entry.value() {
                if record.is_deleted() {
                    continue;
                }
                urls += 1;
                owners.insert(owner.clone());
            }
        }

        Ok(Stats {
            urls,
            users: owners.len() as u64,
        })
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save(&self, record: &UrlRecord) -> Result<()> {
        self.replace(record);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.storage.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(owner: &str, hash: &str, url: &str) -> UrlRecord {
        UrlRecord {
            owner_id: OwnerId::new(owner),
            hash: UrlHash::new_unchecked(hash),
            original_url: url.to_string(),
            short_url: format!("http://localhost:8080/{hash}"),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn save_and_find_by_hash() {
        let repo = MemoryRepository::new();
        let saved = record("u1", "abc123", "https://example.com");

        repo.save(&saved).await.unwrap();

        let found = repo
            .find_by_hash(&UrlHash::new_unchecked("abc123"))
            .await
            .unwrap();
        assert_eq!(found, Some(saved));
    }

    #[tokio::test]
    async fn find_by_hash_nonexistent() {
        let repo = MemoryRepository::new();

        let found = repo
            .find_by_hash(&UrlHash::new_unchecked("nope"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn save_overwrites_same_pair() {
        let repo = MemoryRepository::new();

        repo.save(&record("u1", "abc123", "https://old.example"))
            .await
            .unwrap();
        repo.save(&record("u1", "abc123", "https://new.example"))
            .await
            .unwrap();

        assert_eq!(repo.len(), 1);
        let found = repo
            .find_by_hash(&UrlHash::new_unchecked("abc123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.original_url, "https://new.example");
    }

    #[test]
    fn replace_reports_previous_record() {
        let repo = MemoryRepository::new();
        let first = record("u1", "abc123", "https://old.example");

        assert_eq!(repo.replace(&first), None);
        assert_eq!(
            repo.replace(&record("u1", "abc123", "https://new.example")),
            Some(first)
        );
        assert_eq!(repo.replace(&record("u2", "abc123", "https://old.example")), None);
    }

    #[tokio::test]
    async fn two_owners_keep_independent_records() {
        let repo = MemoryRepository::new();

        repo.save(&record("u2", "abc123", "https://example.com"))
            .await
            .unwrap();
        repo.save(&record("u1", "abc123", "https://example.com"))
            .await
            .unwrap();

        assert_eq!(repo.len(), 2);
        assert_eq!(repo.find_by_owner(&OwnerId::new("u1")).await.unwrap().len(), 1);
        assert_eq!(repo.find_by_owner(&OwnerId::new("u2")).await.unwrap().len(), 1);

        // Lowest owner id wins when several owners hold the hash.
        let found = repo
            .find_by_hash(&UrlHash::new_unchecked("abc123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.owner_id, OwnerId::new("u1"));
    }

    #[tokio::test]
    async fn exists_checks_owner() {
        let repo = MemoryRepository::new();
        let hash = UrlHash::new_unchecked("abc123");

        assert!(!repo.exists(&hash, &OwnerId::new("u1")).await.unwrap());

        repo.save(&record("u1", "abc123", "https://example.com"))
            .await
            .unwrap();

        assert!(repo.exists(&hash, &OwnerId::new("u1")).await.unwrap());
        assert!(!repo.exists(&hash, &OwnerId::new("u2")).await.unwrap());
    }

    #[tokio::test]
    async fn stats_counts_urls_and_owners() {
        let repo = MemoryRepository::new();

        repo.save(&record("u1", "a1", "https://a.example")).await.unwrap();
        repo.save(&record("u1", "b1", "https://b.example")).await.unwrap();
        repo.save(&record("u2", "a1", "https://a.example")).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats, Stats { urls: 3, users: 2 });
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let repo = MemoryRepository::new();

        repo.save(&record("u1", "abc123", "https://example.com"))
            .await
            .unwrap();
        repo.clear().await.unwrap();

        assert!(repo.is_empty());
        assert!(repo
            .find_by_owner(&OwnerId::new("u1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn concurrent_access() {
        let repo = Arc::new(MemoryRepository::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let r = record("u1", &format!("code-{:03}", i), &format!("https://example{}.com", i));
                repo.save(&r).await.unwrap();
            }));
        }

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let _ = repo
                    .find_by_hash(&UrlHash::new_unchecked(format!("code-{:03}", i)))
                    .await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let owned = repo.find_by_owner(&OwnerId::new("u1")).await.unwrap();
        assert_eq!(owned.len(), 10);
    }
}
