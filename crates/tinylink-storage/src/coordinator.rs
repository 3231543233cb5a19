use crate::deleter::{DeleteQueue, DEFAULT_DELETE_WORKERS};
use crate::file::FileRepository;
use crate::memory::MemoryRepository;
use crate::postgres::PostgresRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tinylink_core::error::{Result, StorageError};
use tinylink_core::{
    OwnerId, ReadRepository, Repository, SoftDeleteRepository, Stats, UrlHash, UrlRecord,
};
use tracing::{debug, trace, warn};

/// Upper bound on a database liveness check.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Multi-tier storage coordinator.
///
/// Writes go through every tier in order **memory → file → database**; reads
/// probe **database → file → memory** and stop at the first hit. Only the
/// memory tier is authoritative for failures: file and database errors are
/// logged and the operation degrades to the tiers that still work.
///
/// # Type Parameters
///
/// * `F` - The file tier (normally [`FileRepository`])
/// * `D` - The optional database tier (normally [`PostgresRepository`])
///
/// # Example
///
/// ```rust,no_run
/// use tinylink_storage::{FileRepository, MemoryRepository, PostgresRepository, Storage};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let file = FileRepository::open("./urls.jsonl").await?;
/// let database = PostgresRepository::connect("postgres://localhost/tinylink").await.ok();
/// let storage = Storage::new(MemoryRepository::new(), file, database);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Storage<F = FileRepository, D = PostgresRepository> {
    memory: MemoryRepository,
    file: F,
    database: Option<Arc<D>>,
    deletes: Option<DeleteQueue>,
}

impl<F, D> Storage<F, D>
where
    F: Repository,
    D: SoftDeleteRepository,
{
    /// Creates a coordinator with the default number of delete workers.
    ///
    /// Must be called from within a Tokio runtime when a database is given,
    /// since the delete dispatcher is spawned here.
    pub fn new(memory: MemoryRepository, file: F, database: Option<D>) -> Self {
        Self::with_delete_workers(memory, file, database, DEFAULT_DELETE_WORKERS)
    }

    /// Creates a coordinator that runs at most `workers` delete batches at once.
    pub fn with_delete_workers(
        memory: MemoryRepository,
        file: F,
        database: Option<D>,
        workers: usize,
    ) -> Self {
        let database = database.map(Arc::new);
        let deletes = database
            .as_ref()
            .map(|db| DeleteQueue::spawn(Arc::clone(db), workers));

        Self {
            memory,
            file,
            database,
            deletes,
        }
    }

    pub fn memory(&self) -> &MemoryRepository {
        &self.memory
    }

    pub fn file(&self) -> &F {
        &self.file
    }

    pub fn database(&self) -> Option<&D> {
        self.database.as_deref()
    }

    /// Persists a record in every tier.
    ///
    /// Returns `Err(Conflict)` when the `(hash, owner)` pair was already held
    /// by the memory or file tier, or the database rejected it as a duplicate.
    /// All tiers have been written by then either way.
    pub async fn save(&self, record: &UrlRecord) -> Result<()> {
        let hash = &record.hash;
        let owner = &record.owner_id;

        let mut conflict = self.memory.replace(record).is_some();

        match self.file.exists(hash, owner).await {
            Ok(true) => conflict = true,
            Ok(false) => {
                if let Err(e) = self.file.save(record).await {
                    warn!(hash = %hash, error = %e, "file tier save failed");
                }
            }
            Err(e) => warn!(hash = %hash, error = %e, "file tier lookup failed"),
        }

        match self.database_op(|db| async move { db.save(record).await }).await {
            Ok(()) => {}
            Err(StorageError::NoBackingStore) => {}
            Err(StorageError::Conflict(_)) => conflict = true,
            Err(e) => warn!(hash = %hash, error = %e, "database tier save failed"),
        }

        if conflict {
            debug!(hash = %hash, owner = %owner, "url already shortened");
            return Err(StorageError::Conflict(hash.to_string()));
        }

        Ok(())
    }

    /// Persists several records in every tier without conflict reporting.
    pub async fn save_batch(&self, records: &[UrlRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.memory.save_batch(records).await?;

        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            match self.file.exists(&record.hash, &record.owner_id).await {
                Ok(true) => {}
                Ok(false) => pending.push(record.clone()),
                Err(e) => {
                    warn!(hash = %record.hash, error = %e, "file tier lookup failed");
                }
            }
        }
        if let Err(e) = self.file.save_batch(&pending).await {
            warn!(count = pending.len(), error = %e, "file tier batch save failed");
        }

        match self
            .database_op(|db| async move { db.save_batch(records).await })
            .await
        {
            Ok(()) | Err(StorageError::NoBackingStore) => {}
            Err(e) => warn!(count = records.len(), error = %e, "database tier batch save failed"),
        }

        Ok(())
    }

    /// Resolves a hash, probing database, then file, then memory.
    ///
    /// A record soft-deleted in the database is returned as is, with
    /// `deleted_at` set, even when older copies exist in the other tiers.
    pub async fn find_by_hash(&self, hash: &UrlHash) -> Result<Option<UrlRecord>> {
        match self
            .database_op(|db| async move { db.find_by_hash(hash).await })
            .await
        {
            Ok(Some(record)) => {
                debug!(hash = %hash, "database tier hit");
                return Ok(Some(record));
            }
            Ok(None) | Err(StorageError::NoBackingStore) => {
                trace!(hash = %hash, "database tier miss");
            }
            Err(e) => warn!(hash = %hash, error = %e, "database tier lookup failed"),
        }

        match self.file.find_by_hash(hash).await {
            Ok(Some(record)) => {
                debug!(hash = %hash, "file tier hit");
                return Ok(Some(record));
            }
            Ok(None) => trace!(hash = %hash, "file tier miss"),
            Err(e) => warn!(hash = %hash, error = %e, "file tier lookup failed"),
        }

        let record = self.memory.find_by_hash(hash).await?;
        if record.is_some() {
            debug!(hash = %hash, "memory tier hit");
        }
        Ok(record)
    }

    /// Lists the records of `owner` across every tier, ordered by hash.
    ///
    /// Tiers are merged database, then memory, then file; the first tier to
    /// report a hash wins.
    pub async fn find_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        let mut merged: BTreeMap<UrlHash, UrlRecord> = BTreeMap::new();
        let mut merge = |records: Vec<UrlRecord>| {
            for record in records {
                merged.entry(record.hash.clone()).or_insert(record);
            }
        };

        match self
            .database_op(|db| async move { db.find_by_owner(owner).await })
            .await
        {
            Ok(records) => merge(records),
            Err(StorageError::NoBackingStore) => {}
            Err(e) => warn!(owner = %owner, error = %e, "database tier listing failed"),
        }

        merge(self.memory.find_by_owner(owner).await?);

        match self.file.find_by_owner(owner).await {
            Ok(records) => merge(records),
            Err(e) => warn!(owner = %owner, error = %e, "file tier listing failed"),
        }

        Ok(merged.into_values().collect())
    }

    /// Schedules soft deletion of `hashes` in the database tier.
    ///
    /// Returns once the batch is queued. Without a database the request is
    /// ignored, since the other tiers cannot represent deletion.
    pub async fn delete_by_hash(&self, hashes: Vec<UrlHash>) -> Result<()> {
        if hashes.is_empty() {
            return Ok(());
        }

        match &self.deletes {
            Some(queue) => queue.submit(hashes),
            None => {
                debug!(count = hashes.len(), "no database configured, ignoring delete");
                Ok(())
            }
        }
    }

    /// Clears the memory tier and removes the file log. Database rows stay.
    pub async fn purge(&self) -> Result<()> {
        self.memory.clear().await?;
        self.file.clear().await?;
        debug!("purged memory and file tiers");
        Ok(())
    }

    /// Checks database liveness, bounded by [`PING_TIMEOUT`].
    pub async fn ping(&self) -> Result<()> {
        let database = self.database.as_ref().ok_or(StorageError::NoBackingStore)?;

        tokio::time::timeout(PING_TIMEOUT, database.ping())
            .await
            .map_err(|_| {
                StorageError::Timeout(format!(
                    "database ping exceeded {}s",
                    PING_TIMEOUT.as_secs()
                ))
            })?
    }

    /// Counts live records and owners from the first tier that answers.
    pub async fn stats(&self) -> Result<Stats> {
        match self.database_op(|db| async move { db.stats().await }).await {
            Ok(stats) => return Ok(stats),
            Err(StorageError::NoBackingStore) => {}
            Err(e) => warn!(error = %e, "database tier stats failed"),
        }

        match self.file.stats().await {
            Ok(stats) => return Ok(stats),
            Err(e) => warn!(error = %e, "file tier stats failed"),
        }

        self.memory.stats().await
    }

    async fn database_op<'a, T, Op, Fut>(&'a self, op: Op) -> Result<T>
    where
        Op: FnOnce(&'a D) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + 'a,
    {
        match self.database.as_deref() {
            Some(db) => op(db).await,
            None => Err(StorageError::NoBackingStore),
        }
    }
}
