use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Connection, PgPool, Postgres, QueryBuilder, Row};
use tinylink_core::error::{Result, StorageError};
use tinylink_core::{
    OwnerId, ReadRepository, Repository, SoftDeleteRepository, Stats, UrlHash, UrlRecord,
};
use tracing::{debug, info};

const SCHEMA: &str = include_str!("../ddl/postgres/urls.sql");

// Postgres caps a statement at 65535 bind parameters; each row binds four.
const BATCH_ROWS: usize = 1000;

/// Postgres implementation of the database tier.
///
/// Soft delete is implemented with `deleted_at` (unix seconds). Unlike the
/// memory and file tiers, reads return deleted rows with `deleted_at` set so
/// that callers can tell "deleted" from "never existed". Rows are unique per
/// `(hash, owner_id)`.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing Postgres connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a new connection pool and creates the schema if needed.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        let repository = Self::new(pool);
        repository.migrate().await?;
        Ok(repository)
    }

    /// Creates the `urls` table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        info!("database schema is up to date");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn now_unix_seconds() -> i64 {
    Timestamp::now().as_second()
}

fn parse_deleted_at(seconds: Option<i64>) -> Result<Option<Timestamp>> {
    seconds
        .map(|value| {
            Timestamp::from_second(value).map_err(|e| {
                StorageError::InvalidData(format!("invalid deleted_at timestamp '{}': {e}", value))
            })
        })
        .transpose()
}

fn row_to_record(row: &PgRow) -> Result<UrlRecord> {
    let hash: String = row.try_get("hash").map_err(map_sqlx_error)?;
    let owner_id: String = row.try_get("owner_id").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("url").map_err(map_sqlx_error)?;
    let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
    let deleted_at_raw: Option<i64> = row.try_get("deleted_at").map_err(map_sqlx_error)?;

    Ok(UrlRecord {
        owner_id: OwnerId::new(owner_id),
        hash: UrlHash::new_unchecked(hash),
        original_url,
        short_url,
        deleted_at: parse_deleted_at(deleted_at_raw)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn find_by_hash(&self, hash: &UrlHash) -> Result<Option<UrlRecord>> {
        let row = sqlx::query(
            r#"
            SELECT hash, owner_id, url, short_url, deleted_at
            FROM urls
            WHERE hash = $1
            ORDER BY (deleted_at IS NOT NULL), owner_id
            LIMIT 1
            "#,
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT hash, owner_id, url, short_url, deleted_at
            FROM urls
            WHERE owner_id = $1
            ORDER BY hash
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn exists(&self, hash: &UrlHash, owner: &OwnerId) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM urls
            WHERE hash = $1
              AND owner_id = $2
            LIMIT 1
            "#,
        )
        .bind(hash.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }

    async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT owner_id) AS users
            FROM urls
            WHERE deleted_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(Stats {
            urls: urls.max(0) as u64,
            users: users.max(0) as u64,
        })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// Checks for an existing row first and only then inserts.
    ///
    /// The check and the insert are separate statements; a concurrent insert
    /// of the same pair in between surfaces as a unique violation, which is
    /// reported as `Conflict` as well.
    async fn save(&self, record: &UrlRecord) -> Result<()> {
        if self.exists(&record.hash, &record.owner_id).await? {
            return Err(StorageError::Conflict(record.hash.to_string()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO urls (hash, owner_id, url, short_url, deleted_at)
            VALUES ($1, $2, $3, $4, NULL)
            "#,
        )
        .bind(record.hash.as_str())
        .bind(record.owner_id.as_str())
        .bind(&record.original_url)
        .bind(&record.short_url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(record.hash.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn save_batch(&self, records: &[UrlRecord]) -> Result<()> {
        for chunk in records.chunks(BATCH_ROWS) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO urls (hash, owner_id, url, short_url) ");

            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.hash.as_str())
                    .push_bind(record.owner_id.as_str())
                    .push_bind(&record.original_url)
                    .push_bind(&record.short_url);
            });
            builder.push(" ON CONFLICT (hash, owner_id) DO NOTHING");

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            debug!(
                requested = chunk.len(),
                inserted = result.rows_affected(),
                "inserted url batch"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl SoftDeleteRepository for PostgresRepository {
    async fn delete_by_hashes(&self, hashes: &[UrlHash]) -> Result<u64> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let hashes: Vec<String> = hashes.iter().map(ToString::to_string).collect();

        let result = sqlx::query(
            r#"
            UPDATE urls
            SET deleted_at = $1
            WHERE hash = ANY($2)
              AND deleted_at IS NULL
            "#,
        )
        .bind(now_unix_seconds())
        .bind(hashes)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conn.ping().await.map_err(map_sqlx_error)
    }
}
