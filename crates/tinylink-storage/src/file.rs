use async_trait::async_trait;
use std::collections::HashSet;
use std::io::{ErrorKind, SeekFrom};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tinylink_core::error::{Result, StorageError};
use tinylink_core::{OwnerId, ReadRepository, Repository, Stats, UrlHash, UrlRecord};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Append-only storage tier: newline-delimited JSON records in one file.
///
/// Saves append a single line and never rewrite existing bytes. Lookups seek
/// to the start and decode line by line until they find a match or reach the
/// end of the file. The file handle and its cursor are shared, so every
/// operation holds the mutex for its whole duration.
///
/// A line that fails to decode ends the scan. Whatever was found before it is
/// returned, so a truncated trailing record reads as a miss rather than an
/// error.
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    // `None` after `clear` removed the file; reopened on next use.
    file: Mutex<Option<File>>,
}

impl FileRepository {
    /// Opens (creating if needed) the record log at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_log(&path).await?;
        debug!(path = %path.display(), "opened file storage");

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Returns the path of the record log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn handle<'a>(&self, slot: &'a mut Option<File>) -> Result<&'a mut File> {
        let file = match slot.take() {
            Some(file) => file,
            None => open_log(&self.path).await?,
        };
        Ok(slot.insert(file))
    }

    /// Feeds every decodable record to `visit` from the start of the file
    /// until `visit` breaks, the file ends, or a record fails to decode.
    async fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(UrlRecord) -> ControlFlow<()> + Send,
    {
        let mut guard = self.file.lock().await;
        let file = self.handle(&mut guard).await?;
        file.seek(SeekFrom::Start(0)).await?;

        // Raw bytes: a record cut inside a multi-byte character must read as
        // torn, not as an I/O error.
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_slice::<UrlRecord>(line) {
                Ok(record) => {
                    if visit(record).is_break() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "stopping scan at undecodable record");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .await?;
    Ok(file)
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn find_by_hash(&self, hash: &UrlHash) -> Result<Option<UrlRecord>> {
        let mut found = None;
        self.scan(|record| {
            if &record.hash == hash {
                found = Some(record);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

        trace!(hash = %hash, hit = found.is_some(), "file lookup by hash");
        Ok(found)
    }

    async fn find_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        self.scan(|record| {
            if &record.owner_id == owner && seen.insert(record.hash.clone()) {
                records.push(record);
            }
            ControlFlow::Continue(())
        })
        .await?;

        trace!(owner = %owner, count = records.len(), "file lookup by owner");
        Ok(records)
    }

    async fn exists(&self, hash: &UrlHash, owner: &OwnerId) -> Result<bool> {
        let mut exists = false;
        self.scan(|record| {
            if &record.hash == hash && &record.owner_id == owner {
                exists = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
        Ok(exists)
    }

    async fn stats(&self) -> Result<Stats> {
        let mut pairs = HashSet::new();
        let mut owners = HashSet::new();
        self.scan(|record| {
            if !record.is_deleted() {
                owners.insert(record.owner_id.clone());
                pairs.insert((record.hash, record.owner_id));
            }
            ControlFlow::Continue(())
        })
        .await?;

        Ok(Stats {
            urls: pairs.len() as u64,
            users: owners.len() as u64,
        })
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save(&self, record: &UrlRecord) -> Result<()> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| StorageError::InvalidData(e.to_string()))?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        let file = self.handle(&mut guard).await?;
        file.write_all(&line).await?;
        file.flush().await?;

        trace!(hash = %record.hash, owner = %record.owner_id, "appended record to file");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut guard = self.file.lock().await;
        *guard = None;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed file storage");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
