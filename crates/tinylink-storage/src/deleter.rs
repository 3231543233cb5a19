use std::sync::Arc;
use tinylink_core::error::{Result, StorageError};
use tinylink_core::{SoftDeleteRepository, UrlHash};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, trace};

/// Default number of delete batches allowed to run at once.
pub const DEFAULT_DELETE_WORKERS: usize = 4;

/// Background soft-delete worker pool.
///
/// Batches are accepted through an unbounded queue and acknowledged
/// immediately. A single dispatcher task drains the queue and runs each batch
/// as its own task, holding a semaphore permit so that at most
/// `max_in_flight` batches hit the database at the same time.
///
/// Failures are logged; nothing is reported back to the submitter. Dropping
/// the queue closes the channel and the dispatcher exits once every pending
/// batch has been handed to a worker.
#[derive(Debug, Clone)]
pub struct DeleteQueue {
    sender: mpsc::UnboundedSender<Vec<UrlHash>>,
}

impl DeleteQueue {
    /// Spawns the dispatcher on the current Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `repository` - The tier that performs the soft delete
    /// * `max_in_flight` - Upper bound on concurrent delete batches (at least 1)
    pub fn spawn<D>(repository: Arc<D>, max_in_flight: usize) -> Self
    where
        D: SoftDeleteRepository,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));

        tokio::spawn(dispatch(repository, receiver, permits));

        Self { sender }
    }

    /// Enqueues a batch of hashes for soft deletion.
    ///
    /// Returns as soon as the batch is queued. Fails only when the dispatcher
    /// is gone.
    pub fn submit(&self, hashes: Vec<UrlHash>) -> Result<()> {
        if hashes.is_empty() {
            return Ok(());
        }

        trace!(count = hashes.len(), "queueing delete batch");
        self.sender
            .send(hashes)
            .map_err(|_| StorageError::Unavailable("delete queue is closed".to_string()))
    }
}

async fn dispatch<D>(
    repository: Arc<D>,
    mut receiver: mpsc::UnboundedReceiver<Vec<UrlHash>>,
    permits: Arc<Semaphore>,
) where
    D: SoftDeleteRepository,
{
    while let Some(hashes) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let repository = Arc::clone(&repository);

        tokio::spawn(async move {
            let _permit = permit;
            match repository.delete_by_hashes(&hashes).await {
                Ok(affected) => {
                    debug!(requested = hashes.len(), affected, "soft-deleted urls");
                }
                Err(e) => {
                    error!(requested = hashes.len(), error = %e, "failed to soft-delete urls");
                }
            }
        });
    }

    debug!("delete queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tinylink_core::{OwnerId, ReadRepository, Repository, Stats, UrlRecord};

    /// Records every delete call and tracks peak concurrency.
    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<UrlHash>>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReadRepository for Recorder {
        async fn find_by_hash(&self, _hash: &UrlHash) -> Result<Option<UrlRecord>> {
            Ok(None)
        }

        async fn find_by_owner(&self, _owner: &OwnerId) -> Result<Vec<UrlRecord>> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> Result<Stats> {
            Ok(Stats::default())
        }
    }

    #[async_trait]
    impl Repository for Recorder {
        async fn save(&self, _record: &UrlRecord) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SoftDeleteRepository for Recorder {
        async fn delete_by_hashes(&self, hashes: &[UrlHash]) -> Result<u64> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            self.batches.lock().unwrap().push(hashes.to_vec());
            if self.fail {
                return Err(StorageError::Unavailable("down".to_string()));
            }
            Ok(hashes.len() as u64)
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn hashes(names: &[&str]) -> Vec<UrlHash> {
        names.iter().map(|n| UrlHash::new_unchecked(*n)).collect()
    }

    async fn wait_for_batches(recorder: &Recorder, expected: usize) {
        for _ in 0..200 {
            if recorder.batches.lock().unwrap().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("delete batches did not complete in time");
    }

    #[tokio::test]
    async fn submitted_batches_reach_repository() {
        let recorder = Arc::new(Recorder::default());
        let queue = DeleteQueue::spawn(Arc::clone(&recorder), 2);

        queue.submit(hashes(&["a", "b"])).unwrap();
        queue.submit(hashes(&["c"])).unwrap();

        wait_for_batches(&recorder, 2).await;

        let mut seen: Vec<_> = recorder
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|h| h.to_string())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_batch_is_not_queued() {
        let recorder = Arc::new(Recorder::default());
        let queue = DeleteQueue::spawn(Arc::clone(&recorder), 1);

        queue.submit(Vec::new()).unwrap();
        queue.submit(hashes(&["a"])).unwrap();

        wait_for_batches(&recorder, 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(recorder.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let recorder = Arc::new(Recorder::default());
        let queue = DeleteQueue::spawn(Arc::clone(&recorder), 2);

        for i in 0..8 {
            queue.submit(hashes(&[format!("h{i}").as_str()])).unwrap();
        }

        wait_for_batches(&recorder, 8).await;
        assert!(recorder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_queue() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let queue = DeleteQueue::spawn(Arc::clone(&recorder), 1);

        queue.submit(hashes(&["a"])).unwrap();
        queue.submit(hashes(&["b"])).unwrap();

        wait_for_batches(&recorder, 2).await;
    }
}
