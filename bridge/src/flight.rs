//! Single-flight reconciliation guard.
//!
//! Each tracking key owns a lane: a FIFO queue drained by one worker task.
//! Work submitted for a key runs strictly one at a time and in submission
//! order, and a queued job only starts once the previous one has finished,
//! so it observes the state that job left behind. Lanes of different keys
//! run independently.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use photokit_engine::TrackingKey;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

type Job = BoxFuture<'static, ()>;

/// Per-key serializer for reconciliation work.
#[derive(Debug)]
pub struct SingleFlight {
    lanes: DashMap<TrackingKey, mpsc::UnboundedSender<Job>>,
    runtime: Handle,
}

impl SingleFlight {
    /// Create a guard whose lane workers run on the current tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            lanes: DashMap::new(),
            runtime,
        }
    }

    /// Queue `task` on the lane of `key`.
    ///
    /// The task is enqueued before this returns, so the order of `submit`
    /// calls is the order of execution. The returned future resolves with the
    /// task's output; dropping it does not cancel the task.
    pub fn submit<F, O>(&self, key: &TrackingKey, task: F) -> impl Future<Output = Result<O>>
    where
        F: Future<Output = O> + Send + 'static,
        O: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = async move {
            let _ = tx.send(task.await);
        }
        .boxed();

        let sender = self
            .lanes
            .entry(key.clone())
            .or_insert_with(|| self.open_lane(key))
            .clone();
        if sender.send(job).is_err() {
            tracing::warn!(tracking_key = %key, "Reconciliation lane closed, dropping job");
        }

        async move { rx.await.map_err(|_| Error::Cancelled) }
    }

    fn open_lane(&self, key: &TrackingKey) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let key = key.clone();

        tracing::debug!(tracking_key = %key, "Opening reconciliation lane");

        self.runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    tracing::error!(tracking_key = %key, "Reconciliation job panicked");
                }
            }
            tracing::debug!(tracking_key = %key, "Reconciliation lane closed");
        });

        tx
    }

    /// Close the lane of `key`. Jobs already queued still run and the
    /// worker exits once they are done; a later submit opens a fresh lane.
    /// Collections never submit for a key they released.
    pub fn release(&self, key: &TrackingKey) {
        self.lanes.remove(key);
    }

    /// Get the number of open lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_same_key_runs_in_order() {
        let flight = SingleFlight::new().unwrap();
        let key = TrackingKey::new("k");
        let log = Arc::new(Mutex::new(Vec::new()));

        let pending: Vec<_> = (0..5u64)
            .map(|i| {
                let log = Arc::clone(&log);
                flight.submit(&key, async move {
                    // Later jobs sleep less; order must still hold.
                    tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                    log.lock().push(i);
                    i
                })
            })
            .collect();

        let results = futures::future::join_all(pending).await;
        let results: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_different_keys_run_in_parallel() {
        let flight = SingleFlight::new().unwrap();
        let gate = Arc::new(Notify::new());

        let blocked_gate = Arc::clone(&gate);
        let blocked = flight.submit(&TrackingKey::new("a"), async move {
            blocked_gate.notified().await;
            "a"
        });
        let free = flight.submit(&TrackingKey::new("b"), async { "b" });

        // Key "b" completes while key "a" is still waiting.
        assert_eq!(free.await.unwrap(), "b");
        gate.notify_one();
        assert_eq!(blocked.await.unwrap(), "a");
        assert_eq!(flight.lane_count(), 2);
    }

    #[tokio::test]
    async fn test_panicking_job_releases_lane() {
        let flight = SingleFlight::new().unwrap();
        let key = TrackingKey::new("k");

        let failed = flight.submit(&key, async {
            panic!("reconciliation bug");
        });
        let next = flight.submit(&key, async { 42 });

        assert!(matches!(failed.await, Err(Error::Cancelled)));
        assert_eq!(next.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_release_drains_queued_jobs() {
        let flight = SingleFlight::new().unwrap();
        let key = TrackingKey::new("k");

        let queued = flight.submit(&key, async { 1 });
        flight.release(&key);
        assert_eq!(flight.lane_count(), 0);
        assert_eq!(queued.await.unwrap(), 1);

        assert_eq!(flight.submit(&key, async { 2 }).await.unwrap(), 2);
        assert_eq!(flight.lane_count(), 1);
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(SingleFlight::new(), Err(Error::NoRuntime)));
    }
}
