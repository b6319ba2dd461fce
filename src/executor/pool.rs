//! Bounded worker pool for parallel container fetches.
//!
//! Jobs go through a bounded crossbeam channel. A full queue makes the
//! submitting call wait for a free slot; pools started with
//! `reject_when_full` report `ExecutionError::QueueFull` instead.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::container::{Container, KeySet, SourceMap};
use crate::error::{ExecutionError, FetchError, JoineryError, JoineryResult};

/// One container call.
pub(crate) struct FetchBatch {
    pub(crate) namespace: String,
    pub(crate) container: Arc<dyn Container>,
    pub(crate) keys: KeySet,
}

impl FetchBatch {
    pub(crate) fn run(&self) -> Result<SourceMap, FetchError> {
        self.container.get(&self.keys)
    }
}

type Reply = (usize, Result<SourceMap, FetchError>);

struct Job {
    index: usize,
    batch: Arc<FetchBatch>,
    reply: Sender<Reply>,
}

pub(crate) struct FetchPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
    reject_when_full: bool,
}

impl FetchPool {
    pub(crate) fn start(workers: usize, queue_capacity: usize, reject_when_full: bool) -> JoineryResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("joinery-fetch-{idx}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        let result = catch_unwind(AssertUnwindSafe(|| job.batch.run()))
                            .unwrap_or_else(|_| Err(FetchError::new("container panicked during fetch")));
                        // The caller may have returned early on another failure.
                        let _ = job.reply.send((job.index, result));
                    }
                })
                .map_err(|e| JoineryError::internal(format!("failed to spawn fetch worker: {e}")))?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            workers: handles,
            queue_capacity,
            reject_when_full,
        })
    }

    fn submit(&self, job: Job) -> Result<(), ExecutionError> {
        let Some(tx) = &self.tx else {
            return Err(ExecutionError::Disconnected);
        };
        if !self.reject_when_full {
            // Workers never block on replies, so waiting here always ends.
            return tx.send(job).map_err(|_| ExecutionError::Disconnected);
        }
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected),
        }
    }

    /// Runs every batch on the pool and returns the results in batch order.
    ///
    /// Returns on the first failure; replies still in flight are discarded.
    pub(crate) fn fetch_all(&self, batches: Vec<FetchBatch>) -> JoineryResult<Vec<SourceMap>> {
        let count = batches.len();
        let batches: Vec<Arc<FetchBatch>> = batches.into_iter().map(Arc::new).collect();
        let (reply_tx, reply_rx) = bounded::<Reply>(count);

        for (index, batch) in batches.iter().enumerate() {
            self.submit(Job {
                index,
                batch: Arc::clone(batch),
                reply: reply_tx.clone(),
            })?;
        }
        drop(reply_tx);

        let mut results: Vec<Option<SourceMap>> = vec![None; count];
        for _ in 0..count {
            let (index, result) = reply_rx
                .recv()
                .map_err(|_| JoineryError::Execution(ExecutionError::Disconnected))?;
            match result {
                Ok(found) => results[index] = Some(found),
                Err(source) => {
                    return Err(ExecutionError::Fetch {
                        namespace: batches[index].namespace.clone(),
                        source,
                    }
                    .into())
                }
            }
        }

        results
            .into_iter()
            .map(|found| found.ok_or_else(|| JoineryError::internal("fetch reply missing")))
            .collect()
    }

    #[must_use]
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for FetchPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain queued jobs and exit.
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::container::{FnContainer, MapContainer};
    use crate::value::{Key, Value};

    fn batch(container: impl Container + 'static, keys: &[i64]) -> FetchBatch {
        let container: Arc<dyn Container> = Arc::new(container);
        FetchBatch {
            namespace: container.namespace().to_string(),
            container,
            keys: keys.iter().copied().map(Key::Int).collect(),
        }
    }

    #[test]
    fn results_come_back_in_batch_order() {
        let pool = FetchPool::start(3, 8, false).unwrap();
        let results = pool
            .fetch_all(vec![
                batch(MapContainer::new("a", [(1, "a1")]), &[1]),
                batch(MapContainer::new("b", [(1, "b1")]), &[1]),
                batch(MapContainer::new("c", [(2, "c2")]), &[2]),
            ])
            .unwrap();
        assert_eq!(results[0].get(&Key::Int(1)), Some(&Value::from("a1")));
        assert_eq!(results[1].get(&Key::Int(1)), Some(&Value::from("b1")));
        assert_eq!(results[2].get(&Key::Int(2)), Some(&Value::from("c2")));
    }

    #[test]
    fn first_failure_is_returned() {
        let pool = FetchPool::start(2, 8, false).unwrap();
        let slow = FnContainer::new("slow", |_: &KeySet| {
            thread::sleep(Duration::from_millis(50));
            Ok(SourceMap::new())
        });
        let broken = FnContainer::new("broken", |_: &KeySet| Err(FetchError::new("offline")));

        let err = pool
            .fetch_all(vec![batch(slow, &[1]), batch(broken, &[1])])
            .unwrap_err();
        assert!(matches!(
            err,
            JoineryError::Execution(ExecutionError::Fetch { ref namespace, .. }) if namespace == "broken"
        ));
    }

    #[test]
    fn panicking_container_becomes_fetch_error() {
        let pool = FetchPool::start(1, 4, false).unwrap();
        let panicky = FnContainer::new("panicky", |_: &KeySet| -> Result<SourceMap, FetchError> {
            panic!("boom")
        });
        let err = pool.fetch_all(vec![batch(panicky, &[1])]).unwrap_err();
        assert!(err.is_execution());

        // The worker survives the panic.
        let ok = pool.fetch_all(vec![batch(MapContainer::new("a", [(1, 1)]), &[1])]);
        assert!(ok.is_ok());
    }

    fn blocking_batches(count: usize, started: &Arc<AtomicUsize>) -> Vec<FetchBatch> {
        let counter = Arc::clone(started);
        let blocking: Arc<dyn Container> = Arc::new(FnContainer::new("blocking", move |_: &KeySet| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(SourceMap::new())
        }));
        (0..count)
            .map(|_| FetchBatch {
                namespace: "blocking".to_string(),
                container: Arc::clone(&blocking),
                keys: KeySet::new(),
            })
            .collect()
    }

    #[test]
    fn more_batches_than_queue_slots_wait_for_room() {
        let pool = FetchPool::start(1, 1, false).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let results = pool.fetch_all(blocking_batches(6, &started)).unwrap();
        assert_eq!(results.len(), 6);
        assert_eq!(started.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn full_queue_is_reported_when_rejecting() {
        let pool = FetchPool::start(1, 1, true).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let err = pool.fetch_all(blocking_batches(4, &started)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn worker_count_is_at_least_one() {
        let pool = FetchPool::start(0, 0, false).unwrap();
        assert_eq!(pool.worker_count(), 1);
    }
}
