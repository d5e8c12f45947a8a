//! Bounded worker pool for independent solver jobs.
//!
//! Architecture:
//! 1. One job per time point, identified by its index in the input order
//! 2. A fixed number of worker threads pull indices from an atomic dispenser
//! 3. Each result lands in the slot of its own index, so the returned order
//!    is the input order, not the completion order
//! 4. Full barrier: the pool returns only after every job has finished
//! 5. A failed job never cancels siblings; failures stay in their slots

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use crate::error::{Error, Result};

/// Bounded-concurrency scheduler with a monotonic completion counter.
pub struct WorkerPool {
    workers: usize,
    completed: AtomicUsize,
}

impl WorkerPool {
    /// Create a pool with at least one worker.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            completed: AtomicUsize::new(0),
        }
    }

    /// Jobs completed so far (success or failure). Observability only;
    /// scheduling never depends on it.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Run `n_jobs` jobs, at most `workers` concurrently, and return their
    /// results in input order.
    ///
    /// `job` is called with the job index. Blocks until every job has
    /// finished, even when some fail.
    pub fn run<T, F>(&self, n_jobs: usize, job: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<T>>>> =
            (0..n_jobs).map(|_| Mutex::new(None)).collect();

        thread::scope(|s| {
            for _ in 0..self.workers.min(n_jobs) {
                s.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    if i >= n_jobs {
                        break;
                    }
                    let result = job(i);
                    let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
                    log::debug!("job {} done ({} completed)", i, done);
                    *slots[i].lock().unwrap() = Some(result);
                });
            }
        });

        slots
            .into_iter()
            .map(|m| {
                m.into_inner()
                    .unwrap()
                    .expect("barrier guarantees every slot is filled")
            })
            .collect()
    }
}

/// Collapse ordered job results into either every value or the first
/// failure, attributed to its job index. Called only after the barrier, so
/// every sibling of a failed job has already run to completion.
pub fn into_ordered<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    results
        .into_iter()
        .enumerate()
        .map(|(index, r)| {
            r.map_err(|e| Error::Job {
                index,
                source: Box::new(e),
            })
        })
        .collect()
}
