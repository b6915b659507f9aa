//! Fixed-size worker pool with a single shared FIFO task queue.
//!
//! The distance passes fan work out per function entry; each submission
//! returns a [`TaskHandle`] the caller blocks on once all work is queued.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fallback worker count when hardware concurrency cannot be detected.
const FALLBACK_WORKERS: usize = 4;

struct PoolState {
    queue: Mutex<QueueState>,
    ready: Condvar,
}

struct QueueState {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

/// Completion handle for a submitted task.
///
/// `wait` blocks until the worker has run the task and returns its result.
pub struct TaskHandle<T> {
    slot: Arc<(Mutex<Option<T>>, Condvar)>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has completed and take its result.
    pub fn wait(self) -> T {
        let (lock, done) = &*self.slot;
        let mut slot = lock.lock();
        while slot.is_none() {
            done.wait(&mut slot);
        }
        slot.take().expect("task result already taken")
    }
}

/// Fixed-size thread pool with one shared FIFO queue.
///
/// Workers sleep on a condition variable while the queue is empty; each
/// submission wakes one worker. Dropping the pool (or calling
/// [`WorkerPool::shutdown`]) lets workers drain the queue, then joins them.
pub struct WorkerPool {
    state: Arc<PoolState>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool sized to the hardware concurrency.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_WORKERS);
        Self::with_threads(threads)
    }

    /// Create a pool with exactly `threads` workers.
    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        let state = Arc::new(PoolState {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            ready: Condvar::new(),
        });

        let workers = (0..threads)
            .map(|id| {
                let state = Arc::clone(&state);
                std::thread::Builder::new()
                    .name(format!("dta-worker-{id}"))
                    .spawn(move || worker_loop(&state))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        debug!(threads, "worker pool started");
        Self { state, workers }
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task and wake one worker.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let slot = Arc::new((Mutex::new(None), Condvar::new()));
        let handle = TaskHandle {
            slot: Arc::clone(&slot),
        };
        let job: Job = Box::new(move || {
            let result = task();
            let (lock, done) = &*slot;
            *lock.lock() = Some(result);
            done.notify_all();
        });

        {
            let mut queue = self.state.queue.lock();
            queue.jobs.push_back(job);
        }
        self.state.ready.notify_one();
        handle
    }

    /// Set the shutdown flag, wake everyone, and join the workers.
    ///
    /// Queued tasks are still drained before the workers exit.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        {
            let mut queue = self.state.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
        }
        self.state.ready.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn worker_loop(state: &PoolState) {
    loop {
        let job = {
            let mut queue = state.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.shutdown {
                    return;
                }
                state.ready.wait(&mut queue);
            }
        };
        job();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_submit_and_wait() {
        let pool = WorkerPool::with_threads(2);
        let handle = pool.submit(|| 21 * 2);
        assert_eq!(handle.wait(), 42);
        pool.shutdown();
    }

    #[test]
    fn test_all_tasks_run() {
        let pool = WorkerPool::with_threads(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.wait();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn test_queued_tasks_drain_on_shutdown() {
        let pool = WorkerPool::with_threads(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_fifo_order_single_worker() {
        let pool = WorkerPool::with_threads(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let order = Arc::clone(&order);
                pool.submit(move || order.lock().push(i))
            })
            .collect();
        for handle in handles {
            handle.wait();
        }
        assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
    }
}
