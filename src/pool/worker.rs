//! The fixed-size worker pool.

use super::job::QueuedJob;
use crate::dispatch::CompletionDispatcher;
use crate::error::EngineError;
use crate::pool::JobStatus;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads (default: available parallelism).
    pub workers: usize,
    /// Bounded queue capacity; submissions beyond it get `Backpressure`.
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Sets the worker thread count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::Config("worker count must be non-zero".to_string()));
        }
        if self.capacity == 0 {
            return Err(EngineError::Config("queue capacity must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Queue state shared between submitters and workers.
#[derive(Default)]
struct PoolQueue {
    jobs: VecDeque<QueuedJob>,
    /// False once shutdown begins; submissions are then refused.
    accepting: bool,
    /// Jobs currently executing on a worker.
    in_flight: usize,
}

struct PoolShared {
    queue: Mutex<PoolQueue>,
    /// Workers wait here for jobs; shutdown waits here for drain.
    cond: Condvar,
    capacity: usize,
}

/// Fixed-size set of OS threads executing queued CPU-bound jobs in FIFO
/// order, decoupled from the host event loop.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    dispatcher: CompletionDispatcher,
}

impl WorkerPool {
    /// Starts the pool: spawns the worker threads and begins accepting
    /// submissions.
    pub fn new(config: PoolConfig, dispatcher: CompletionDispatcher) -> Result<Self, EngineError> {
        config.validate()?;

        let shared = Arc::new(PoolShared {
            queue: Mutex::new(PoolQueue {
                jobs: VecDeque::new(),
                accepting: true,
                in_flight: 0,
            }),
            cond: Condvar::new(),
            capacity: config.capacity,
        });

        info!(
            workers = config.workers,
            capacity = config.capacity,
            "Starting worker pool"
        );

        let mut workers = Vec::with_capacity(config.workers);
        for i in 0..config.workers {
            let shared = Arc::clone(&shared);
            let dispatcher = dispatcher.clone();
            let handle = thread::Builder::new()
                .name(format!("map-worker-{}", i))
                .spawn(move || Self::worker_loop(shared, dispatcher))
                .map_err(|e| EngineError::Config(format!("failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }

        Ok(Self {
            shared,
            workers,
            dispatcher,
        })
    }

    /// Enqueues a job. Returns immediately.
    ///
    /// Fails with `Backpressure` when the queue is full and `Shutdown` once
    /// draining has begun; the caller must retry or reject the originating
    /// request.
    pub(crate) fn submit(&self, job: QueuedJob) -> Result<(), EngineError> {
        let mut queue = self.shared.queue.lock().expect("pool queue poisoned");
        if !queue.accepting {
            return Err(EngineError::Shutdown);
        }
        if queue.jobs.len() >= self.shared.capacity {
            return Err(EngineError::Backpressure {
                capacity: self.shared.capacity,
            });
        }
        debug!(job_id = %job.meta.id, kind = %job.meta.kind, "Job queued");
        queue.jobs.push_back(job);
        self.shared.cond.notify_one();
        Ok(())
    }

    /// Number of jobs waiting in the queue (excludes running jobs).
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().expect("pool queue poisoned").jobs.len()
    }

    /// Number of jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.shared.queue.lock().expect("pool queue poisoned").in_flight
    }

    /// Worker thread body: pull jobs FIFO, run them, deliver results.
    fn worker_loop(shared: Arc<PoolShared>, dispatcher: CompletionDispatcher) {
        loop {
            let job = {
                let mut queue = shared.queue.lock().expect("pool queue poisoned");
                loop {
                    if let Some(job) = queue.jobs.pop_front() {
                        queue.in_flight += 1;
                        break job;
                    }
                    if !queue.accepting {
                        return;
                    }
                    queue = shared.cond.wait(queue).expect("pool queue poisoned");
                }
            };

            // A job cancelled while queued never executes.
            if job.meta.is_cancelled() {
                debug!(job_id = %job.meta.id, "Skipping cancelled job");
                dispatcher.deliver(&job.meta, Err(EngineError::Cancelled));
            } else {
                job.meta.set_status(JobStatus::Running);
                debug!(job_id = %job.meta.id, kind = %job.meta.kind, "Job started");
                let start = Instant::now();
                let result = (job.work)();
                debug!(
                    job_id = %job.meta.id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Job finished"
                );
                dispatcher.deliver(&job.meta, result);
            }

            let mut queue = shared.queue.lock().expect("pool queue poisoned");
            queue.in_flight -= 1;
            if queue.in_flight == 0 && queue.jobs.is_empty() {
                // Wake a shutdown waiter, if any.
                shared.cond.notify_all();
            }
        }
    }

    /// Shuts the pool down: stops accepting, drains the queue, waits for
    /// in-flight jobs, then joins the threads — bounded by `timeout`.
    ///
    /// If the timeout elapses first, jobs still queued are force-failed
    /// with `Shutdown` (delivered through the dispatcher) and threads still
    /// running are detached with a warning.
    pub fn shutdown(mut self, timeout: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now() + timeout;
        info!("Worker pool shutting down");

        {
            let mut queue = self.shared.queue.lock().expect("pool queue poisoned");
            queue.accepting = false;
            self.shared.cond.notify_all();

            // Bounded wait for drain.
            while !(queue.jobs.is_empty() && queue.in_flight == 0) {
                let now = Instant::now();
                if now >= deadline {
                    let remaining: Vec<QueuedJob> = queue.jobs.drain(..).collect();
                    drop(queue);
                    warn!(
                        force_failed = remaining.len(),
                        "Shutdown timeout, force-failing queued jobs"
                    );
                    for job in remaining {
                        self.dispatcher.deliver(&job.meta, Err(EngineError::Shutdown));
                    }
                    self.detach_unfinished();
                    return Err(EngineError::Shutdown);
                }
                let (q, _) = self
                    .shared
                    .cond
                    .wait_timeout(queue, deadline - now)
                    .expect("pool queue poisoned");
                queue = q;
            }
        }

        self.shared.cond.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked during shutdown");
            }
        }
        info!("Worker pool stopped");
        Ok(())
    }

    /// Joins finished workers and detaches the rest. A running job cannot
    /// be interrupted, so a stuck worker is left behind rather than
    /// blocking shutdown forever.
    fn detach_unfinished(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Detaching worker still running past shutdown timeout");
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("capacity", &self.shared.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferHandle;
    use crate::dispatch::DeliveryQueue;
    use crate::pool::job::{JobKind, JobMeta};
    use crate::pool::JobId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn make_job<F>(work: F) -> (QueuedJob, tokio::sync::watch::Receiver<JobStatus>)
    where
        F: FnOnce() -> Result<BufferHandle, EngineError> + Send + 'static,
    {
        let (meta, status_rx) = JobMeta::new(JobKind::Render, None);
        (
            QueuedJob {
                meta,
                work: Box::new(work),
            },
            status_rx,
        )
    }

    fn pool(workers: usize, capacity: usize) -> (WorkerPool, DeliveryQueue) {
        let (dispatcher, queue) = CompletionDispatcher::channel();
        let pool = WorkerPool::new(
            PoolConfig::default()
                .with_workers(workers)
                .with_capacity(capacity),
            dispatcher,
        )
        .unwrap();
        (pool, queue)
    }

    fn wait_for_completions(queue: &DeliveryQueue, n: usize) -> Vec<crate::dispatch::Completion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < n {
            assert!(Instant::now() < deadline, "timed out waiting for completions");
            out.extend(queue.drain());
            thread::sleep(Duration::from_millis(1));
        }
        out
    }

    #[test]
    fn test_zero_workers_rejected() {
        let (dispatcher, _queue) = CompletionDispatcher::channel();
        let err = WorkerPool::new(PoolConfig::default().with_workers(0), dispatcher).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_jobs_execute_and_deliver() {
        let (pool, queue) = pool(2, 8);
        for i in 0..4u8 {
            let (job, _rx) = make_job(move || Ok(BufferHandle::from_encoded(vec![i])));
            pool.submit(job).unwrap();
        }
        let completions = wait_for_completions(&queue, 4);
        assert!(completions.iter().all(|c| c.result.is_ok()));
        pool.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_backpressure_when_queue_full() {
        let (pool, queue) = pool(1, 2);

        // Occupy the single worker, then fill the queue.
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (blocker, _rx) = make_job(move || {
            let _ = gate_rx.recv();
            Ok(BufferHandle::from_encoded(vec![]))
        });
        pool.submit(blocker).unwrap();
        // Wait until the worker picked it up so it doesn't occupy a slot.
        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.in_flight() == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }

        for _ in 0..2 {
            let (job, _rx) = make_job(|| Ok(BufferHandle::from_encoded(vec![])));
            pool.submit(job).unwrap();
        }

        let (excess, _rx) = make_job(|| Ok(BufferHandle::from_encoded(vec![])));
        let err = pool.submit(excess).unwrap_err();
        assert_eq!(err, EngineError::Backpressure { capacity: 2 });

        gate_tx.send(()).unwrap();
        wait_for_completions(&queue, 3);
        pool.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_fifo_order_single_worker() {
        let (pool, queue) = pool(1, 16);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut ids: Vec<JobId> = Vec::new();

        // Park the worker so all jobs queue up first.
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (blocker, _rx) = make_job(move || {
            let _ = gate_rx.recv();
            Ok(BufferHandle::from_encoded(vec![]))
        });
        pool.submit(blocker).unwrap();

        for _ in 0..5 {
            let order = Arc::clone(&order);
            let (job, _rx) = make_job(move || {
                Ok(BufferHandle::from_encoded(vec![]))
            });
            let id = job.meta.id;
            let order_job = QueuedJob {
                meta: job.meta,
                work: Box::new(move || {
                    order.lock().unwrap().push(id);
                    Ok(BufferHandle::from_encoded(vec![]))
                }),
            };
            ids.push(id);
            pool.submit(order_job).unwrap();
        }

        gate_tx.send(()).unwrap();
        wait_for_completions(&queue, 6);
        assert_eq!(*order.lock().unwrap(), ids);
        pool.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_cancelled_queued_job_never_executes() {
        let (pool, queue) = pool(1, 8);
        let executed = Arc::new(AtomicUsize::new(0));

        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (blocker, _rx) = make_job(move || {
            let _ = gate_rx.recv();
            Ok(BufferHandle::from_encoded(vec![]))
        });
        pool.submit(blocker).unwrap();

        let executed2 = Arc::clone(&executed);
        let (job, status_rx) = make_job(move || {
            executed2.fetch_add(1, Ordering::SeqCst);
            Ok(BufferHandle::from_encoded(vec![]))
        });
        let cancelled_flag = Arc::clone(&job.meta.cancelled);
        pool.submit(job).unwrap();

        // Cancel while still queued.
        cancelled_flag.store(true, Ordering::SeqCst);
        gate_tx.send(()).unwrap();

        let completions = wait_for_completions(&queue, 2);
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        let cancelled: Vec<_> = completions
            .iter()
            .filter(|c| matches!(c.result, Err(EngineError::Cancelled)))
            .collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(*status_rx.borrow(), JobStatus::Cancelled);
        pool.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_shutdown_force_fails_queued_jobs() {
        let (pool, queue) = pool(1, 8);

        // Worker stuck until we say otherwise.
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (blocker, _rx) = make_job(move || {
            let _ = gate_rx.recv();
            Ok(BufferHandle::from_encoded(vec![]))
        });
        pool.submit(blocker).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.in_flight() == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }

        for _ in 0..3 {
            let (job, _rx) = make_job(|| Ok(BufferHandle::from_encoded(vec![])));
            pool.submit(job).unwrap();
        }

        let err = pool.shutdown(Duration::from_millis(50)).unwrap_err();
        assert_eq!(err, EngineError::Shutdown);

        // The 3 queued jobs were force-failed with Shutdown.
        let completions = wait_for_completions(&queue, 3);
        assert!(completions
            .iter()
            .all(|c| matches!(c.result, Err(EngineError::Shutdown))));

        // Unstick the detached worker so the test process exits cleanly.
        gate_tx.send(()).unwrap();
    }
}
