//! Completion dispatching from worker threads to the host event loop.
//!
//! Workers never touch the host directly: a finished job's result is pushed
//! through [`CompletionDispatcher::deliver`] onto a delivery queue read
//! exclusively by the host. Per-job delivery is exactly-once and
//! happens-after that job's completion; global ordering across jobs is not
//! guaranteed (jobs may finish out of submission order).
//!
//! The host drains the queue on each loop iteration with
//! [`DeliveryQueue::drain`] (or polls [`DeliveryQueue::try_next`]); async
//! hosts can await [`DeliveryQueue::wait`], backed by a `tokio::sync::Notify`
//! that workers ping after every send.

use crate::buffer::BufferHandle;
use crate::error::EngineError;
use crate::pool::{JobId, JobKind, JobStatus};
use crate::pool::JobMeta;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// A finished job's result, ready for the host to consume.
#[derive(Debug)]
pub struct Completion {
    /// The originating job.
    pub job_id: JobId,
    /// What the job was doing.
    pub kind: JobKind,
    /// The result slot: an owned buffer or the error descriptor.
    pub result: Result<BufferHandle, EngineError>,
}

/// Worker-side endpoint. Cloned into each worker thread; safe to call from
/// any worker at any time.
#[derive(Clone)]
pub struct CompletionDispatcher {
    tx: Sender<Completion>,
    notify: Arc<Notify>,
}

impl CompletionDispatcher {
    /// Creates a dispatcher and its host-side delivery queue.
    pub fn channel() -> (Self, DeliveryQueue) {
        let (tx, rx) = mpsc::channel();
        let notify = Arc::new(Notify::new());
        (
            Self {
                tx,
                notify: Arc::clone(&notify),
            },
            DeliveryQueue { rx, notify },
        )
    }

    /// Marshals a job's result toward the host. Called exactly once per job,
    /// from whichever worker (or the shutdown path) finished it.
    ///
    /// Publishes the terminal status, then either enqueues the completion or
    /// drops it silently when the caller abandoned the job or its deadline
    /// has passed.
    pub(crate) fn deliver(&self, meta: &JobMeta, result: Result<BufferHandle, EngineError>) {
        let status = match &result {
            Ok(_) => JobStatus::Completed,
            Err(EngineError::Cancelled) => JobStatus::Cancelled,
            Err(_) => JobStatus::Failed,
        };
        meta.set_status(status);

        if meta.abandoned.load(Ordering::SeqCst) {
            debug!(job_id = %meta.id, "Dropping completion for abandoned job");
            return;
        }
        if let Some(deadline) = meta.deadline {
            if Instant::now() > deadline {
                debug!(job_id = %meta.id, "Dropping completion past caller deadline");
                return;
            }
        }

        let result = result.and_then(|mut buffer| {
            buffer.finish()?;
            Ok(buffer)
        });

        let completion = Completion {
            job_id: meta.id,
            kind: meta.kind,
            result,
        };
        if self.tx.send(completion).is_err() {
            // Host dropped its queue; results have nowhere to go.
            warn!(job_id = %meta.id, "Delivery queue closed, discarding result");
            return;
        }
        self.notify.notify_one();
    }
}

impl std::fmt::Debug for CompletionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionDispatcher").finish_non_exhaustive()
    }
}

/// Host-side endpoint, read exclusively by the event loop thread.
#[derive(Debug)]
pub struct DeliveryQueue {
    rx: Receiver<Completion>,
    notify: Arc<Notify>,
}

impl DeliveryQueue {
    /// Drains every completion currently queued, transferring buffer
    /// ownership to the host. Never blocks.
    pub fn drain(&self) -> Vec<Completion> {
        let mut out = Vec::new();
        while let Some(completion) = self.try_next() {
            out.push(completion);
        }
        out
    }

    /// Takes the next completion if one is ready. Never blocks.
    pub fn try_next(&self) -> Option<Completion> {
        let mut completion = self.rx.try_recv().ok()?;
        if let Ok(buffer) = completion.result.as_mut() {
            // InTransit → OwnedByHost. A freshly-sent buffer is always in
            // transit, so this cannot fail.
            if let Err(err) = buffer.receive() {
                completion.result = Err(err);
            }
        }
        Some(completion)
    }

    /// Awaits a wake-up from a worker. Intended for async hosts that sleep
    /// between loop iterations; spurious wake-ups are possible, so callers
    /// should still treat [`drain`](Self::drain) as possibly empty.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}
