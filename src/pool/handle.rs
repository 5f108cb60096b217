//! Job handle for status queries, cancellation, and abandonment.
//!
//! A [`JobHandle`] is returned when a job is submitted to the engine. It is
//! the caller's view of the job: status queries are non-blocking, the async
//! [`wait_terminal`](JobHandle::wait_terminal) method awaits the status
//! watch channel, and `cancel`/`abandon` are fire-and-forget flags. The
//! job's *result* is never read through the handle — it arrives on the
//! delivery queue drained by the host event loop.

use super::job::{JobId, JobKind, JobStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle to a submitted job.
///
/// Cloneable; all clones refer to the same underlying job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    kind: JobKind,
    status_rx: watch::Receiver<JobStatus>,
    cancelled: Arc<AtomicBool>,
    abandoned: Arc<AtomicBool>,
}

impl JobHandle {
    pub(crate) fn new(
        id: JobId,
        kind: JobKind,
        status_rx: watch::Receiver<JobStatus>,
        cancelled: Arc<AtomicBool>,
        abandoned: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            kind,
            status_rx,
            cancelled,
            abandoned,
        }
    }

    /// The job's unique identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The kind of work the job performs.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Most recent status, without waiting.
    pub fn status(&self) -> JobStatus {
        *self.status_rx.borrow()
    }

    /// Requests cancellation.
    ///
    /// A job still queued is guaranteed never to execute; it is delivered
    /// exactly once as `Cancelled`. A running job cannot be interrupted: it
    /// runs to completion and the flag has no effect on it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Detaches the caller from the result. The job still runs (or is
    /// cancelled independently), but its completion is dropped silently by
    /// the dispatcher instead of being delivered.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    /// Waits until the job reaches a terminal state and returns it.
    pub async fn wait_terminal(&mut self) -> JobStatus {
        loop {
            let status = *self.status_rx.borrow();
            if status.is_terminal() {
                return status;
            }
            if self.status_rx.changed().await.is_err() {
                // Sender dropped: the last published status is final.
                return *self.status_rx.borrow();
            }
        }
    }
}
