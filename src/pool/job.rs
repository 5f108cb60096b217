//! Job identity, status, and the queued-job representation.

use crate::buffer::BufferHandle;
use crate::error::EngineError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a submitted job.
#[derive(Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Creates a unique auto-generated job ID from a monotonically
    /// increasing counter.
    pub fn next() -> Self {
        Self(JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// The kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Raster render producing a pixel buffer.
    Render,
    /// Vector tile encode producing an encoded tile buffer.
    EncodeTile,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render => write!(f, "render"),
            Self::EncodeTile => write!(f, "encode-tile"),
        }
    }
}

/// Job execution status, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    /// Accepted and waiting in the pool queue.
    #[default]
    Queued,
    /// Executing on a worker thread.
    Running,
    /// Finished successfully; result delivered (or dropped if abandoned).
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before execution.
    Cancelled,
}

impl JobStatus {
    /// Returns true for states a job never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Shared job bookkeeping, visible to the handle, the worker, and the
/// completion dispatcher.
#[derive(Debug, Clone)]
pub(crate) struct JobMeta {
    pub id: JobId,
    pub kind: JobKind,
    pub status_tx: watch::Sender<JobStatus>,
    /// Set by the handle; checked by the worker before execution.
    pub cancelled: Arc<AtomicBool>,
    /// Set by the handle; completions of abandoned jobs are dropped.
    pub abandoned: Arc<AtomicBool>,
    /// Caller-side deadline. Completions past it are dropped silently.
    pub deadline: Option<Instant>,
}

impl JobMeta {
    pub fn new(kind: JobKind, deadline: Option<Instant>) -> (Self, watch::Receiver<JobStatus>) {
        let (status_tx, status_rx) = watch::channel(JobStatus::Queued);
        (
            Self {
                id: JobId::next(),
                kind,
                status_tx,
                cancelled: Arc::new(AtomicBool::new(false)),
                abandoned: Arc::new(AtomicBool::new(false)),
                deadline,
            },
            status_rx,
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: JobStatus) {
        // Send failure only means the handle was dropped; that's fine.
        let _ = self.status_tx.send(status);
    }
}

/// A unit of work captured at submit time: metadata plus the closure that
/// runs the actual render or encode against a context snapshot.
pub(crate) struct QueuedJob {
    pub meta: JobMeta,
    pub work: Box<dyn FnOnce() -> Result<BufferHandle, EngineError> + Send>,
}

impl fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.meta.id)
            .field("kind", &self.meta.kind)
            .finish_non_exhaustive()
    }
}
