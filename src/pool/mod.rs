//! Worker pool and async job machinery.
//!
//! The pool is a fixed set of OS threads pulling CPU-bound jobs from a
//! bounded FIFO queue, fully decoupled from the host event loop:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Host event loop                         │
//! │        submit() ──────────────┐      drains completions     │
//! └───────────────────────────────┼──────────────▲──────────────┘
//!                                 ▼              │
//! ┌─────────────────────────────────────────┐    │
//! │   WorkerPool (bounded FIFO, N threads)  │    │
//! │   full queue ⇒ Backpressure at submit   │    │
//! └───────────────────┬─────────────────────┘    │
//!                     ▼                          │
//!          worker runs job, writes buffer ──▶ CompletionDispatcher
//! ```
//!
//! Submission never blocks: a full queue is a [`Backpressure`] error the
//! caller must handle. Workers block only on the queue's condvar while
//! idle.
//!
//! [`Backpressure`]: crate::error::EngineError::Backpressure

mod handle;
mod job;
mod worker;

pub use handle::JobHandle;
pub use job::{JobId, JobKind, JobStatus};
pub use worker::{PoolConfig, WorkerPool};

pub(crate) use job::{JobMeta, QueuedJob};
