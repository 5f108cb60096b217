//! Error types for the rendering engine.
//!
//! Errors are categorized by the stage that produced them. Submission-time
//! errors (`Config`, `Backpressure`, `Shutdown`, `ContextDestroyed`) surface
//! synchronously from the call that caused them; execution-time errors
//! (`Render`, `Encode`, `Busy`, `Cancelled`) travel through the completion
//! dispatcher in the job's result slot instead of being thrown across the
//! thread boundary.

use thiserror::Error;

/// Errors produced by the engine.
///
/// Worker-thread panics never cross the thread boundary raw: they are caught
/// at the job boundary and converted into `Render` or `Encode` variants.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Invalid style, layer, extent, or engine configuration.
    /// Rejected synchronously at configuration time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The job queue is full at submit time. The caller must retry or
    /// reject the originating request; work is never buffered unbounded.
    #[error("job queue full ({capacity} jobs queued)")]
    Backpressure {
        /// Queue capacity that was exhausted.
        capacity: usize,
    },

    /// The map context is being reconfigured and the context's mutation
    /// policy is fail-fast.
    #[error("map context busy: configuration in progress")]
    Busy,

    /// Native rendering failure.
    #[error("render failed: {message}")]
    Render {
        /// Description of the failure.
        message: String,
    },

    /// Vector tile encoding failure.
    #[error("tile encoding failed{}: {message}", layer_suffix(.layer))]
    Encode {
        /// Offending layer, where known.
        layer: Option<String>,
        /// Description of the failure.
        message: String,
    },

    /// The job was cancelled before it executed.
    #[error("job cancelled")]
    Cancelled,

    /// The worker pool is draining; no new work is accepted and remaining
    /// queued jobs are force-failed once the shutdown timeout elapses.
    #[error("worker pool shutting down")]
    Shutdown,

    /// The map context was destroyed (or destruction is pending) when the
    /// job tried to reference it.
    #[error("map context destroyed")]
    ContextDestroyed,

    /// A buffer handle was accessed outside its owned state. In debug
    /// builds this is a fatal assertion instead.
    #[error("buffer accessed in state {actual}, expected {expected}")]
    BufferState {
        /// State the buffer was actually in.
        actual: &'static str,
        /// State the operation required.
        expected: &'static str,
    },
}

fn layer_suffix(layer: &Option<String>) -> String {
    match layer {
        Some(name) => format!(" (layer '{}')", name),
        None => String::new(),
    }
}

impl EngineError {
    /// Returns true if the error was raised synchronously at submit time
    /// rather than delivered through the completion dispatcher.
    pub fn is_submission_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Backpressure { .. } | Self::Shutdown | Self::ContextDestroyed
        )
    }
}
