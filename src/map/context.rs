//! The shared map context and its thread-safety mechanism.

use super::types::{Extent, Layer, MapState, OutputSize, StyleDefinition};
use crate::error::EngineError;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Policy applied when a job starts while a configuration mutation is in
/// progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationPolicy {
    /// Wait for the mutation to complete (default).
    #[default]
    Block,
    /// Fail the job immediately with `Busy`.
    FailFast,
}

/// Gate state protected by a short-lived mutex. The mutex is only ever held
/// for flag flips and counter updates, never across a render or encode.
#[derive(Debug, Default)]
struct Gate {
    /// Jobs currently referencing this context (enqueue to completion).
    in_flight: usize,
    /// A configuration call is mutating the state.
    mutating: bool,
    /// Destruction requested; no new tickets are issued.
    destroyed: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<MapState>,
    gate: Mutex<Gate>,
    cond: Condvar,
    policy: MutationPolicy,
}

/// The mutable, long-lived rendering state shared across jobs.
///
/// Cheap to clone: clones share the same underlying context.
#[derive(Debug, Clone)]
pub struct MapContext {
    inner: Arc<Inner>,
}

impl MapContext {
    /// Creates a context with the default (blocking) mutation policy.
    pub fn new() -> Self {
        Self::with_policy(MutationPolicy::default())
    }

    /// Creates a context with an explicit mutation policy.
    pub fn with_policy(policy: MutationPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MapState::default()),
                gate: Mutex::new(Gate::default()),
                cond: Condvar::new(),
                policy,
            }),
        }
    }

    /// The context's mutation policy.
    pub fn policy(&self) -> MutationPolicy {
        self.inner.policy
    }

    /// Number of jobs currently referencing this context.
    pub fn in_flight(&self) -> usize {
        self.inner.gate.lock().expect("gate poisoned").in_flight
    }

    // -------------------------------------------------------------------
    // Configuration surface (synchronous, single-writer)
    // -------------------------------------------------------------------

    /// Replaces the style definition.
    pub fn load(&self, style: StyleDefinition) -> Result<(), EngineError> {
        style.validate()?;
        self.mutate(|state| {
            state.style = style;
            Ok(())
        })
    }

    /// Appends a layer. Layer names must be unique within the context.
    pub fn add_layer(&self, layer: Layer) -> Result<(), EngineError> {
        if layer.name.is_empty() {
            return Err(EngineError::Config("layer name must not be empty".to_string()));
        }
        self.mutate(|state| {
            if state.layers.iter().any(|l| l.name == layer.name) {
                return Err(EngineError::Config(format!(
                    "duplicate layer '{}'",
                    layer.name
                )));
            }
            state.layers.push(layer);
            Ok(())
        })
    }

    /// Sets the geographic extent.
    pub fn set_extent(&self, extent: Extent) -> Result<(), EngineError> {
        extent.validate()?;
        self.mutate(|state| {
            state.extent = extent;
            Ok(())
        })
    }

    /// Sets the default output size.
    pub fn set_output_size(&self, size: OutputSize) -> Result<(), EngineError> {
        self.mutate(|state| {
            state.output_size = size;
            Ok(())
        })
    }

    /// Runs a mutation with the mutation-in-progress flag raised. Jobs
    /// starting while the flag is up block or fail per the context policy.
    fn mutate<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut MapState) -> Result<(), EngineError>,
    {
        {
            let mut gate = self.inner.gate.lock().expect("gate poisoned");
            if gate.destroyed {
                return Err(EngineError::ContextDestroyed);
            }
            // Configuration is single-writer; a second concurrent writer
            // waits for the first to finish.
            while gate.mutating {
                gate = self.inner.cond.wait(gate).expect("gate poisoned");
                if gate.destroyed {
                    return Err(EngineError::ContextDestroyed);
                }
            }
            gate.mutating = true;
        }

        let result = {
            let mut state = self.inner.state.lock().expect("state poisoned");
            f(&mut state)
        };

        let mut gate = self.inner.gate.lock().expect("gate poisoned");
        gate.mutating = false;
        self.inner.cond.notify_all();
        result
    }

    // -------------------------------------------------------------------
    // Job-side surface
    // -------------------------------------------------------------------

    /// Takes a reference-counted ticket at job enqueue time.
    ///
    /// Fails synchronously once destruction is pending, so no job is ever
    /// enqueued against a context that will not outlive it.
    pub fn retain(&self) -> Result<ContextTicket, EngineError> {
        let mut gate = self.inner.gate.lock().expect("gate poisoned");
        if gate.destroyed {
            return Err(EngineError::ContextDestroyed);
        }
        gate.in_flight += 1;
        Ok(ContextTicket {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Requests destruction: refuses new tickets, then waits (up to
    /// `timeout`) for the in-flight count to reach zero.
    ///
    /// On timeout the destruction request is withdrawn and `Busy` is
    /// returned; the context remains usable and the caller may retry.
    pub fn destroy(&self, timeout: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now() + timeout;
        let mut gate = self.inner.gate.lock().expect("gate poisoned");
        gate.destroyed = true;

        while gate.in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    in_flight = gate.in_flight,
                    "Context destruction timed out, withdrawing"
                );
                gate.destroyed = false;
                self.inner.cond.notify_all();
                return Err(EngineError::Busy);
            }
            let (g, _) = self
                .inner
                .cond
                .wait_timeout(gate, deadline - now)
                .expect("gate poisoned");
            gate = g;
        }

        debug!("Context destroyed");
        self.inner.cond.notify_all();
        Ok(())
    }

    /// Returns true if destruction has completed or is pending.
    pub fn is_destroyed(&self) -> bool {
        self.inner.gate.lock().expect("gate poisoned").destroyed
    }
}

impl Default for MapContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-intent token held by a job from enqueue to completion.
///
/// Dropping the ticket decrements the context's reference count and wakes
/// any waiter (pending destruction, blocked mutation observer).
#[derive(Debug)]
pub struct ContextTicket {
    inner: Arc<Inner>,
}

impl ContextTicket {
    /// Resolves the ticket into an immutable state snapshot at job start.
    ///
    /// If a configuration mutation is in progress, blocks until it
    /// completes (policy [`MutationPolicy::Block`]) or fails with `Busy`
    /// (policy [`MutationPolicy::FailFast`]). The snapshot is a clone taken
    /// under the state lock, so it is never half-mutated.
    pub fn snapshot(&self) -> Result<MapState, EngineError> {
        {
            let mut gate = self.inner.gate.lock().expect("gate poisoned");
            while gate.mutating {
                match self.inner.policy {
                    MutationPolicy::FailFast => return Err(EngineError::Busy),
                    MutationPolicy::Block => {
                        gate = self.inner.cond.wait(gate).expect("gate poisoned");
                    }
                }
            }
        }
        let state = self.inner.state.lock().expect("state poisoned");
        Ok(state.clone())
    }
}

impl Drop for ContextTicket {
    fn drop(&mut self) {
        let mut gate = self.inner.gate.lock().expect("gate poisoned");
        gate.in_flight = gate.in_flight.saturating_sub(1);
        self.inner.cond.notify_all();
    }
}
