//! Shared map rendering state.
//!
//! The [`MapContext`] is the only long-lived shared mutable resource in the
//! engine. It is shared by reference (`Arc`) across many jobs, read-mostly
//! during rendering, and exclusively mutated only through the synchronous
//! configuration calls ([`MapContext::load`], [`MapContext::add_layer`],
//! [`MapContext::set_extent`], [`MapContext::set_output_size`]).
//!
//! # Thread-safety contract
//!
//! Configuration calls must complete before any render call using the
//! context starts. The contract is enforced with an in-flight reference
//! count plus a mutation-in-progress flag:
//!
//! - job enqueue takes a [`ContextTicket`] (refcount increment; refused once
//!   destruction is pending),
//! - a worker resolving the ticket into a [`MapState`] snapshot waits for a
//!   pending mutation to finish ([`MutationPolicy::Block`], the default) or
//!   fails fast with `Busy` ([`MutationPolicy::FailFast`]),
//! - destruction defers until the reference count reaches zero.
//!
//! Renders work off an immutable snapshot, so an interleaved configuration
//! call is either fully visible to a job or not visible at all.

mod context;
mod types;

pub use context::{ContextTicket, MapContext, MutationPolicy};
pub use types::{Extent, Layer, LayerStyle, MapState, OutputSize, StyleDefinition};
