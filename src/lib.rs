//! TileBridge - native map rendering and vector tile encoding for
//! event-loop hosts.
//!
//! The engine runs CPU-bound rendering and tile encoding on a fixed pool of
//! worker threads so a single-threaded host event loop never blocks.
//! Submission is synchronous and cheap; results flow back through a
//! delivery queue the host drains on its own schedule.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilebridge::config::EngineConfig;
//! use tilebridge::engine::MapEngine;
//! use tilebridge::render::{RenderParams, SolidRenderer};
//!
//! let (engine, queue) = MapEngine::new(Arc::new(SolidRenderer), EngineConfig::default())?;
//! let context = engine.create_context();
//! context.add_layer(roads)?;
//!
//! let handle = engine.render(&context, RenderParams::new(512, 512), None)?;
//! // ... event loop turn ...
//! for completion in queue.drain() {
//!     let pixels = completion.result?.into_bytes()?;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`map`] — shared [`MapContext`](map::MapContext) state with the
//!   refcount + mutation-flag thread-safety contract
//! - [`pool`] — the bounded FIFO worker pool and job handles
//! - [`dispatch`] — exactly-once completion delivery to the host
//! - [`buffer`] — move-only buffer handles crossing the thread boundary
//! - [`render`] — the opaque [`Renderer`](render::Renderer) capability
//! - [`tile`] — deterministic vector tile encoding
//! - [`engine`] — the facade tying it all together

pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod map;
pub mod pool;
pub mod render;
pub mod tile;

/// Version of the TileBridge library, injected from `Cargo.toml` at
/// compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
