//! The engine facade: ties contexts, the worker pool, the renderer, and
//! the completion dispatcher together.
//!
//! Submission is synchronous and cheap: validate, take a context ticket,
//! enqueue a closure. Everything expensive happens later on a worker
//! thread, and the result travels back through the [`DeliveryQueue`]
//! returned from [`MapEngine::new`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::error;

use crate::buffer::BufferHandle;
use crate::config::EngineConfig;
use crate::dispatch::{CompletionDispatcher, DeliveryQueue};
use crate::error::EngineError;
use crate::map::{ContextTicket, MapContext};
use crate::pool::{JobHandle, JobKind, JobMeta, QueuedJob, WorkerPool};
use crate::render::{RenderParams, Renderer};
use crate::tile::{encode_tile, TileCoord, TileOptions};

/// The rendering engine.
///
/// One engine per host process is typical; contexts are cheap and many can
/// share the same engine. All submission methods are non-blocking.
pub struct MapEngine {
    pool: WorkerPool,
    renderer: Arc<dyn Renderer>,
    config: EngineConfig,
}

impl MapEngine {
    /// Starts the engine and returns it together with the delivery queue
    /// the host drains for completed results.
    pub fn new(
        renderer: Arc<dyn Renderer>,
        config: EngineConfig,
    ) -> Result<(Self, DeliveryQueue), EngineError> {
        config.validate()?;
        let (dispatcher, queue) = CompletionDispatcher::channel();
        let pool = WorkerPool::new(config.pool.clone(), dispatcher)?;
        Ok((
            Self {
                pool,
                renderer,
                config,
            },
            queue,
        ))
    }

    /// Creates a context carrying this engine's mutation policy.
    pub fn create_context(&self) -> MapContext {
        MapContext::with_policy(self.config.mutation_policy)
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Jobs waiting in the pool queue.
    pub fn queued(&self) -> usize {
        self.pool.queued()
    }

    /// Jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Submits a raster render against `context`.
    ///
    /// Fails synchronously on invalid parameters, a full queue
    /// (`Backpressure`), or a context with destruction pending
    /// (`ContextDestroyed`). Execution-time failures arrive through the
    /// delivery queue instead.
    pub fn render(
        &self,
        context: &MapContext,
        params: RenderParams,
        deadline: Option<Instant>,
    ) -> Result<JobHandle, EngineError> {
        params.validate()?;
        let ticket = context.retain()?;
        let renderer = Arc::clone(&self.renderer);
        self.submit(JobKind::Render, deadline, move || {
            render_job(&ticket, renderer.as_ref(), params)
        })
    }

    /// Submits a vector tile encode against `context`.
    ///
    /// `options` defaults to the engine configuration when `None`.
    pub fn encode_tile(
        &self,
        context: &MapContext,
        coord: TileCoord,
        options: Option<TileOptions>,
        deadline: Option<Instant>,
    ) -> Result<JobHandle, EngineError> {
        let options = options.unwrap_or_else(|| self.config.tile_options());
        options.validate()?;
        let ticket = context.retain()?;
        self.submit(JobKind::EncodeTile, deadline, move || {
            encode_job(&ticket, coord, &options)
        })
    }

    fn submit<F>(
        &self,
        kind: JobKind,
        deadline: Option<Instant>,
        work: F,
    ) -> Result<JobHandle, EngineError>
    where
        F: FnOnce() -> Result<BufferHandle, EngineError> + Send + 'static,
    {
        let (meta, status_rx) = JobMeta::new(kind, deadline);
        let handle = JobHandle::new(
            meta.id,
            meta.kind,
            status_rx,
            Arc::clone(&meta.cancelled),
            Arc::clone(&meta.abandoned),
        );
        // A submit failure drops the job, and with it the context ticket.
        self.pool.submit(QueuedJob {
            meta,
            work: Box::new(work),
        })?;
        Ok(handle)
    }

    /// Shuts the engine down, bounded by `timeout`. See
    /// [`WorkerPool::shutdown`] for the drain semantics.
    pub fn shutdown(self, timeout: Duration) -> Result<(), EngineError> {
        self.pool.shutdown(timeout)
    }
}

impl std::fmt::Debug for MapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapEngine")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Render job body, executed on a worker thread. Panics in the renderer
/// are caught here so they surface as a failed job, never a dead worker.
fn render_job(
    ticket: &ContextTicket,
    renderer: &dyn Renderer,
    params: RenderParams,
) -> Result<BufferHandle, EngineError> {
    let snapshot = ticket.snapshot()?;
    let params = match params.extent {
        Some(_) => params,
        None => params.with_extent(snapshot.extent),
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| renderer.render(&snapshot, &params)));
    let pixels = match outcome {
        Ok(result) => result?,
        Err(payload) => {
            let message = panic_message(&payload);
            error!(message = %message, "Renderer panicked");
            return Err(EngineError::Render {
                message: format!("renderer panicked: {}", message),
            });
        }
    };

    if pixels.len() != params.expected_len() {
        return Err(EngineError::Render {
            message: format!(
                "renderer produced {} bytes, expected {}",
                pixels.len(),
                params.expected_len()
            ),
        });
    }

    let mut buffer = BufferHandle::for_pixels(params.width, params.height, params.format);
    buffer.fill(pixels)?;
    Ok(buffer)
}

/// Encode job body.
fn encode_job(
    ticket: &ContextTicket,
    coord: TileCoord,
    options: &TileOptions,
) -> Result<BufferHandle, EngineError> {
    let snapshot = ticket.snapshot()?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        encode_tile(&snapshot.layers, coord, snapshot.extent, options)
    }));
    match outcome {
        Ok(result) => Ok(BufferHandle::from_encoded(result?)),
        Err(payload) => {
            let message = panic_message(&payload);
            error!(message = %message, tile = %coord, "Tile encoder panicked");
            Err(EngineError::Encode {
                layer: None,
                message: format!("encoder panicked: {}", message),
            })
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Completion;
    use crate::map::MapState;
    use crate::render::SolidRenderer;
    use std::thread;

    fn engine(workers: usize, capacity: usize) -> (MapEngine, DeliveryQueue) {
        MapEngine::new(
            Arc::new(SolidRenderer),
            EngineConfig::default()
                .with_workers(workers)
                .with_queue_capacity(capacity),
        )
        .unwrap()
    }

    fn wait_for_completions(queue: &DeliveryQueue, n: usize) -> Vec<Completion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < n {
            assert!(Instant::now() < deadline, "timed out waiting for completions");
            out.extend(queue.drain());
            thread::sleep(Duration::from_millis(1));
        }
        out
    }

    struct PanickingRenderer;
    impl Renderer for PanickingRenderer {
        fn render(&self, _: &MapState, _: &RenderParams) -> Result<Vec<u8>, EngineError> {
            panic!("symbolizer exploded");
        }
    }

    struct ShortRenderer;
    impl Renderer for ShortRenderer {
        fn render(&self, _: &MapState, _: &RenderParams) -> Result<Vec<u8>, EngineError> {
            Ok(vec![0; 3])
        }
    }

    #[test]
    fn test_render_delivers_pixels() {
        let (engine, queue) = engine(1, 8);
        let ctx = engine.create_context();
        let handle = engine.render(&ctx, RenderParams::new(4, 4), None).unwrap();

        let completions = wait_for_completions(&queue, 1);
        assert_eq!(completions[0].job_id, handle.id());
        let buffer = completions.into_iter().next().unwrap().result.unwrap();
        assert_eq!(buffer.bytes().unwrap().len(), 64);
        engine.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_invalid_params_rejected_synchronously() {
        let (engine, _queue) = engine(1, 8);
        let ctx = engine.create_context();
        let err = engine.render(&ctx, RenderParams::new(0, 4), None).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        engine.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_destroyed_context_rejected_synchronously() {
        let (engine, _queue) = engine(1, 8);
        let ctx = engine.create_context();
        ctx.destroy(Duration::from_millis(10)).unwrap();
        let err = engine.render(&ctx, RenderParams::new(4, 4), None).unwrap_err();
        assert_eq!(err, EngineError::ContextDestroyed);
        engine.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_renderer_panic_becomes_failed_job() {
        let (engine, queue) = MapEngine::new(
            Arc::new(PanickingRenderer),
            EngineConfig::default().with_workers(1).with_queue_capacity(4),
        )
        .unwrap();
        let ctx = engine.create_context();
        engine.render(&ctx, RenderParams::new(4, 4), None).unwrap();

        let completions = wait_for_completions(&queue, 1);
        match &completions[0].result {
            Err(EngineError::Render { message }) => {
                assert!(message.contains("symbolizer exploded"));
            }
            other => panic!("expected render error, got {:?}", other),
        }
        // The worker survived the panic and still executes jobs.
        engine.render(&ctx, RenderParams::new(4, 4), None).unwrap();
        wait_for_completions(&queue, 1);
        engine.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_renderer_length_mismatch_fails() {
        let (engine, queue) = MapEngine::new(
            Arc::new(ShortRenderer),
            EngineConfig::default().with_workers(1).with_queue_capacity(4),
        )
        .unwrap();
        let ctx = engine.create_context();
        engine.render(&ctx, RenderParams::new(4, 4), None).unwrap();

        let completions = wait_for_completions(&queue, 1);
        assert!(matches!(
            completions[0].result,
            Err(EngineError::Render { .. })
        ));
        engine.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_encode_tile_delivers_encoded_buffer() {
        use crate::buffer::BufferFormat;
        let (engine, queue) = engine(1, 8);
        let ctx = engine.create_context();
        let coord = TileCoord::new(0, 0, 0).unwrap();
        engine.encode_tile(&ctx, coord, None, None).unwrap();

        let completions = wait_for_completions(&queue, 1);
        let buffer = completions.into_iter().next().unwrap().result.unwrap();
        assert_eq!(buffer.format(), BufferFormat::EncodedTile);
        engine.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_ticket_released_when_submit_fails() {
        // Fill the queue so a further submit hits backpressure; its ticket
        // must not leak a refcount on the context.
        let (engine, queue) = engine(1, 1);
        let ctx = engine.create_context();

        // Occupy the worker and the single queue slot.
        let slow = engine.render(&ctx, RenderParams::new(512, 512), None).unwrap();
        let _queued = engine.render(&ctx, RenderParams::new(4, 4), None);
        let _ = slow;

        let before = ctx.in_flight();
        match engine.render(&ctx, RenderParams::new(4, 4), None) {
            Err(EngineError::Backpressure { .. }) => {
                assert_eq!(ctx.in_flight(), before);
            }
            // Workers drained the queue first; nothing to assert.
            Ok(_) | Err(_) => {}
        }

        let _ = wait_for_completions(&queue, 1);
        engine.shutdown(Duration::from_secs(5)).unwrap();
    }
}
