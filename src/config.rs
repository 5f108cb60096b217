//! Engine configuration.

use crate::error::EngineError;
use crate::map::MutationPolicy;
use crate::pool::PoolConfig;
use crate::tile::{TileOptions, DEFAULT_BUFFER_MARGIN, DEFAULT_TILE_EXTENT};

/// Top-level engine configuration, covering the worker pool and the
/// defaults applied to every tile encode.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool sizing.
    pub pool: PoolConfig,
    /// Mutation policy for contexts created through the engine.
    pub mutation_policy: MutationPolicy,
    /// Default tile coordinate-space resolution.
    pub tile_extent: u32,
    /// Default clipping buffer margin, in tile units.
    pub buffer_margin: u32,
    /// Sort tile dictionaries for byte-stable output.
    pub deterministic_encoding: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            mutation_policy: MutationPolicy::default(),
            tile_extent: DEFAULT_TILE_EXTENT,
            buffer_margin: DEFAULT_BUFFER_MARGIN,
            deterministic_encoding: true,
        }
    }
}

impl EngineConfig {
    /// Sets the worker thread count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.pool = self.pool.with_workers(workers);
        self
    }

    /// Sets the job queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.pool = self.pool.with_capacity(capacity);
        self
    }

    /// Sets the mutation policy for engine-created contexts.
    pub fn with_mutation_policy(mut self, policy: MutationPolicy) -> Self {
        self.mutation_policy = policy;
        self
    }

    /// Sets the default tile extent.
    pub fn with_tile_extent(mut self, extent: u32) -> Self {
        self.tile_extent = extent;
        self
    }

    /// Sets the default clipping buffer margin.
    pub fn with_buffer_margin(mut self, margin: u32) -> Self {
        self.buffer_margin = margin;
        self
    }

    /// Enables or disables deterministic tile encoding.
    pub fn with_deterministic_encoding(mut self, deterministic: bool) -> Self {
        self.deterministic_encoding = deterministic;
        self
    }

    /// Default tile options derived from this configuration.
    pub fn tile_options(&self) -> TileOptions {
        TileOptions::default()
            .with_extent(self.tile_extent)
            .with_buffer_margin(self.buffer_margin)
            .with_deterministic(self.deterministic_encoding)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.pool.validate()?;
        self.tile_options().validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_workers(2)
            .with_queue_capacity(4)
            .with_mutation_policy(MutationPolicy::FailFast)
            .with_tile_extent(512)
            .with_buffer_margin(8)
            .with_deterministic_encoding(false);
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.pool.capacity, 4);
        assert_eq!(config.mutation_policy, MutationPolicy::FailFast);

        let options = config.tile_options();
        assert_eq!(options.extent, 512);
        assert_eq!(options.buffer_margin, 8);
        assert!(!options.deterministic);
    }

    #[test]
    fn test_invalid_rejected() {
        assert!(EngineConfig::default().with_workers(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_queue_capacity(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default().with_tile_extent(0).validate().is_err());
    }
}
