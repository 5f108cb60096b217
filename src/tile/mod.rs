//! Vector tile encoding.
//!
//! Serializes map layers into the Mapbox Vector Tile wire format for one
//! tile coordinate: geometries are clipped to the tile bounds plus a
//! configurable buffer margin, quantized to integers in `[0, extent)`, and
//! properties are deduplicated into per-layer key/value dictionaries. The
//! encoder buffers the whole tile in memory before returning, so a corrupt
//! partial tile is never observable.
//!
//! Encoding is deterministic: identical input geometry and options always
//! yield byte-identical output.
//!
//! A minimal reference decoder lives in [`decode`] for round-trip
//! verification and diagnostics.

mod clip;
pub mod decode;
mod encoder;
mod wire;

pub use encoder::encode_tile;

use crate::error::EngineError;
use crate::map::Extent;

/// Default tile coordinate-space resolution.
pub const DEFAULT_TILE_EXTENT: u32 = 4096;

/// Default clipping buffer margin, in tile coordinate units.
pub const DEFAULT_BUFFER_MARGIN: u32 = 64;

/// A tile address in a z/x/y pyramid over the map extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Zoom level; the map extent is divided into `2^z × 2^z` tiles.
    pub z: u8,
    /// Column, counted from the extent's minimum X.
    pub x: u32,
    /// Row, counted from the extent's maximum Y downward.
    pub y: u32,
}

impl TileCoord {
    /// Creates a tile coordinate, validating it against the pyramid.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, EngineError> {
        if z > 30 {
            return Err(EngineError::Config(format!("zoom {} out of range", z)));
        }
        let side = 1u32 << z;
        if x >= side || y >= side {
            return Err(EngineError::Config(format!(
                "tile ({}, {}) out of range at zoom {} ({}x{} tiles)",
                x, y, z, side, side
            )));
        }
        Ok(Self { z, x, y })
    }

    /// The sub-extent of `map_extent` this tile covers.
    pub fn bounds(&self, map_extent: Extent) -> Extent {
        let side = (1u64 << self.z) as f64;
        let span_x = map_extent.width() / side;
        let span_y = map_extent.height() / side;
        let min_x = map_extent.min_x + self.x as f64 * span_x;
        let max_y = map_extent.max_y - self.y as f64 * span_y;
        Extent {
            min_x,
            min_y: max_y - span_y,
            max_x: min_x + span_x,
            max_y,
        }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Options controlling tile encoding.
#[derive(Debug, Clone, Copy)]
pub struct TileOptions {
    /// Coordinate-space resolution; quantized coordinates land in
    /// `[0, extent)`.
    pub extent: u32,
    /// Clipping margin beyond the tile bounds, in tile units.
    pub buffer_margin: u32,
    /// Sort the key/value dictionaries for byte-stable output regardless
    /// of property declaration order.
    pub deterministic: bool,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            extent: DEFAULT_TILE_EXTENT,
            buffer_margin: DEFAULT_BUFFER_MARGIN,
            deterministic: true,
        }
    }
}

impl TileOptions {
    /// Sets the coordinate-space resolution.
    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    /// Sets the clipping buffer margin.
    pub fn with_buffer_margin(mut self, margin: u32) -> Self {
        self.buffer_margin = margin;
        self
    }

    /// Enables or disables dictionary sorting.
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.extent == 0 {
            return Err(EngineError::Config("tile extent must be non-zero".to_string()));
        }
        Ok(())
    }
}
