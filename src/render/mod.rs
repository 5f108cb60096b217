//! Rendering abstraction layer.
//!
//! The engine treats low-level drawing as an opaque capability behind the
//! [`Renderer`] trait: it hands the renderer an immutable [`MapState`]
//! snapshot plus [`RenderParams`] and receives raw pixel bytes back. Style
//! interpretation, symbolizers, and projection math all live behind this
//! seam.
//!
//! Renderers must be deterministic: identical snapshot + params must yield
//! byte-identical output, so failed requests can be retried safely and
//! results can be cached.

mod solid;

pub use solid::SolidRenderer;

use crate::buffer::PixelFormat;
use crate::error::EngineError;
use crate::map::{Extent, MapState};

/// Parameters for one render request, captured at submit time.
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Extent to render; defaults to the context's extent when `None`.
    pub extent: Option<Extent>,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Pixel layout of the output buffer.
    pub format: PixelFormat,
    /// Resolution scale factor (e.g. 2.0 for HiDPI output).
    pub scale: f64,
}

impl RenderParams {
    /// Creates parameters for the given output size with defaults
    /// (context extent, RGBA, scale 1.0).
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: None,
            width,
            height,
            format: PixelFormat::Rgba8,
            scale: 1.0,
        }
    }

    /// Sets an explicit extent.
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Sets the pixel format.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the scale factor.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::Config(format!(
                "render size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(EngineError::Config(format!(
                "scale factor must be positive, got {}",
                self.scale
            )));
        }
        if let Some(extent) = &self.extent {
            extent.validate()?;
        }
        Ok(())
    }

    /// Expected output byte length.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Opaque drawing capability invoked by render jobs on worker threads.
///
/// Implementations never mutate the map state (they receive a snapshot by
/// shared reference) and must be `Send + Sync` because any worker may call
/// them concurrently.
pub trait Renderer: Send + Sync {
    /// Renders the snapshot into raw pixels laid out per
    /// `params.format`, row-major, exactly `params.expected_len()` bytes.
    fn render(&self, map: &MapState, params: &RenderParams) -> Result<Vec<u8>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        assert!(RenderParams::new(256, 256).validate().is_ok());
        assert!(RenderParams::new(0, 256).validate().is_err());
        assert!(RenderParams::new(256, 256).with_scale(0.0).validate().is_err());
        assert!(RenderParams::new(256, 256)
            .with_scale(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_expected_len() {
        let params = RenderParams::new(4, 2);
        assert_eq!(params.expected_len(), 32);
        let params = params.with_format(PixelFormat::Gray8);
        assert_eq!(params.expected_len(), 8);
    }
}
