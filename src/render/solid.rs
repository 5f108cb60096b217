//! Built-in deterministic renderer.

use super::{RenderParams, Renderer};
use crate::buffer::PixelFormat;
use crate::error::EngineError;
use crate::map::MapState;

/// Renderer that fills the output with the style's background color.
///
/// Useful as a placeholder when no native renderer is wired up, and as the
/// deterministic reference implementation in tests: identical snapshot and
/// parameters always produce byte-identical output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolidRenderer;

impl Renderer for SolidRenderer {
    fn render(&self, map: &MapState, params: &RenderParams) -> Result<Vec<u8>, EngineError> {
        let [r, g, b, a] = map.style.background;
        let pixels = params.width as usize * params.height as usize;
        let out = match params.format {
            PixelFormat::Rgba8 => {
                let mut out = Vec::with_capacity(pixels * 4);
                for _ in 0..pixels {
                    out.extend_from_slice(&[r, g, b, a]);
                }
                out
            }
            PixelFormat::Gray8 => {
                // ITU-R BT.601 luma of the background color.
                let luma = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8;
                vec![luma; pixels]
            }
        };
        Ok(out)
    }
}
