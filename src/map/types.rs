//! Map state value types: extent, output size, styles, layers.

use crate::error::EngineError;
use crate::geometry::Feature;

/// Axis-aligned geographic extent in map-plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    /// Minimum X.
    pub min_x: f64,
    /// Minimum Y.
    pub min_y: f64,
    /// Maximum X.
    pub max_x: f64,
    /// Maximum Y.
    pub max_y: f64,
}

impl Extent {
    /// Creates an extent, validating that it is non-degenerate and finite.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, EngineError> {
        let extent = Self {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        extent.validate()?;
        Ok(extent)
    }

    /// Validates the extent.
    pub fn validate(&self) -> Result<(), EngineError> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(EngineError::Config("extent must be finite".to_string()));
        }
        if self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(EngineError::Config(format!(
                "degenerate extent [{}, {}, {}, {}]",
                self.min_x, self.min_y, self.max_x, self.max_y
            )));
        }
        Ok(())
    }

    /// Extent width.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Extent height.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl Default for Extent {
    /// Full Web-Mercator-style square world extent.
    fn default() -> Self {
        Self {
            min_x: -20_037_508.34,
            min_y: -20_037_508.34,
            max_x: 20_037_508.34,
            max_y: 20_037_508.34,
        }
    }
}

/// Output raster dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl OutputSize {
    /// Creates an output size, rejecting zero dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::Config(format!(
                "output size must be non-zero, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl Default for OutputSize {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
        }
    }
}

/// Per-layer styling directives. Interpreted by the renderer, opaque to
/// the engine beyond validation.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStyle {
    /// Name of the layer this style applies to.
    pub layer: String,
    /// RGBA fill color.
    pub fill: [u8; 4],
}

/// A style definition: background plus per-layer directives.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDefinition {
    /// Style name.
    pub name: String,
    /// RGBA background color.
    pub background: [u8; 4],
    /// Per-layer styles.
    pub layer_styles: Vec<LayerStyle>,
}

impl StyleDefinition {
    /// Validates the style definition.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.is_empty() {
            return Err(EngineError::Config("style name must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for StyleDefinition {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            background: [0, 0, 0, 0],
            layer_styles: Vec::new(),
        }
    }
}

/// A named, ordered collection of features.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Layer name, unique within a context.
    pub name: String,
    /// Features in drawing order.
    pub features: Vec<Feature>,
}

impl Layer {
    /// Creates an empty layer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }

    /// Appends a feature.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }
}

/// Immutable snapshot of a map context's state, cloned at job start.
#[derive(Debug, Clone, PartialEq)]
pub struct MapState {
    /// Active style definition.
    pub style: StyleDefinition,
    /// Ordered layers.
    pub layers: Vec<Layer>,
    /// Geographic extent the map covers.
    pub extent: Extent,
    /// Default output raster size.
    pub output_size: OutputSize,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            style: StyleDefinition::default(),
            layers: Vec::new(),
            extent: Extent::default(),
            output_size: OutputSize::default(),
        }
    }
}
