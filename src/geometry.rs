//! Feature geometry and property types shared by map layers and the
//! vector tile encoder.

/// A 2D coordinate in the map's plane.
pub type Point = [f64; 2];

/// Feature geometry.
///
/// Polygons are rings of points; the first ring is the exterior, the rest
/// are holes. Rings do not repeat the closing point.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// One or more points.
    Points(Vec<Point>),
    /// One or more line strings.
    Lines(Vec<Vec<Point>>),
    /// One or more rings.
    Polygon(Vec<Vec<Point>>),
}

impl Geometry {
    /// Returns true if the geometry carries no coordinates.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Points(pts) => pts.is_empty(),
            Self::Lines(lines) => lines.iter().all(|l| l.is_empty()),
            Self::Polygon(rings) => rings.iter().all(|r| r.is_empty()),
        }
    }

    /// Returns true if every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        let finite = |pts: &Vec<Point>| pts.iter().all(|p| p[0].is_finite() && p[1].is_finite());
        match self {
            Self::Points(pts) => finite(pts),
            Self::Lines(lines) => lines.iter().all(finite),
            Self::Polygon(rings) => rings.iter().all(finite),
        }
    }
}

/// A tagged property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string.
    Str(String),
    /// 64-bit float.
    F64(f64),
    /// Signed integer.
    I64(i64),
    /// Boolean.
    Bool(bool),
}

impl Value {
    /// Stable key used for dictionary deduplication. Distinct values of
    /// different types never collide.
    pub(crate) fn dedup_key(&self) -> String {
        match self {
            Self::Str(s) => format!("s:{}", s),
            Self::F64(v) => format!("f:{}", v.to_bits()),
            Self::I64(v) => format!("i:{}", v),
            Self::Bool(v) => format!("b:{}", v),
        }
    }
}

/// A map feature: geometry plus tagged key/value properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Optional stable feature id.
    pub id: Option<u64>,
    /// The feature's geometry in map-plane coordinates.
    pub geometry: Geometry,
    /// Key/value properties in declaration order.
    pub properties: Vec<(String, Value)>,
}

impl Feature {
    /// Creates a feature with no id and no properties.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            geometry,
            properties: Vec::new(),
        }
    }

    /// Sets the feature id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Appends a property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.push((key.into(), value));
        self
    }
}

/// Signed area of a ring (shoelace). Positive for counter-clockwise.
pub(crate) fn ring_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a[0] * b[1] - b[0] * a[1];
    }
    sum / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_is_empty() {
        assert!(Geometry::Points(vec![]).is_empty());
        assert!(Geometry::Lines(vec![vec![]]).is_empty());
        assert!(!Geometry::Points(vec![[1.0, 2.0]]).is_empty());
    }

    #[test]
    fn test_geometry_is_finite() {
        assert!(Geometry::Points(vec![[1.0, 2.0]]).is_finite());
        assert!(!Geometry::Points(vec![[f64::NAN, 2.0]]).is_finite());
        assert!(!Geometry::Lines(vec![vec![[0.0, f64::INFINITY]]]).is_finite());
    }

    #[test]
    fn test_ring_area() {
        // Unit square, counter-clockwise.
        let ring = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!((ring_area(&ring) - 1.0).abs() < 1e-12);

        // Clockwise gives negative area.
        let ring: Vec<_> = ring.into_iter().rev().collect();
        assert!((ring_area(&ring) + 1.0).abs() < 1e-12);

        // Degenerate.
        assert_eq!(ring_area(&[[0.0, 0.0], [1.0, 1.0]]), 0.0);
    }

    #[test]
    fn test_value_dedup_keys_distinct_by_type() {
        assert_ne!(Value::Str("1".into()).dedup_key(), Value::I64(1).dedup_key());
        assert_ne!(Value::Bool(true).dedup_key(), Value::Str("true".into()).dedup_key());
    }

    #[test]
    fn test_feature_builder() {
        let f = Feature::new(Geometry::Points(vec![[0.0, 0.0]]))
            .with_id(7)
            .with_property("name", Value::Str("depot".into()));
        assert_eq!(f.id, Some(7));
        assert_eq!(f.properties.len(), 1);
    }
}
