//! Layer-to-tile encoding pipeline.
//!
//! For each layer: transform features into tile-local coordinates, clip
//! against the buffered tile window, quantize to integers, drop what
//! degenerates, deduplicate properties into key/value dictionaries, and
//! serialize the protobuf messages.

use std::collections::HashMap;

use tracing::warn;

use super::clip::{clip_line, clip_points, clip_ring, ClipBox};
use super::wire::{zigzag, PbfWriter};
use super::{TileCoord, TileOptions};
use crate::error::EngineError;
use crate::geometry::{Geometry, Point, Value};
use crate::map::{Extent, Layer};

const CMD_MOVE_TO: u64 = 1;
const CMD_LINE_TO: u64 = 2;
const CMD_CLOSE_PATH: u64 = 7;

const GEOM_POINT: u64 = 1;
const GEOM_LINESTRING: u64 = 2;
const GEOM_POLYGON: u64 = 3;

/// Encodes `layers` into one vector tile for `coord`.
///
/// Every input layer appears in the output, even when all of its features
/// fall outside the tile. Features with non-finite coordinates are dropped
/// with a warning; features that clip or quantize away are dropped
/// silently. The whole tile is buffered before returning, so the caller
/// never observes a partial encoding.
pub fn encode_tile(
    layers: &[Layer],
    coord: TileCoord,
    map_extent: Extent,
    options: &TileOptions,
) -> Result<Vec<u8>, EngineError> {
    options.validate()?;
    map_extent.validate()?;

    let bounds = coord.bounds(map_extent);
    let scale_x = options.extent as f64 / bounds.width();
    let scale_y = options.extent as f64 / bounds.height();
    // Tile-local coordinates: origin at the top-left corner, Y down.
    let transform = move |p: Point| -> Point {
        [
            (p[0] - bounds.min_x) * scale_x,
            (bounds.max_y - p[1]) * scale_y,
        ]
    };
    let window = ClipBox {
        min: -(options.buffer_margin as f64),
        max: options.extent as f64 + options.buffer_margin as f64,
    };

    let mut tile = PbfWriter::new();
    for layer in layers {
        if layer.name.is_empty() {
            return Err(EngineError::Encode {
                layer: None,
                message: "layer name must not be empty".to_string(),
            });
        }
        let body = encode_layer(layer, &transform, window, options);
        tile.field_bytes(3, &body);
    }
    Ok(tile.into_bytes())
}

/// A feature that survived clipping and quantization.
struct KeptFeature {
    id: Option<u64>,
    geom_type: u64,
    commands: Vec<u64>,
    properties: Vec<(String, Value)>,
}

fn encode_layer(
    layer: &Layer,
    transform: &impl Fn(Point) -> Point,
    window: ClipBox,
    options: &TileOptions,
) -> Vec<u8> {
    let mut kept: Vec<KeptFeature> = Vec::new();
    for feature in &layer.features {
        if !feature.geometry.is_finite() {
            warn!(
                layer = %layer.name,
                feature_id = ?feature.id,
                "dropping feature with non-finite coordinates"
            );
            continue;
        }
        if let Some((geom_type, commands)) = build_geometry(&feature.geometry, transform, window) {
            kept.push(KeptFeature {
                id: feature.id,
                geom_type,
                commands,
                properties: feature.properties.clone(),
            });
        }
    }

    let (keys, values, tags) = build_dictionaries(&kept, options.deterministic);

    let mut body = PbfWriter::new();
    body.field_varint(15, 2); // layer schema version
    body.field_string(1, &layer.name);
    for (feature, feature_tags) in kept.iter().zip(&tags) {
        let mut msg = PbfWriter::new();
        if let Some(id) = feature.id {
            msg.field_varint(1, id);
        }
        msg.field_packed(2, feature_tags);
        msg.field_varint(3, feature.geom_type);
        msg.field_packed(4, &feature.commands);
        body.field_bytes(2, &msg.into_bytes());
    }
    for key in &keys {
        body.field_string(3, key);
    }
    for value in &values {
        body.field_bytes(4, &encode_value(value));
    }
    body.field_varint(5, options.extent as u64);
    body.into_bytes()
}

/// Builds the per-layer key/value dictionaries and each feature's tag
/// index pairs. Dictionaries are sorted when `deterministic` so that
/// property declaration order never leaks into the output bytes.
fn build_dictionaries(
    kept: &[KeptFeature],
    deterministic: bool,
) -> (Vec<String>, Vec<Value>, Vec<Vec<u64>>) {
    let mut keys: Vec<String> = Vec::new();
    let mut key_index: HashMap<String, u64> = HashMap::new();
    let mut values: Vec<Value> = Vec::new();
    let mut value_index: HashMap<String, u64> = HashMap::new();

    if deterministic {
        let mut sorted_keys: Vec<&String> = kept
            .iter()
            .flat_map(|f| f.properties.iter().map(|(k, _)| k))
            .collect();
        sorted_keys.sort();
        sorted_keys.dedup();
        for key in sorted_keys {
            key_index.insert(key.clone(), keys.len() as u64);
            keys.push(key.clone());
        }

        let mut sorted_values: Vec<(String, &Value)> = kept
            .iter()
            .flat_map(|f| f.properties.iter().map(|(_, v)| (v.dedup_key(), v)))
            .collect();
        sorted_values.sort_by(|a, b| a.0.cmp(&b.0));
        sorted_values.dedup_by(|a, b| a.0 == b.0);
        for (dedup_key, value) in sorted_values {
            value_index.insert(dedup_key, values.len() as u64);
            values.push(value.clone());
        }
    }

    let mut tags: Vec<Vec<u64>> = Vec::with_capacity(kept.len());
    for feature in kept {
        let mut feature_tags = Vec::with_capacity(feature.properties.len() * 2);
        for (key, value) in &feature.properties {
            let ki = *key_index.entry(key.clone()).or_insert_with(|| {
                keys.push(key.clone());
                keys.len() as u64 - 1
            });
            let vi = *value_index.entry(value.dedup_key()).or_insert_with(|| {
                values.push(value.clone());
                values.len() as u64 - 1
            });
            feature_tags.push(ki);
            feature_tags.push(vi);
        }
        tags.push(feature_tags);
    }
    (keys, values, tags)
}

fn encode_value(value: &Value) -> Vec<u8> {
    let mut msg = PbfWriter::new();
    match value {
        Value::Str(s) => msg.field_string(1, s),
        Value::F64(v) => msg.field_double(3, *v),
        Value::I64(v) => msg.field_varint(4, *v as u64),
        Value::Bool(v) => msg.field_varint(7, u64::from(*v)),
    }
    msg.into_bytes()
}

/// Clips, quantizes, and serializes one geometry into a command stream.
/// Returns `None` when nothing survives.
fn build_geometry(
    geometry: &Geometry,
    transform: &impl Fn(Point) -> Point,
    window: ClipBox,
) -> Option<(u64, Vec<u64>)> {
    match geometry {
        Geometry::Points(points) => {
            let local: Vec<Point> = points.iter().map(|p| transform(*p)).collect();
            let kept = clip_points(&local, window);
            let quantized: Vec<[i64; 2]> = kept.iter().map(|p| quantize(*p)).collect();
            if quantized.is_empty() {
                return None;
            }
            let mut writer = GeomWriter::new();
            writer.command(CMD_MOVE_TO, &quantized);
            Some((GEOM_POINT, writer.commands))
        }
        Geometry::Lines(lines) => {
            let mut writer = GeomWriter::new();
            let mut any = false;
            for line in lines {
                let local: Vec<Point> = line.iter().map(|p| transform(*p)).collect();
                for part in clip_line(&local, window) {
                    let mut quantized: Vec<[i64; 2]> =
                        part.iter().map(|p| quantize(*p)).collect();
                    quantized.dedup();
                    if quantized.len() < 2 {
                        continue;
                    }
                    writer.command(CMD_MOVE_TO, &quantized[..1]);
                    writer.command(CMD_LINE_TO, &quantized[1..]);
                    any = true;
                }
            }
            any.then_some((GEOM_LINESTRING, writer.commands))
        }
        Geometry::Polygon(rings) => {
            let mut writer = GeomWriter::new();
            for (index, ring) in rings.iter().enumerate() {
                let local: Vec<Point> = ring.iter().map(|p| transform(*p)).collect();
                let clipped = clip_ring(&local, window);
                let mut quantized: Vec<[i64; 2]> = clipped.iter().map(|p| quantize(*p)).collect();
                quantized.dedup();
                if quantized.first() == quantized.last() && quantized.len() > 1 {
                    quantized.pop();
                }
                let area2 = ring_area2(&quantized);
                if quantized.len() < 3 || area2 == 0 {
                    if index == 0 {
                        // A polygon without its exterior ring is meaningless.
                        return None;
                    }
                    continue;
                }
                // Exterior rings wind positive, holes negative, in Y-down
                // tile coordinates.
                let want_positive = index == 0;
                if (area2 > 0) != want_positive {
                    quantized.reverse();
                }
                writer.command(CMD_MOVE_TO, &quantized[..1]);
                writer.command(CMD_LINE_TO, &quantized[1..]);
                writer.close_path();
            }
            (!writer.commands.is_empty()).then_some((GEOM_POLYGON, writer.commands))
        }
    }
}

fn quantize(p: Point) -> [i64; 2] {
    [p[0].round() as i64, p[1].round() as i64]
}

/// Twice the signed area of a quantized ring. Positive is clockwise on
/// screen (Y grows downward).
fn ring_area2(ring: &[[i64; 2]]) -> i64 {
    if ring.len() < 3 {
        return 0;
    }
    let mut sum: i64 = 0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a[0] * b[1] - b[0] * a[1];
    }
    sum
}

/// Builds a geometry command stream, tracking the cursor across parts.
struct GeomWriter {
    commands: Vec<u64>,
    cursor: [i64; 2],
}

impl GeomWriter {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
            cursor: [0, 0],
        }
    }

    fn command(&mut self, id: u64, points: &[[i64; 2]]) {
        self.commands.push((points.len() as u64) << 3 | id);
        for p in points {
            self.commands.push(zigzag(p[0] - self.cursor[0]));
            self.commands.push(zigzag(p[1] - self.cursor[1]));
            self.cursor = *p;
        }
    }

    fn close_path(&mut self) {
        self.commands.push(1 << 3 | CMD_CLOSE_PATH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Feature;
    use crate::tile::decode::decode_tile;

    fn map_extent() -> Extent {
        Extent::new(0.0, 0.0, 4096.0, 4096.0).unwrap()
    }

    fn root_tile() -> TileCoord {
        TileCoord::new(0, 0, 0).unwrap()
    }

    #[test]
    fn test_point_lands_in_tile_coordinates() {
        // Map units equal tile units on this extent, but Y flips.
        let layer = Layer::new("poi")
            .with_feature(Feature::new(Geometry::Points(vec![[1024.0, 1024.0]])));
        let bytes =
            encode_tile(&[layer], root_tile(), map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        assert_eq!(tile.layers.len(), 1);
        let feature = &tile.layers[0].features[0];
        assert_eq!(feature.geom_type, GEOM_POINT);
        assert_eq!(feature.paths, vec![vec![[1024, 3072]]]);
    }

    #[test]
    fn test_feature_outside_tile_dropped_layer_kept() {
        let layer = Layer::new("poi")
            .with_feature(Feature::new(Geometry::Points(vec![[-9000.0, -9000.0]])));
        let bytes =
            encode_tile(&[layer], root_tile(), map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        assert_eq!(tile.layers.len(), 1);
        assert_eq!(tile.layers[0].name, "poi");
        assert!(tile.layers[0].features.is_empty());
    }

    #[test]
    fn test_non_finite_feature_dropped() {
        let layer = Layer::new("poi")
            .with_feature(Feature::new(Geometry::Points(vec![[f64::NAN, 0.0]])))
            .with_feature(Feature::new(Geometry::Points(vec![[10.0, 10.0]])));
        let bytes =
            encode_tile(&[layer], root_tile(), map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        assert_eq!(tile.layers[0].features.len(), 1);
    }

    #[test]
    fn test_line_clipped_to_buffered_window() {
        let options = TileOptions::default().with_buffer_margin(64);
        let layer = Layer::new("roads").with_feature(Feature::new(Geometry::Lines(vec![vec![
            [-2000.0, 2048.0],
            [6000.0, 2048.0],
        ]])));
        let bytes = encode_tile(&[layer], root_tile(), map_extent(), &options).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        let feature = &tile.layers[0].features[0];
        assert_eq!(feature.geom_type, GEOM_LINESTRING);
        assert_eq!(feature.paths, vec![vec![[-64, 2048], [4160, 2048]]]);
    }

    #[test]
    fn test_degenerate_line_dropped() {
        // Both points quantize to the same integer coordinate.
        let layer = Layer::new("roads").with_feature(Feature::new(Geometry::Lines(vec![vec![
            [100.0, 100.0],
            [100.1, 100.1],
        ]])));
        let bytes =
            encode_tile(&[layer], root_tile(), map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        assert!(tile.layers[0].features.is_empty());
    }

    #[test]
    fn test_polygon_exterior_winds_positive() {
        // Counter-clockwise in map coordinates.
        let ring = vec![[0.0, 0.0], [1000.0, 0.0], [1000.0, 1000.0], [0.0, 1000.0]];
        let layer = Layer::new("water").with_feature(Feature::new(Geometry::Polygon(vec![ring])));
        let bytes =
            encode_tile(&[layer], root_tile(), map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        let feature = &tile.layers[0].features[0];
        assert_eq!(feature.geom_type, GEOM_POLYGON);
        assert_eq!(feature.paths.len(), 1);
        assert!(ring_area2(&feature.paths[0]) > 0);
    }

    #[test]
    fn test_polygon_without_exterior_dropped() {
        let far_away = vec![
            [-9000.0, -9000.0],
            [-8000.0, -9000.0],
            [-8000.0, -8000.0],
            [-9000.0, -8000.0],
        ];
        let hole = vec![[100.0, 100.0], [200.0, 100.0], [200.0, 200.0], [100.0, 200.0]];
        let layer = Layer::new("water")
            .with_feature(Feature::new(Geometry::Polygon(vec![far_away, hole])));
        let bytes =
            encode_tile(&[layer], root_tile(), map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        assert!(tile.layers[0].features.is_empty());
    }

    #[test]
    fn test_properties_deduplicated() {
        let layer = Layer::new("poi")
            .with_feature(
                Feature::new(Geometry::Points(vec![[10.0, 10.0]]))
                    .with_property("kind", Value::Str("cafe".into()))
                    .with_property("floors", Value::I64(2)),
            )
            .with_feature(
                Feature::new(Geometry::Points(vec![[20.0, 20.0]]))
                    .with_property("kind", Value::Str("cafe".into())),
            );
        let bytes =
            encode_tile(&[layer], root_tile(), map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        let layer = &tile.layers[0];
        assert_eq!(layer.keys.len(), 2);
        assert_eq!(layer.values.len(), 2);
        // Both features reference the same "kind"/"cafe" dictionary slots.
        let kind = layer.keys.iter().position(|k| k == "kind").unwrap() as u64;
        let first = layer.features[0].tags.chunks(2).find(|t| t[0] == kind).unwrap();
        let second = layer.features[1].tags.chunks(2).find(|t| t[0] == kind).unwrap();
        assert_eq!(first[1], second[1]);
    }

    #[test]
    fn test_deterministic_ignores_property_order() {
        let feature_a = Feature::new(Geometry::Points(vec![[10.0, 10.0]]))
            .with_property("a", Value::I64(1))
            .with_property("b", Value::I64(2));
        let feature_b = Feature::new(Geometry::Points(vec![[10.0, 10.0]]))
            .with_property("b", Value::I64(2))
            .with_property("a", Value::I64(1));

        let encode = |f: Feature| {
            encode_tile(
                &[Layer::new("poi").with_feature(f)],
                root_tile(),
                map_extent(),
                &TileOptions::default(),
            )
            .unwrap()
        };
        let bytes_a = encode(feature_a.clone());
        let bytes_b = encode(feature_b);
        // Sorted dictionaries make the two byte-identical.
        let tile_a = decode_tile(&bytes_a).unwrap();
        assert_eq!(tile_a.layers[0].keys, vec!["a".to_string(), "b".to_string()]);

        let repeat = encode(feature_a);
        assert_eq!(bytes_a, repeat);
        // Same dictionaries, same tag targets, different tag order only at
        // the feature level; dictionary bytes match.
        let tile_b = decode_tile(&bytes_b).unwrap();
        assert_eq!(tile_a.layers[0].keys, tile_b.layers[0].keys);
        assert_eq!(tile_a.layers[0].values, tile_b.layers[0].values);
    }

    #[test]
    fn test_zoomed_tile_sees_its_quadrant_only() {
        // z=1 (1,0) covers x in [2048, 4096], y in [2048, 4096].
        let coord = TileCoord::new(1, 1, 0).unwrap();
        let inside = Feature::new(Geometry::Points(vec![[3072.0, 3072.0]]));
        let outside = Feature::new(Geometry::Points(vec![[1024.0, 1024.0]]));
        let layer = Layer::new("poi").with_feature(inside).with_feature(outside);
        let bytes = encode_tile(&[layer], coord, map_extent(), &TileOptions::default()).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        assert_eq!(tile.layers[0].features.len(), 1);
        // (3072, 3072) maps to the middle of this tile at doubled scale.
        assert_eq!(tile.layers[0].features[0].paths, vec![vec![[2048, 2048]]]);
    }

    #[test]
    fn test_empty_layer_name_rejected() {
        let err = encode_tile(
            &[Layer::new("")],
            root_tile(),
            map_extent(),
            &TileOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Encode { .. }));
    }

    #[test]
    fn test_layer_extent_and_version_recorded() {
        let options = TileOptions::default().with_extent(512);
        let bytes = encode_tile(&[Layer::new("poi")], root_tile(), map_extent(), &options).unwrap();
        let tile = decode_tile(&bytes).unwrap();
        assert_eq!(tile.layers[0].version, 2);
        assert_eq!(tile.layers[0].extent, 512);
    }
}
