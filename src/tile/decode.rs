//! Reference tile decoder.
//!
//! Parses tiles produced by [`encode_tile`](super::encode_tile) back into
//! inspectable structures. Used for round-trip verification in tests and
//! for diagnosing tile contents; it is not a general-purpose reader and
//! skips fields it does not know.

use super::wire::{unzigzag, PbfReader, WIRE_LEN, WIRE_VARINT};
use crate::error::EngineError;
use crate::geometry::Value;

/// A decoded tile.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile {
    /// Layers in encoding order.
    pub layers: Vec<DecodedLayer>,
}

/// A decoded layer with its dictionaries.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLayer {
    /// Layer name.
    pub name: String,
    /// Schema version.
    pub version: u64,
    /// Coordinate-space resolution.
    pub extent: u64,
    /// Key dictionary.
    pub keys: Vec<String>,
    /// Value dictionary.
    pub values: Vec<Value>,
    /// Features in encoding order.
    pub features: Vec<DecodedFeature>,
}

/// A decoded feature with its geometry expanded from the command stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFeature {
    /// Feature id, if one was written.
    pub id: Option<u64>,
    /// Geometry type tag (1 point, 2 linestring, 3 polygon).
    pub geom_type: u64,
    /// Flat `[key_index, value_index, ...]` pairs into the dictionaries.
    pub tags: Vec<u64>,
    /// Decoded paths in tile coordinates. For polygons each path is one
    /// ring without the repeated closing point.
    pub paths: Vec<Vec<[i64; 2]>>,
}

fn malformed(message: &str) -> EngineError {
    EngineError::Encode {
        layer: None,
        message: format!("malformed tile: {}", message),
    }
}

/// Decodes a tile.
pub fn decode_tile(bytes: &[u8]) -> Result<DecodedTile, EngineError> {
    let mut reader = PbfReader::new(bytes);
    let mut layers = Vec::new();
    while !reader.is_eof() {
        let (field, wire) = reader.read_key().ok_or_else(|| malformed("truncated key"))?;
        if field == 3 && wire == WIRE_LEN {
            let body = reader.read_bytes().ok_or_else(|| malformed("truncated layer"))?;
            layers.push(decode_layer(body)?);
        } else {
            reader.skip(wire).ok_or_else(|| malformed("bad wire type"))?;
        }
    }
    Ok(DecodedTile { layers })
}

fn decode_layer(bytes: &[u8]) -> Result<DecodedLayer, EngineError> {
    let mut reader = PbfReader::new(bytes);
    let mut layer = DecodedLayer {
        name: String::new(),
        version: 0,
        extent: 0,
        keys: Vec::new(),
        values: Vec::new(),
        features: Vec::new(),
    };
    while !reader.is_eof() {
        let (field, wire) = reader.read_key().ok_or_else(|| malformed("truncated key"))?;
        match (field, wire) {
            (15, WIRE_VARINT) => {
                layer.version = reader.read_varint().ok_or_else(|| malformed("version"))?;
            }
            (1, WIRE_LEN) => {
                let raw = reader.read_bytes().ok_or_else(|| malformed("name"))?;
                layer.name = String::from_utf8(raw.to_vec())
                    .map_err(|_| malformed("layer name is not UTF-8"))?;
            }
            (2, WIRE_LEN) => {
                let body = reader.read_bytes().ok_or_else(|| malformed("feature"))?;
                layer.features.push(decode_feature(body)?);
            }
            (3, WIRE_LEN) => {
                let raw = reader.read_bytes().ok_or_else(|| malformed("key"))?;
                let key =
                    String::from_utf8(raw.to_vec()).map_err(|_| malformed("key is not UTF-8"))?;
                layer.keys.push(key);
            }
            (4, WIRE_LEN) => {
                let body = reader.read_bytes().ok_or_else(|| malformed("value"))?;
                layer.values.push(decode_value(body)?);
            }
            (5, WIRE_VARINT) => {
                layer.extent = reader.read_varint().ok_or_else(|| malformed("extent"))?;
            }
            (_, wire) => {
                reader.skip(wire).ok_or_else(|| malformed("bad wire type"))?;
            }
        }
    }
    Ok(layer)
}

fn decode_value(bytes: &[u8]) -> Result<Value, EngineError> {
    let mut reader = PbfReader::new(bytes);
    let (field, _) = reader.read_key().ok_or_else(|| malformed("empty value"))?;
    match field {
        1 => {
            let raw = reader.read_bytes().ok_or_else(|| malformed("string value"))?;
            let s = String::from_utf8(raw.to_vec())
                .map_err(|_| malformed("string value is not UTF-8"))?;
            Ok(Value::Str(s))
        }
        3 => Ok(Value::F64(
            reader.read_double().ok_or_else(|| malformed("double value"))?,
        )),
        4 => Ok(Value::I64(
            reader.read_varint().ok_or_else(|| malformed("int value"))? as i64,
        )),
        7 => Ok(Value::Bool(
            reader.read_varint().ok_or_else(|| malformed("bool value"))? != 0,
        )),
        other => Err(malformed(&format!("unknown value field {}", other))),
    }
}

fn decode_feature(bytes: &[u8]) -> Result<DecodedFeature, EngineError> {
    let mut reader = PbfReader::new(bytes);
    let mut feature = DecodedFeature {
        id: None,
        geom_type: 0,
        tags: Vec::new(),
        paths: Vec::new(),
    };
    while !reader.is_eof() {
        let (field, wire) = reader.read_key().ok_or_else(|| malformed("truncated key"))?;
        match (field, wire) {
            (1, WIRE_VARINT) => {
                feature.id = Some(reader.read_varint().ok_or_else(|| malformed("id"))?);
            }
            (2, WIRE_LEN) => {
                let packed = reader.read_bytes().ok_or_else(|| malformed("tags"))?;
                let mut tags = PbfReader::new(packed);
                while !tags.is_eof() {
                    feature
                        .tags
                        .push(tags.read_varint().ok_or_else(|| malformed("tag"))?);
                }
            }
            (3, WIRE_VARINT) => {
                feature.geom_type = reader.read_varint().ok_or_else(|| malformed("type"))?;
            }
            (4, WIRE_LEN) => {
                let packed = reader.read_bytes().ok_or_else(|| malformed("geometry"))?;
                feature.paths = decode_paths(packed)?;
            }
            (_, wire) => {
                reader.skip(wire).ok_or_else(|| malformed("bad wire type"))?;
            }
        }
    }
    Ok(feature)
}

/// Expands a geometry command stream into absolute-coordinate paths.
fn decode_paths(packed: &[u8]) -> Result<Vec<Vec<[i64; 2]>>, EngineError> {
    let mut reader = PbfReader::new(packed);
    let mut paths: Vec<Vec<[i64; 2]>> = Vec::new();
    let mut cursor: [i64; 2] = [0, 0];

    while !reader.is_eof() {
        let command = reader.read_varint().ok_or_else(|| malformed("command"))?;
        let id = command & 0x7;
        let count = command >> 3;
        match id {
            // MoveTo
            1 => {
                for _ in 0..count {
                    advance(&mut reader, &mut cursor)?;
                    paths.push(vec![cursor]);
                }
            }
            // LineTo
            2 => {
                let path = paths.last_mut().ok_or_else(|| malformed("LineTo before MoveTo"))?;
                for _ in 0..count {
                    advance(&mut reader, &mut cursor)?;
                    path.push(cursor);
                }
            }
            // ClosePath
            7 => {
                if paths.is_empty() {
                    return Err(malformed("ClosePath before MoveTo"));
                }
            }
            other => return Err(malformed(&format!("unknown command {}", other))),
        }
    }
    Ok(paths)
}

fn advance(reader: &mut PbfReader<'_>, cursor: &mut [i64; 2]) -> Result<(), EngineError> {
    let dx = reader.read_varint().ok_or_else(|| malformed("dx"))?;
    let dy = reader.read_varint().ok_or_else(|| malformed("dy"))?;
    cursor[0] += unzigzag(dx);
    cursor[1] += unzigzag(dy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Feature, Geometry};
    use crate::map::{Extent, Layer};
    use crate::tile::{encode_tile, TileCoord, TileOptions};

    #[test]
    fn test_garbage_input_rejected() {
        assert!(decode_tile(&[0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn test_empty_tile_decodes() {
        let tile = decode_tile(&[]).unwrap();
        assert!(tile.layers.is_empty());
    }

    #[test]
    fn test_full_roundtrip() {
        let extent = Extent::new(0.0, 0.0, 4096.0, 4096.0).unwrap();
        let layer = Layer::new("mixed")
            .with_feature(
                Feature::new(Geometry::Lines(vec![vec![[0.0, 4096.0], [100.0, 3996.0]]]))
                    .with_id(42)
                    .with_property("name", Value::Str("diagonal".into()))
                    .with_property("paved", Value::Bool(true)),
            )
            .with_feature(Feature::new(Geometry::Polygon(vec![vec![
                [10.0, 10.0],
                [500.0, 10.0],
                [500.0, 500.0],
                [10.0, 500.0],
            ]])));
        let bytes = encode_tile(
            &[layer],
            TileCoord::new(0, 0, 0).unwrap(),
            extent,
            &TileOptions::default(),
        )
        .unwrap();

        let tile = decode_tile(&bytes).unwrap();
        let layer = &tile.layers[0];
        assert_eq!(layer.name, "mixed");
        assert_eq!(layer.features.len(), 2);

        let line = &layer.features[0];
        assert_eq!(line.id, Some(42));
        assert_eq!(line.geom_type, 2);
        assert_eq!(line.paths, vec![vec![[0, 0], [100, 100]]]);
        assert_eq!(line.tags.len(), 4);
        assert!(layer.keys.contains(&"paved".to_string()));
        assert!(layer.values.contains(&Value::Bool(true)));

        let polygon = &layer.features[1];
        assert_eq!(polygon.id, None);
        assert_eq!(polygon.geom_type, 3);
        assert_eq!(polygon.paths.len(), 1);
        assert_eq!(polygon.paths[0].len(), 4);
    }
}
