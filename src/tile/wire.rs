//! Protobuf wire primitives for the Mapbox Vector Tile format.
//!
//! Only the handful of constructs the tile schema needs: varints, zigzag,
//! length-delimited fields, packed repeated varints, and fixed64 doubles.

/// Wire type for varint fields.
pub(crate) const WIRE_VARINT: u64 = 0;
/// Wire type for fixed 64-bit fields.
pub(crate) const WIRE_FIXED64: u64 = 1;
/// Wire type for length-delimited fields.
pub(crate) const WIRE_LEN: u64 = 2;

/// Zigzag-encodes a signed delta for the geometry command stream.
pub(crate) fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// Inverse of [`zigzag`].
pub(crate) fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Append-only protobuf writer.
#[derive(Debug, Default)]
pub(crate) struct PbfWriter {
    buf: Vec<u8>,
}

impl PbfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn write_key(&mut self, field: u64, wire: u64) {
        self.write_varint((field << 3) | wire);
    }

    /// Varint-typed field.
    pub fn field_varint(&mut self, field: u64, v: u64) {
        self.write_key(field, WIRE_VARINT);
        self.write_varint(v);
    }

    /// Double field (fixed64, little-endian).
    pub fn field_double(&mut self, field: u64, v: f64) {
        self.write_key(field, WIRE_FIXED64);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-delimited string field.
    pub fn field_string(&mut self, field: u64, v: &str) {
        self.field_bytes(field, v.as_bytes());
    }

    /// Length-delimited bytes field (also used for nested messages).
    pub fn field_bytes(&mut self, field: u64, v: &[u8]) {
        self.write_key(field, WIRE_LEN);
        self.write_varint(v.len() as u64);
        self.buf.extend_from_slice(v);
    }

    /// Packed repeated varints.
    pub fn field_packed(&mut self, field: u64, values: &[u64]) {
        let mut body = PbfWriter::new();
        for v in values {
            body.write_varint(*v);
        }
        self.field_bytes(field, &body.buf);
    }
}

/// Cursor-based protobuf reader for the reference decoder.
#[derive(Debug)]
pub(crate) struct PbfReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PbfReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_varint(&mut self) -> Option<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self.buf.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
            shift += 7;
            if shift >= 64 {
                return None;
            }
        }
    }

    /// Reads a field key, returning `(field_number, wire_type)`.
    pub fn read_key(&mut self) -> Option<(u64, u64)> {
        let key = self.read_varint()?;
        Some((key >> 3, key & 0x7))
    }

    pub fn read_bytes(&mut self) -> Option<&'a [u8]> {
        let len = self.read_varint()? as usize;
        let end = self.pos.checked_add(len)?;
        if end > self.buf.len() {
            return None;
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Some(slice)
    }

    pub fn read_double(&mut self) -> Option<f64> {
        let end = self.pos.checked_add(8)?;
        if end > self.buf.len() {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Some(f64::from_le_bytes(bytes))
    }

    /// Skips a field of the given wire type.
    pub fn skip(&mut self, wire: u64) -> Option<()> {
        match wire {
            WIRE_VARINT => {
                self.read_varint()?;
            }
            WIRE_FIXED64 => {
                self.read_double()?;
            }
            WIRE_LEN => {
                self.read_bytes()?;
            }
            _ => return None,
        }
        Some(())
    }
}
