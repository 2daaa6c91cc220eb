// scenepipe-format/src/vertex_buffer.rs
//! Packed vertex positions
//!
//! Each vertex is three little-endian IEEE-754 `f32` values (x, y, z), 12
//! bytes, with no padding between vertices. Inside the crate the buffer is
//! plain bytes; it only becomes a hex string when serialized to JSON
//! (lowercase, two characters per byte, no separators) and is decoded again
//! on read. The stride is not stored in the document, consumers must know it.

use byteorder::{ByteOrder, LittleEndian};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::FormatError;

/// Floats per vertex
pub const FLOATS_PER_VERTEX: usize = 3;

/// Bytes per vertex
pub const VERTEX_STRIDE: usize = FLOATS_PER_VERTEX * 4;

/// Hex characters per vertex in the JSON encoding
pub const HEX_CHARS_PER_VERTEX: usize = VERTEX_STRIDE * 2;

/// Owned buffer of packed vertex positions
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexBuffer {
    bytes: Vec<u8>,
}

impl VertexBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Create an empty buffer with room for `vertices` vertices
    pub fn with_capacity(vertices: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(vertices * VERTEX_STRIDE),
        }
    }

    /// Pack a slice of positions
    pub fn from_positions(positions: &[[f32; 3]]) -> Self {
        let mut buffer = Self::with_capacity(positions.len());
        for &position in positions {
            buffer.push(position);
        }
        buffer
    }

    /// Wrap raw little-endian bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FormatError> {
        if bytes.len() % VERTEX_STRIDE != 0 {
            return Err(FormatError::BufferLength {
                len: bytes.len(),
                stride: VERTEX_STRIDE,
            });
        }
        Ok(Self { bytes })
    }

    /// Decode the JSON hex representation
    pub fn from_hex(encoded: &str) -> Result<Self, FormatError> {
        if encoded.len() % HEX_CHARS_PER_VERTEX != 0 {
            return Err(FormatError::BufferLength {
                len: encoded.len(),
                stride: HEX_CHARS_PER_VERTEX,
            });
        }
        let bytes = hex::decode(encoded)?;
        Self::from_bytes(bytes)
    }

    /// Encode to the JSON hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Append one vertex
    pub fn push(&mut self, position: [f32; 3]) {
        let mut packed = [0u8; VERTEX_STRIDE];
        LittleEndian::write_f32_into(&position, &mut packed);
        self.bytes.extend_from_slice(&packed);
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.bytes.len() / VERTEX_STRIDE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw little-endian bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Position of vertex `index`
    pub fn get(&self, index: usize) -> Option<[f32; 3]> {
        let start = index.checked_mul(VERTEX_STRIDE)?;
        let chunk = self.bytes.get(start..start + VERTEX_STRIDE)?;
        Some(unpack(chunk))
    }

    /// Iterate over all positions in order
    pub fn iter(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.bytes.chunks_exact(VERTEX_STRIDE).map(unpack)
    }

    /// Unpack every position
    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.iter().collect()
    }
}

fn unpack(chunk: &[u8]) -> [f32; 3] {
    let mut position = [0f32; FLOATS_PER_VERTEX];
    LittleEndian::read_f32_into(chunk, &mut position);
    position
}

impl FromIterator<[f32; 3]> for VertexBuffer {
    fn from_iter<I: IntoIterator<Item = [f32; 3]>>(iter: I) -> Self {
        let mut buffer = VertexBuffer::new();
        for position in iter {
            buffer.push(position);
        }
        buffer
    }
}

impl Serialize for VertexBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for VertexBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        VertexBuffer::from_hex(&encoded).map_err(de::Error::custom)
    }
}
