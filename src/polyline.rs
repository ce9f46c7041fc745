//! Encoded polyline codec for route geometries.
//!
//! Classic 5-bit-chunked, zigzag-delta encoding at 1e5 precision. Routes
//! arrive from the planning backend with their path geometry in this format;
//! a malformed path renders as "no path" rather than aborting the route.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::LatLng;

/// Fixed precision factor: coordinates are rounded to 1e-5 degrees.
const PRECISION: f64 = 1e5;

/// Continuation bit marker for 5-bit chunks.
const CHUNK_CONT: u32 = 0x20;

#[derive(Debug, Error, PartialEq)]
pub enum MalformedPathError {
    /// Input ended in the middle of a chunked value.
    #[error("polyline truncated mid-value at byte {0}")]
    Truncated(usize),
    /// A chunked value exceeded 32 bits.
    #[error("polyline chunk overflow at byte {0}")]
    ChunkOverflow(usize),
    /// A byte outside the printable encoding range.
    #[error("invalid polyline byte {byte:#x} at offset {offset}")]
    InvalidByte { byte: u8, offset: usize },
}

/// A route geometry as a decoded coordinate sequence.
///
/// Stores points directly for rendering and detour math; the compact
/// encoding exists only at the wire boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<LatLng>,
}

impl Polyline {
    pub fn new(points: Vec<LatLng>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[LatLng] {
        &self.points
    }

    pub fn into_points(self) -> Vec<LatLng> {
        self.points
    }

    /// Decodes an encoded polyline string.
    pub fn decode(encoded: &str) -> Result<Self, MalformedPathError> {
        let bytes = encoded.as_bytes();
        let mut points = Vec::new();
        let mut offset = 0;
        let mut lat: i64 = 0;
        let mut lng: i64 = 0;

        while offset < bytes.len() {
            let (delta_lat, next) = decode_value(bytes, offset)?;
            let (delta_lng, next) = decode_value(bytes, next)?;
            offset = next;
            lat += delta_lat;
            lng += delta_lng;
            points.push(LatLng::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
        }

        Ok(Self { points })
    }

    /// Encodes the coordinate sequence into the compact format.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        let mut prev_lat: i64 = 0;
        let mut prev_lng: i64 = 0;

        for point in &self.points {
            let lat = (point.lat * PRECISION).round() as i64;
            let lng = (point.lng * PRECISION).round() as i64;
            encode_value(lat - prev_lat, &mut out);
            encode_value(lng - prev_lng, &mut out);
            prev_lat = lat;
            prev_lng = lng;
        }

        out
    }
}

/// Decode one zigzag-delta value starting at `offset`.
///
/// Returns the signed delta and the offset past the value.
fn decode_value(bytes: &[u8], mut offset: usize) -> Result<(i64, usize), MalformedPathError> {
    let mut result: u32 = 0;
    let mut shift = 0;

    loop {
        let Some(&byte) = bytes.get(offset) else {
            return Err(MalformedPathError::Truncated(offset));
        };
        if !(63..=127).contains(&byte) {
            return Err(MalformedPathError::InvalidByte { byte, offset });
        }
        if shift >= 32 {
            return Err(MalformedPathError::ChunkOverflow(offset));
        }

        let chunk = (byte - 63) as u32;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        offset += 1;

        if chunk & CHUNK_CONT == 0 {
            break;
        }
    }

    // Zigzag: LSB is the sign bit.
    let value = if result & 1 != 0 {
        !(result >> 1) as i32
    } else {
        (result >> 1) as i32
    };

    Ok((value as i64, offset))
}

/// Encode one signed delta as 5-bit chunks onto `out`.
fn encode_value(value: i64, out: &mut String) {
    let mut v = ((value << 1) ^ (value >> 63)) as u64;
    loop {
        let mut chunk = (v & 0x1f) as u32;
        v >>= 5;
        if v != 0 {
            chunk |= CHUNK_CONT;
        }
        out.push(char::from_u32(chunk + 63).unwrap_or('?'));
        if v == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference sequence from the Google polyline format documentation.
    const REFERENCE_ENCODED: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn reference_points() -> Vec<LatLng> {
        vec![
            LatLng::new(38.5, -120.2),
            LatLng::new(40.7, -120.95),
            LatLng::new(43.252, -126.453),
        ]
    }

    #[test]
    fn test_decode_reference() {
        let polyline = Polyline::decode(REFERENCE_ENCODED).unwrap();
        let points = polyline.points();
        assert_eq!(points.len(), 3);
        for (got, want) in points.iter().zip(reference_points()) {
            assert!((got.lat - want.lat).abs() < 1e-5);
            assert!((got.lng - want.lng).abs() < 1e-5);
        }
    }

    #[test]
    fn test_encode_reference() {
        let polyline = Polyline::new(reference_points());
        assert_eq!(polyline.encode(), REFERENCE_ENCODED);
    }

    #[test]
    fn test_round_trip() {
        let points = vec![
            LatLng::new(36.1263781, -115.1658180),
            LatLng::new(36.1023654, -115.1688720),
            LatLng::new(-33.8675, 151.207),
            LatLng::new(0.0, 0.0),
        ];
        let encoded = Polyline::new(points.clone()).encode();
        let decoded = Polyline::decode(&encoded).unwrap();
        for (got, want) in decoded.points().iter().zip(&points) {
            assert!((got.lat - want.lat).abs() < 1e-5, "lat drifted: {:?}", got);
            assert!((got.lng - want.lng).abs() < 1e-5, "lng drifted: {:?}", got);
        }
    }

    #[test]
    fn test_encode_of_decode_is_identity() {
        let decoded = Polyline::decode(REFERENCE_ENCODED).unwrap();
        assert_eq!(decoded.encode(), REFERENCE_ENCODED);
    }

    #[test]
    fn test_empty() {
        let polyline = Polyline::decode("").unwrap();
        assert!(polyline.points().is_empty());
        assert_eq!(Polyline::new(vec![]).encode(), "");
    }

    #[test]
    fn test_truncated_input() {
        // A lone continuation chunk with no terminator.
        let err = Polyline::decode("_").unwrap_err();
        assert!(matches!(err, MalformedPathError::Truncated(_)));
    }

    #[test]
    fn test_odd_value_count() {
        // Valid latitude value, then nothing for the longitude.
        let mut encoded = String::new();
        encode_value(3850000, &mut encoded);
        let err = Polyline::decode(&encoded).unwrap_err();
        assert!(matches!(err, MalformedPathError::Truncated(_)));
    }

    #[test]
    fn test_invalid_byte() {
        let err = Polyline::decode("\u{1}").unwrap_err();
        assert!(matches!(err, MalformedPathError::InvalidByte { .. }));
    }

    #[test]
    fn test_chunk_overflow() {
        // Eight continuation chunks push shift past 32 bits.
        let overlong = "________";
        let err = Polyline::decode(overlong).unwrap_err();
        assert!(matches!(err, MalformedPathError::ChunkOverflow(_)));
    }
}
