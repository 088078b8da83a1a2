//! Comma-separated text encoding used for vectors at rest.

use crate::types::VectorError;

/// Encode a vector as comma-joined decimals. The empty vector encodes to "".
pub fn encode(vector: &[f32]) -> String {
    vector
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a comma-joined vector. "" decodes to the empty vector.
pub fn decode(encoded: &str) -> Result<Vec<f32>, VectorError> {
    if encoded.trim().is_empty() {
        return Ok(Vec::new());
    }

    encoded
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f32>()
                .map_err(|_| VectorError::Decode(part.to_string()))
        })
        .collect()
}

/// Absent stays absent.
pub fn decode_opt(encoded: Option<&str>) -> Result<Option<Vec<f32>>, VectorError> {
    encoded.map(decode).transpose()
}
