//! Content type detection from magic bytes

use serde::{Deserialize, Serialize};

/// A detected content type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedType {
    pub mime: String,
    pub extension: String,
}

/// Classify a byte buffer. Unrecognized formats yield `None`.
pub fn detect(bytes: &[u8]) -> Option<DetectedType> {
    infer::get(bytes).map(|kind| DetectedType {
        mime: kind.mime_type().to_string(),
        extension: kind.extension().to_string(),
    })
}
