//! Request-path error taxonomy
//!
//! Every per-request failure is recovered at the REST boundary and surfaced
//! as a body-level error inside an HTTP 200 response. The `Display` output of
//! each variant is the exact string written to the wire, so the decode
//! message must stay byte-identical across releases.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The uploaded bytes do not form a decodable image.
    #[error("Invalid image data")]
    Decode(#[source] image::ImageError),

    /// The detection/embedding pass failed; carries the runtime's own message.
    #[error("{0}")]
    Inference(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_renders_wire_message() {
        let err = image::load_from_memory(b"not an image").unwrap_err();
        assert_eq!(ExtractError::Decode(err).to_string(), "Invalid image data");
    }

    #[test]
    fn inference_error_passes_text_through() {
        let err = ExtractError::Inference("tensor shape mismatch".to_string());
        assert_eq!(err.to_string(), "tensor shape mismatch");
    }
}
