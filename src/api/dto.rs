//! REST API wire types
//!
//! The extraction response is single-shaped: errors are reported inside the
//! body next to an empty face list, never as a distinct HTTP status. Existing
//! callers depend on that shape.

use serde::Serialize;

use crate::engine::Face;

/// Payload of `GET /`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            service: "pis-ai",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FaceDto {
    pub embedding: Vec<f32>,
    pub bbox: [i32; 4],
    pub det_score: f32,
}

impl From<Face> for FaceDto {
    fn from(face: Face) -> Self {
        Self {
            embedding: face.embedding,
            bbox: face.bbox,
            det_score: face.det_score,
        }
    }
}

/// Payload of `POST /extract`, success and failure alike.
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub faces: Vec<FaceDto>,
}

impl ExtractResponse {
    pub fn success(faces: Vec<Face>) -> Self {
        Self {
            error: None,
            faces: faces.into_iter().map(Into::into).collect(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            faces: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_payload_is_fixed() {
        let json = serde_json::to_value(StatusResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok", "service": "pis-ai"}));
    }

    #[test]
    fn success_response_has_no_error_key() {
        let faces = vec![Face {
            embedding: vec![0.1; 512],
            bbox: [5, 10, 50, 60],
            det_score: 0.93,
        }];
        let json = serde_json::to_value(ExtractResponse::success(faces)).unwrap();

        assert!(json.get("error").is_none());
        let faces = json["faces"].as_array().unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0]["embedding"].as_array().unwrap().len(), 512);
        assert_eq!(faces[0]["bbox"], serde_json::json!([5, 10, 50, 60]));
    }

    #[test]
    fn empty_success_is_distinct_from_failure() {
        let success = serde_json::to_value(ExtractResponse::success(Vec::new())).unwrap();
        assert_eq!(success, serde_json::json!({"faces": []}));

        let failure = serde_json::to_value(ExtractResponse::failure("Invalid image data")).unwrap();
        assert_eq!(
            failure,
            serde_json::json!({"error": "Invalid image data", "faces": []})
        );
    }

    #[test]
    fn identical_faces_serialize_identically() {
        let face = || Face {
            embedding: vec![0.5; 512],
            bbox: [1, 2, 3, 4],
            det_score: 0.77,
        };
        let a = serde_json::to_string(&ExtractResponse::success(vec![face()])).unwrap();
        let b = serde_json::to_string(&ExtractResponse::success(vec![face()])).unwrap();
        assert_eq!(a, b);
    }
}
