//! Inference engine module
//!
//! OpenVINO-backed face detection and embedding: SCRFD detector plus ArcFace
//! embedder, loaded once at startup and shared read-only across requests.

pub mod detector;
pub mod embedder;
pub mod host;
pub mod preprocess;
pub mod weights;

pub use detector::FaceDetector;
pub use embedder::FaceEmbedder;
pub use host::{Face, FaceAnalyzer, ModelHost};
