//! Face extraction service configuration

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// OpenVINO device string, e.g. "CPU"
    pub device: String,
    /// Detector input resolution [width, height]
    pub det_size: [u32; 2],
    /// Minimum detection confidence
    pub confidence_threshold: f32,
    /// Embedding vector length the embedder model must produce
    pub embedding_dim: usize,
}

impl InferenceConfig {
    pub fn det_size(&self) -> (u32, u32) {
        (self.det_size[0], self.det_size[1])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Local directory where weight artifacts are cached
    pub dir: PathBuf,
    /// Detector artifact file name within `dir`
    pub detector: String,
    /// Embedder artifact file name within `dir`
    pub embedder: String,
    /// Download locations tried in order when the detector artifact is missing
    pub detector_urls: Vec<String>,
    /// Download locations tried in order when the embedder artifact is missing
    pub embedder_urls: Vec<String>,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { port: 8000 },
            inference: InferenceConfig {
                device: "CPU".to_string(),
                det_size: [640, 640],
                confidence_threshold: 0.5,
                embedding_dim: 512,
            },
            models: ModelsConfig {
                dir: PathBuf::from("models"),
                detector: "det_10g.onnx".to_string(),
                embedder: "w600k_r50.onnx".to_string(),
                detector_urls: vec![
                    "https://huggingface.co/immich-app/buffalo_l/resolve/main/detection/model.onnx".to_string(),
                    "https://github.com/deepinsight/insightface/releases/download/v0.7/scrfd_10g_bnkps.onnx".to_string(),
                ],
                embedder_urls: vec![
                    "https://huggingface.co/immich-app/buffalo_l/resolve/main/recognition/model.onnx".to_string(),
                    "https://huggingface.co/maze/faceX/resolve/main/w600k_r50.onnx".to_string(),
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_buffalo_l() {
        let config = Config::default();
        assert_eq!(config.inference.det_size(), (640, 640));
        assert_eq!(config.inference.embedding_dim, 512);
        assert_eq!(config.models.detector, "det_10g.onnx");
        assert!(!config.models.detector_urls.is_empty());
    }

    #[test]
    fn config_parses_from_toml() {
        let raw = r#"
            [server]
            port = 9000

            [inference]
            device = "CPU"
            det_size = [320, 320]
            confidence_threshold = 0.4
            embedding_dim = 512

            [models]
            dir = "weights"
            detector = "det.onnx"
            embedder = "emb.onnx"
            detector_urls = ["http://localhost/det.onnx"]
            embedder_urls = []
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.inference.det_size(), (320, 320));
        assert_eq!(config.models.dir, PathBuf::from("weights"));
        assert!(config.models.embedder_urls.is_empty());
    }
}
