//! Extraction service
//!
//! One request, one linear pass: decode the uploaded bytes, hand the pixel
//! buffer to the model host, return the face list. All failures are
//! classified into the request-path taxonomy here.

use std::sync::Arc;

use crate::engine::{Face, FaceAnalyzer};
use crate::error::ExtractError;

pub struct ExtractService<M: FaceAnalyzer> {
    model: Arc<M>,
}

impl<M: FaceAnalyzer + 'static> ExtractService<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }

    /// Decode, detect and embed. The whole pass is CPU-bound and runs on the
    /// blocking pool; the request task stays responsive.
    pub async fn extract(&self, image_data: &[u8]) -> Result<Vec<Face>, ExtractError> {
        let data = image_data.to_vec();
        let model = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || {
            let image =
                crate::engine::preprocess::decode_image(&data).map_err(ExtractError::Decode)?;
            model
                .detect_and_embed(&image)
                .map_err(|e| ExtractError::Inference(e.to_string()))
        })
        .await
        .map_err(|e| ExtractError::Inference(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use image::{DynamicImage, ImageBuffer, Rgb};

    struct FixedAnalyzer {
        faces: usize,
    }

    impl FaceAnalyzer for FixedAnalyzer {
        fn detect_and_embed(&self, image: &DynamicImage) -> anyhow::Result<Vec<Face>> {
            let w = image.width() as i32;
            let h = image.height() as i32;
            Ok((0..self.faces)
                .map(|_| Face {
                    embedding: vec![0.25; 512],
                    bbox: [0, 0, w, h],
                    det_score: 0.98,
                })
                .collect())
        }
    }

    struct BrokenAnalyzer;

    impl FaceAnalyzer for BrokenAnalyzer {
        fn detect_and_embed(&self, _image: &DynamicImage) -> anyhow::Result<Vec<Face>> {
            bail!("backend resources exhausted")
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([64, 64, 64])));
        let mut buffer = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn valid_image_yields_faces() {
        let service = ExtractService::new(Arc::new(FixedAnalyzer { faces: 2 }));
        let faces = service.extract(&png_bytes(100, 80)).await.unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].embedding.len(), 512);
        assert_eq!(faces[0].bbox, [0, 0, 100, 80]);
    }

    #[tokio::test]
    async fn zero_faces_is_success() {
        let service = ExtractService::new(Arc::new(FixedAnalyzer { faces: 0 }));
        let faces = service.extract(&png_bytes(32, 32)).await.unwrap();
        assert!(faces.is_empty());
    }

    #[tokio::test]
    async fn garbage_bytes_classify_as_decode_error() {
        let service = ExtractService::new(Arc::new(FixedAnalyzer { faces: 1 }));
        let err = service.extract(b"definitely not an image").await.unwrap_err();
        assert!(matches!(err, ExtractError::Decode(_)));
        assert_eq!(err.to_string(), "Invalid image data");
    }

    #[tokio::test]
    async fn model_failure_surfaces_verbatim() {
        let service = ExtractService::new(Arc::new(BrokenAnalyzer));
        let err = service.extract(&png_bytes(16, 16)).await.unwrap_err();
        assert!(matches!(err, ExtractError::Inference(_)));
        assert_eq!(err.to_string(), "backend resources exhausted");
    }
}
