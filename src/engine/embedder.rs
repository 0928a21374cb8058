//! ArcFace face embedder
//!
//! Runs an aligned 112x112 face crop through the recognition model and
//! returns the raw feature vector. The vector is not normalized here; callers
//! treat it as an opaque, L2-normalizable comparison vector.

use anyhow::{bail, Context, Result};
use image::DynamicImage;

use super::host::{read_output_f32, write_input_tensor, SafeCompiledModel};
use super::preprocess::{self, EMBEDDER_INPUT_SIZE};

pub struct FaceEmbedder {
    model: SafeCompiledModel,
    embedding_dim: usize,
}

impl FaceEmbedder {
    pub fn new(model: SafeCompiledModel, embedding_dim: usize) -> Self {
        Self {
            model,
            embedding_dim,
        }
    }

    /// Extract the embedding of an aligned face crop.
    pub fn embed(&self, aligned_face: &DynamicImage) -> Result<Vec<f32>> {
        let tensor = preprocess::embedding_tensor(aligned_face);

        let mut request = self
            .model
            .create_infer_request()
            .context("Failed to create embedder infer request")?;

        let (w, h) = EMBEDDER_INPUT_SIZE;
        write_input_tensor(&mut request, &tensor, &[1, 3, h as i64, w as i64])?;
        request.infer().context("Embedder inference failed")?;

        let embedding = read_output_f32(&request, 0)?;
        if embedding.len() != self.embedding_dim {
            bail!(
                "Embedder produced {} values, expected {}",
                embedding.len(),
                self.embedding_dim
            );
        }

        Ok(embedding)
    }
}
