//! Model host
//!
//! Owns the detector and embedder models for the lifetime of the process.
//! Both are compiled eagerly during `initialize`, before the server accepts
//! any traffic; an initialization failure aborts process bring-up.

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, InferRequest, Shape, Tensor};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{InferenceConfig, ModelsConfig};

use super::detector::{FaceBox, FaceDetector};
use super::embedder::FaceEmbedder;
use super::{preprocess, weights};

/// One detected face: the value object returned to the endpoint.
#[derive(Debug, Clone)]
pub struct Face {
    /// Raw (un-normalized) embedding vector, fixed dimensionality.
    pub embedding: Vec<f32>,
    /// [x1, y1, x2, y2] in source image pixels, x1 < x2, y1 < y2.
    pub bbox: [i32; 4],
    /// Detector confidence for this box.
    pub det_score: f32,
}

/// Seam between the endpoint and the inference runtime. The REST layer is
/// written against this trait so tests can substitute a mock host.
pub trait FaceAnalyzer: Send + Sync {
    fn detect_and_embed(&self, image: &DynamicImage) -> Result<Vec<Face>>;
}

/// OpenVINO `Core` held across model lifetimes. The C API object is
/// internally reference counted; the Rust binding just doesn't mark it Send.
pub struct SafeCore(Core);
unsafe impl Send for SafeCore {}
unsafe impl Sync for SafeCore {}

impl Deref for SafeCore {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Shareable compiled model. `create_infer_request` takes `&mut self` in the
/// Rust binding even though the underlying C++ call is const; requests are
/// created through the raw pointer instead.
#[derive(Clone)]
pub struct SafeCompiledModel(pub Arc<CompiledModel>);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl SafeCompiledModel {
    pub fn create_infer_request(&self) -> Result<InferRequest> {
        unsafe {
            let ptr = Arc::as_ptr(&self.0) as *mut CompiledModel;
            (*ptr).create_infer_request().map_err(|e| e.into())
        }
    }
}

/// Copy an NCHW array into the request's input tensor.
pub(crate) fn write_input_tensor(
    request: &mut InferRequest,
    data: &Array4<f32>,
    dims: &[i64],
) -> Result<()> {
    let shape = Shape::new(dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let values = data.as_slice().context("Input tensor is not contiguous")?;
    unsafe {
        let dst = tensor.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
        std::ptr::copy_nonoverlapping(values.as_ptr(), dst, values.len());
    }

    request.set_input_tensor(&tensor)?;
    Ok(())
}

/// Read an output tensor as a flat f32 vector.
pub(crate) fn read_output_f32(request: &InferRequest, index: usize) -> Result<Vec<f32>> {
    let tensor = request.get_output_tensor_by_index(index)?;
    let dims: Vec<i64> = tensor.get_shape()?.get_dimensions().to_vec();
    let len: i64 = dims.iter().product();

    let data = unsafe {
        let ptr = tensor.get_raw_data()?.as_ptr() as *const f32;
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    };
    Ok(data)
}

/// Holder of the initialized detection+embedding models.
pub struct ModelHost {
    detector: FaceDetector,
    embedder: FaceEmbedder,
    // The OpenVINO runtime's concurrent-invocation contract is not something
    // this crate relies on; inference is serialized explicitly.
    infer_lock: Mutex<()>,
    _core: SafeCore,
}

impl ModelHost {
    /// One-time setup: acquire weight artifacts (downloading on first run)
    /// and compile both models for the configured device. Slow (seconds);
    /// must complete before the server starts listening.
    pub async fn initialize(inference: &InferenceConfig, models: &ModelsConfig) -> Result<Self> {
        let detector_path =
            weights::ensure_model(&models.dir, &models.detector, &models.detector_urls).await?;
        let embedder_path =
            weights::ensure_model(&models.dir, &models.embedder, &models.embedder_urls).await?;

        let mut core = Core::new().context("Failed to create OpenVINO core")?;
        let detector_model = compile(&mut core, &detector_path, &inference.device)?;
        let embedder_model = compile(&mut core, &embedder_path, &inference.device)?;

        Ok(Self {
            detector: FaceDetector::new(
                detector_model,
                inference.det_size(),
                inference.confidence_threshold,
            ),
            embedder: FaceEmbedder::new(embedder_model, inference.embedding_dim),
            infer_lock: Mutex::new(()),
            _core: SafeCore(core),
        })
    }
}

fn compile(core: &mut Core, path: &Path, device: &str) -> Result<SafeCompiledModel> {
    let path_str = path.to_str().context("Model path is not valid UTF-8")?;
    info!("Compiling {} for {}", path.display(), device);
    let start = Instant::now();

    let model = core
        .read_model_from_file(path_str, "")
        .with_context(|| format!("Failed to read model {}", path.display()))?;
    let compiled = core
        .compile_model(&model, device.into())
        .with_context(|| format!("Failed to compile model {}", path.display()))?;

    info!("Compiled {} in {:?}", path.display(), start.elapsed());
    Ok(SafeCompiledModel(Arc::new(compiled)))
}

impl FaceAnalyzer for ModelHost {
    /// Detection and embedding in one pass. Runs on the caller's thread,
    /// serialized across concurrent requests.
    fn detect_and_embed(&self, image: &DynamicImage) -> Result<Vec<Face>> {
        let _serialized = self.infer_lock.lock();

        let detections = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(detections.len());

        for detection in &detections {
            let Some(bbox) = integral_bbox(detection) else {
                debug!("Discarding degenerate detection ({:.1} confidence)", detection.confidence);
                continue;
            };

            let aligned = preprocess::align_face(image, &detection.landmarks);
            let embedding = self.embedder.embed(&aligned)?;

            faces.push(Face {
                embedding,
                bbox,
                det_score: detection.confidence,
            });
        }

        Ok(faces)
    }
}

/// Truncate a detection box to integer pixel coordinates, rejecting boxes
/// that collapse to zero width or height.
fn integral_bbox(face: &FaceBox) -> Option<[i32; 4]> {
    let bbox = [
        face.x1 as i32,
        face.y1 as i32,
        face.x2 as i32,
        face.y2 as i32,
    ];
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        return None;
    }
    Some(bbox)
}
