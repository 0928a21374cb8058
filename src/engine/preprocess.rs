//! Image decoding and tensor preparation for the face models

use image::{imageops, DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;

/// Input resolution of the ArcFace embedder (fixed by the model)
pub const EMBEDDER_INPUT_SIZE: (u32, u32) = (112, 112);

/// Decode an encoded image (JPEG/PNG/..., format auto-detected) and apply
/// any EXIF orientation so downstream coordinates refer to the upright image.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, image::ImageError> {
    let image = image::load_from_memory(data)?;
    Ok(apply_orientation(image, exif_orientation(data)))
}

/// Orientation tag from the container's EXIF block, 1 (upright) if absent.
fn exif_orientation(data: &[u8]) -> u8 {
    let mut cursor = std::io::Cursor::new(data);
    match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(meta) => meta
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1) as u8,
        Err(_) => 1,
    }
}

/// Undo the rotation/mirroring encoded by an EXIF orientation value.
/// Phone cameras routinely store rotated pixels plus an orientation tag.
fn apply_orientation(image: DynamicImage, orientation: u8) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Aspect-preserving resize onto a fixed canvas, plus the mapping back to
/// source pixel coordinates for detection post-processing.
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn new(source: (u32, u32), target: (u32, u32)) -> Self {
        let (src_w, src_h) = source;
        let (dst_w, dst_h) = target;

        let scale = f32::min(dst_w as f32 / src_w as f32, dst_h as f32 / src_h as f32);
        let fit_w = (src_w as f32 * scale) as u32;
        let fit_h = (src_h as f32 * scale) as u32;

        Self {
            scale,
            pad_x: (dst_w - fit_w) / 2,
            pad_y: (dst_h - fit_h) / 2,
            source_width: src_w,
            source_height: src_h,
        }
    }

    /// Map a canvas coordinate back into source image space.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Letterbox the image onto the detector canvas and pack it as an NCHW
/// tensor. Returns the tensor together with the coordinate mapping.
pub fn detection_tensor(image: &DynamicImage, target: (u32, u32)) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::new(image.dimensions(), target);

    let fit_w = (image.width() as f32 * letterbox.scale) as u32;
    let fit_h = (image.height() as f32 * letterbox.scale) as u32;
    let resized = image
        .resize_exact(fit_w, fit_h, imageops::FilterType::Lanczos3)
        .to_rgb8();

    let mut canvas: RgbImage = ImageBuffer::from_pixel(target.0, target.1, Rgb([0u8, 0, 0]));
    imageops::replace(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    (nchw_bgr(&canvas), letterbox)
}

/// Resize an aligned face crop to the embedder input and pack it as NCHW.
pub fn embedding_tensor(face: &DynamicImage) -> Array4<f32> {
    let (w, h) = EMBEDDER_INPUT_SIZE;
    let resized = face
        .resize_exact(w, h, imageops::FilterType::Lanczos3)
        .to_rgb8();
    nchw_bgr(&resized)
}

/// Pack an RGB image as a 1xCxHxW tensor in BGR channel order, scaled to
/// [-1, 1]. The InsightFace models were exported with cv2-style BGR input
/// and (x - 127.5) / 128 normalization.
fn nchw_bgr(rgb: &RgbImage) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
        // channel 0 = blue = RGB index 2, and so on
        let value = rgb.get_pixel(x as u32, y as u32)[2 - c] as f32;
        (value - 127.5) / 128.0
    })
}

/// InsightFace reference landmark positions on the 112x112 aligned crop:
/// eyes, nose tip, mouth corners.
const ALIGNED_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Warp the detected face into the canonical 112x112 crop the embedder
/// expects, using the detector's 5-point landmarks.
pub fn align_face(image: &DynamicImage, landmarks: &[(f32, f32); 5]) -> DynamicImage {
    let transform = similarity_transform(landmarks, &ALIGNED_LANDMARKS);
    warp_into(image, &transform, EMBEDDER_INPUT_SIZE.0, EMBEDDER_INPUT_SIZE.1)
}

/// Least-squares similarity transform (scale, rotation, translation) mapping
/// `src` onto `dst`, as a 2x3 matrix. Umeyama's closed-form solution with a
/// reflection guard on the 2x2 covariance SVD.
fn similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [[f32; 3]; 2] {
    let n = src.len() as f32;

    let mut src_mean = (0.0f32, 0.0f32);
    let mut dst_mean = (0.0f32, 0.0f32);
    for i in 0..src.len() {
        src_mean.0 += src[i].0;
        src_mean.1 += src[i].1;
        dst_mean.0 += dst[i].0;
        dst_mean.1 += dst[i].1;
    }
    src_mean = (src_mean.0 / n, src_mean.1 / n);
    dst_mean = (dst_mean.0 / n, dst_mean.1 / n);

    // Source variance and the dst'*src covariance matrix, both centered.
    let mut src_var = 0.0f32;
    let (mut cov_00, mut cov_01, mut cov_10, mut cov_11) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for i in 0..src.len() {
        let sx = src[i].0 - src_mean.0;
        let sy = src[i].1 - src_mean.1;
        let dx = dst[i].0 - dst_mean.0;
        let dy = dst[i].1 - dst_mean.1;

        src_var += sx * sx + sy * sy;
        cov_00 += dx * sx;
        cov_01 += dx * sy;
        cov_10 += dy * sx;
        cov_11 += dy * sy;
    }
    src_var /= n;
    cov_00 /= n;
    cov_01 /= n;
    cov_10 /= n;
    cov_11 /= n;

    // Closed-form SVD of the 2x2 covariance.
    let e = (cov_00 + cov_11) / 2.0;
    let f = (cov_00 - cov_11) / 2.0;
    let g = (cov_10 + cov_01) / 2.0;
    let h = (cov_10 - cov_01) / 2.0;

    let q = (e * e + h * h).sqrt();
    let r = (f * f + g * g).sqrt();
    let sv1 = q + r;
    let sv2 = (q - r).abs();

    let a1 = h.atan2(e);
    let a2 = g.atan2(f);
    let theta = (a2 - a1) / 2.0;
    let phi = (a2 + a1) / 2.0;

    let det = cov_00 * cov_11 - cov_01 * cov_10;

    // R = U * diag(1, sign(det)) * V^T, keeping the result a proper rotation.
    let (r00, r01, r10, r11) = if det >= 0.0 {
        let angle = phi - theta;
        (angle.cos(), -angle.sin(), angle.sin(), angle.cos())
    } else {
        let angle = phi + theta;
        (angle.cos(), angle.sin(), angle.sin(), -angle.cos())
    };

    let trace = if det >= 0.0 { sv1 + sv2 } else { sv1 - sv2 };
    let scale = if src_var > 1e-10 { trace / src_var } else { 1.0 };

    let tx = dst_mean.0 - scale * (r00 * src_mean.0 + r01 * src_mean.1);
    let ty = dst_mean.1 - scale * (r10 * src_mean.0 + r11 * src_mean.1);

    [
        [scale * r00, scale * r01, tx],
        [scale * r10, scale * r11, ty],
    ]
}

/// Backward-map an affine transform over the source image with bilinear
/// sampling. Pixels mapping outside the source stay black.
fn warp_into(image: &DynamicImage, m: &[[f32; 3]; 2], out_w: u32, out_h: u32) -> DynamicImage {
    let rgb = image.to_rgb8();
    let mut output: RgbImage = ImageBuffer::from_pixel(out_w, out_h, Rgb([0u8, 0, 0]));

    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let inv = [
        [m[1][1] / det, -m[0][1] / det],
        [-m[1][0] / det, m[0][0] / det],
    ];

    for y in 0..out_h {
        for x in 0..out_w {
            let dx = x as f32 - m[0][2];
            let dy = y as f32 - m[1][2];
            let src_x = inv[0][0] * dx + inv[0][1] * dy;
            let src_y = inv[1][0] * dx + inv[1][1] * dy;

            if src_x < 0.0
                || src_y < 0.0
                || src_x >= (rgb.width() - 1) as f32
                || src_y >= (rgb.height() - 1) as f32
            {
                continue;
            }

            let x0 = src_x as u32;
            let y0 = src_y as u32;
            let fx = src_x - x0 as f32;
            let fy = src_y - y0 as f32;

            let p00 = rgb.get_pixel(x0, y0);
            let p10 = rgb.get_pixel(x0 + 1, y0);
            let p01 = rgb.get_pixel(x0, y0 + 1);
            let p11 = rgb.get_pixel(x0 + 1, y0 + 1);

            let mut pixel = [0u8; 3];
            for c in 0..3 {
                let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
                    + p10[c] as f32 * fx * (1.0 - fy)
                    + p01[c] as f32 * (1.0 - fx) * fy
                    + p11[c] as f32 * fx * fy;
                pixel[c] = v.clamp(0.0, 255.0) as u8;
            }
            output.put_pixel(x, y, Rgb(pixel));
        }
    }

    DynamicImage::ImageRgb8(output)
}
