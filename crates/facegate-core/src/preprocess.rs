//! Image preprocessing for the verification pipeline — decode, intensity
//! conversion, global histogram equalization, and face-crop extraction.

use image::ImageError;
use thiserror::Error;

use crate::types::FaceBox;

/// Canonical face-crop edge length fed to the classifier.
pub const CANONICAL_FACE_SIZE: usize = 200;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),
    #[error("image has zero dimensions")]
    EmptyImage,
}

/// A single-channel intensity image.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    /// Row-major pixel data, `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    /// Decode an encoded image (PNG, JPEG, ...) into a grayscale frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, PreprocessError> {
        let gray = image::load_from_memory(bytes)?.into_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(PreprocessError::EmptyImage);
        }
        Ok(Self {
            data: gray.into_raw(),
            width,
            height,
        })
    }

    /// Apply global histogram equalization in place, spreading the
    /// intensity distribution across the full 0–255 range to normalize
    /// lighting before detection.
    pub fn equalize(&mut self) {
        equalize_hist(&mut self.data);
    }

    /// Extract the face region and resize it to the canonical
    /// `CANONICAL_FACE_SIZE` square. The box is clamped to the frame
    /// bounds first; detector boxes may extend slightly past the edges.
    pub fn crop_face(&self, face: &FaceBox) -> Vec<u8> {
        let w = self.width as f32;
        let h = self.height as f32;

        let x0 = face.x.clamp(0.0, w - 1.0);
        let y0 = face.y.clamp(0.0, h - 1.0);
        let x1 = (face.x + face.width).clamp(x0 + 1.0, w);
        let y1 = (face.y + face.height).clamp(y0 + 1.0, h);

        let crop_x = x0 as usize;
        let crop_y = y0 as usize;
        let crop_w = ((x1 - x0) as usize).max(1);
        let crop_h = ((y1 - y0) as usize).max(1);

        let mut region = vec![0u8; crop_w * crop_h];
        for row in 0..crop_h {
            let src = (crop_y + row) * self.width as usize + crop_x;
            region[row * crop_w..(row + 1) * crop_w]
                .copy_from_slice(&self.data[src..src + crop_w]);
        }

        resize_bilinear(&region, crop_w, crop_h, CANONICAL_FACE_SIZE, CANONICAL_FACE_SIZE)
    }
}

/// Global histogram equalization over an 8-bit intensity buffer.
///
/// Builds the cumulative distribution and remaps each pixel to
/// `(cdf(p) - cdf_min) / (n - cdf_min) * 255`, the classic transfer
/// function. A constant image is left unchanged.
pub fn equalize_hist(pixels: &mut [u8]) {
    if pixels.is_empty() {
        return;
    }

    let mut hist = [0u32; 256];
    for &p in pixels.iter() {
        hist[p as usize] += 1;
    }

    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf
        .iter()
        .copied()
        .find(|&v| v > 0)
        .unwrap_or(0);
    let denom = pixels.len() as u32 - cdf_min;
    if denom == 0 {
        // Single-intensity image: nothing to spread.
        return;
    }

    let mut lut = [0u8; 256];
    for i in 0..256 {
        // Bins below the first occupied one have cdf 0; saturate rather
        // than underflow (those LUT slots are never hit anyway).
        let num = cdf[i].saturating_sub(cdf_min) as f32;
        lut[i] = ((num / denom as f32) * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    for p in pixels.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Bilinear resize of a row-major grayscale buffer.
pub fn resize_bilinear(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let mut dst = vec![0u8; dst_w * dst_h];
    if src_w == 0 || src_h == 0 {
        return dst;
    }

    let scale_x = src_w as f32 / dst_w as f32;
    let scale_y = src_h as f32 / dst_h as f32;

    for y in 0..dst_h {
        let sy = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (sy.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = (sy - sy.floor()).clamp(0.0, 1.0);

        for x in 0..dst_w {
            let sx = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (sx.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = (sx - sx.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * src_w + x0] as f32;
            let tr = src[y0 * src_w + x1] as f32;
            let bl = src[y1 * src_w + x0] as f32;
            let br = src[y1 * src_w + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            dst[y * dst_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    dst
}
