use std::path::Path;

use image::{imageops, imageops::FilterType, GrayImage};

use crate::{ImageTensor, TransformError};

/// How a source image was fitted into the square canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_left: u32,
    pub pad_top: u32,
}

impl Letterbox {
    /// Maps `[x1, y1, x2, y2]` from source pixels onto the canvas.
    pub fn map_corners(&self, corners: [f32; 4]) -> [f32; 4] {
        let [x1, y1, x2, y2] = corners;
        let left = self.pad_left as f32;
        let top = self.pad_top as f32;
        [
            x1 * self.scale + left,
            y1 * self.scale + top,
            x2 * self.scale + left,
            y2 * self.scale + top,
        ]
    }
}

/// Reads a radiograph as a 3-channel `imsize x imsize` tensor in [0, 1].
///
/// The longer side is resized to `imsize` keeping the aspect ratio and the
/// rest is padded black, centered.
pub fn read_xray(path: &Path, imsize: u32) -> Result<(ImageTensor, Letterbox), TransformError> {
    if imsize == 0 {
        return Err(TransformError::ZeroImageSize);
    }
    let gray = image::open(path)
        .map_err(|source| TransformError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();
    let (canvas, letterbox) = letterbox(&gray, imsize);
    Ok((ImageTensor::from_luma(&canvas, 3), letterbox))
}

fn letterbox(gray: &GrayImage, imsize: u32) -> (GrayImage, Letterbox) {
    let (width, height) = gray.dimensions();
    let scale = imsize as f32 / width.max(height).max(1) as f32;
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, imsize);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, imsize);

    let resized = imageops::resize(gray, new_width, new_height, FilterType::Triangle);
    let pad_left = (imsize - new_width) / 2;
    let pad_top = (imsize - new_height) / 2;

    let mut canvas = GrayImage::new(imsize, imsize);
    imageops::overlay(&mut canvas, &resized, pad_left as i64, pad_top as i64);
    (
        canvas,
        Letterbox {
            scale,
            pad_left,
            pad_top,
        },
    )
}
