use rand::Rng;

use crate::{ImageTensor, Transform};

/// Copies the `height x width` window starting at (`top`, `left`). Negative
/// offsets or windows larger than the image are filled with zeros.
fn crop(image: &ImageTensor, height: usize, width: usize, top: isize, left: isize) -> ImageTensor {
    let mut out = ImageTensor::zeros(image.channels(), height, width);
    for c in 0..image.channels() {
        for y in 0..height {
            let sy = top + y as isize;
            if sy < 0 || sy >= image.height() as isize {
                continue;
            }
            for x in 0..width {
                let sx = left + x as isize;
                if sx < 0 || sx >= image.width() as isize {
                    continue;
                }
                let value = image.get(c, sy as usize, sx as usize);
                let index = out.index(c, y, x);
                out.data_mut()[index] = value;
            }
        }
    }
    out
}

/// Shifts boxes into a crop window and clips them to it. Boxes left with no
/// area are removed.
fn crop_boxes(boxes: &mut Vec<[f32; 4]>, height: usize, width: usize, top: isize, left: isize) {
    let (top, left) = (top as f32, left as f32);
    clip_boxes(boxes, height, width, |[x1, y1, x2, y2]| [x1 - left, y1 - top, x2 - left, y2 - top]);
}

fn clip_boxes(boxes: &mut Vec<[f32; 4]>, height: usize, width: usize, map: impl Fn([f32; 4]) -> [f32; 4]) {
    let (height, width) = (height as f32, width as f32);
    *boxes = boxes
        .iter()
        .map(|&b| {
            let [x1, y1, x2, y2] = map(b);
            [x1.clamp(0.0, width), y1.clamp(0.0, height), x2.clamp(0.0, width), y2.clamp(0.0, height)]
        })
        .filter(|[x1, y1, x2, y2]| x2 > x1 && y2 > y1)
        .collect();
}

fn centered_offset(size: usize, target: usize) -> isize {
    (size as isize - target as isize) / 2
}

fn uniform<R: Rng>(rng: &mut R, low: f32, high: f32) -> f32 {
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomCrop {
    pub height: usize,
    pub width: usize,
}

impl RandomCrop {
    pub fn new(size: usize) -> Self {
        RandomCrop {
            height: size,
            width: size,
        }
    }
}

impl RandomCrop {
    fn offsets(&self, image: &ImageTensor) -> (isize, isize) {
        let mut rng = rand::thread_rng();
        let top = if image.height() > self.height {
            rng.gen_range(0..=image.height() - self.height) as isize
        } else {
            centered_offset(image.height(), self.height)
        };
        let left = if image.width() > self.width {
            rng.gen_range(0..=image.width() - self.width) as isize
        } else {
            centered_offset(image.width(), self.width)
        };
        (top, left)
    }
}

impl Transform for RandomCrop {
    fn name(&self) -> &'static str {
        "RandomCrop"
    }

    fn apply(&self, image: ImageTensor) -> ImageTensor {
        let (top, left) = self.offsets(&image);
        crop(&image, self.height, self.width, top, left)
    }

    fn apply_with_boxes(&self, image: ImageTensor, boxes: &mut Vec<[f32; 4]>) -> ImageTensor {
        let (top, left) = self.offsets(&image);
        crop_boxes(boxes, self.height, self.width, top, left);
        crop(&image, self.height, self.width, top, left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterCrop {
    pub height: usize,
    pub width: usize,
}

impl CenterCrop {
    pub fn new(size: usize) -> Self {
        CenterCrop {
            height: size,
            width: size,
        }
    }
}

impl Transform for CenterCrop {
    fn name(&self) -> &'static str {
        "CenterCrop"
    }

    fn apply(&self, image: ImageTensor) -> ImageTensor {
        let top = centered_offset(image.height(), self.height);
        let left = centered_offset(image.width(), self.width);
        crop(&image, self.height, self.width, top, left)
    }

    fn apply_with_boxes(&self, image: ImageTensor, boxes: &mut Vec<[f32; 4]>) -> ImageTensor {
        let top = centered_offset(image.height(), self.height);
        let left = centered_offset(image.width(), self.width);
        crop_boxes(boxes, self.height, self.width, top, left);
        crop(&image, self.height, self.width, top, left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomHorizontalFlip {
    pub probability: f32,
}

impl RandomHorizontalFlip {
    pub fn new(probability: f32) -> Self {
        RandomHorizontalFlip {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn flip(mut image: ImageTensor) -> ImageTensor {
        let width = image.width();
        let rows = image.channels() * image.height();
        let data = image.data_mut();
        for row in 0..rows {
            data[row * width..(row + 1) * width].reverse();
        }
        image
    }

    pub fn flip_boxes(boxes: &mut [[f32; 4]], width: usize) {
        let width = width as f32;
        for b in boxes.iter_mut() {
            *b = [width - b[2], b[1], width - b[0], b[3]];
        }
    }

    fn should_flip(&self) -> bool {
        rand::thread_rng().gen::<f32>() < self.probability
    }
}

impl Transform for RandomHorizontalFlip {
    fn name(&self) -> &'static str {
        "RandomHorizontalFlip"
    }

    fn apply(&self, image: ImageTensor) -> ImageTensor {
        if self.should_flip() {
            Self::flip(image)
        } else {
            image
        }
    }

    fn apply_with_boxes(&self, image: ImageTensor, boxes: &mut Vec<[f32; 4]>) -> ImageTensor {
        if self.should_flip() {
            Self::flip_boxes(boxes, image.width());
            Self::flip(image)
        } else {
            image
        }
    }
}

/// Rotation, translation and isotropic scaling about the image center,
/// nearest-neighbour sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomAffine {
    pub degrees: f32,
    /// Maximum shift as a fraction of width and height.
    pub translate: [f32; 2],
    pub scale: [f32; 2],
}

impl RandomAffine {
    pub fn apply_with(image: &ImageTensor, degrees: f32, shift_x: f32, shift_y: f32, scale: f32) -> ImageTensor {
        let (height, width) = (image.height(), image.width());
        let mut out = ImageTensor::zeros(image.channels(), height, width);
        let (sin, cos) = degrees.to_radians().sin_cos();
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;
        let scale = if scale > 0.0 { scale } else { 1.0 };

        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx - shift_x;
                let dy = y as f32 - cy - shift_y;
                let sx = ((cos * dx + sin * dy) / scale + cx).round();
                let sy = ((-sin * dx + cos * dy) / scale + cy).round();
                if sx < 0.0 || sy < 0.0 || sx >= width as f32 || sy >= height as f32 {
                    continue;
                }
                for c in 0..image.channels() {
                    let value = image.get(c, sy as usize, sx as usize);
                    let index = out.index(c, y, x);
                    out.data_mut()[index] = value;
                }
            }
        }
        out
    }

    /// Forward map of `apply_with` for boxes: each box becomes the
    /// axis-aligned hull of its moved corners, clipped to the image.
    pub fn map_boxes(
        boxes: &mut Vec<[f32; 4]>,
        height: usize,
        width: usize,
        degrees: f32,
        shift_x: f32,
        shift_y: f32,
        scale: f32,
    ) {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let point = |x: f32, y: f32| {
            let (ux, uy) = (x - cx, y - cy);
            (
                cx + shift_x + scale * (cos * ux - sin * uy),
                cy + shift_y + scale * (sin * ux + cos * uy),
            )
        };
        clip_boxes(boxes, height, width, |[x1, y1, x2, y2]| {
            let corners = [point(x1, y1), point(x2, y1), point(x1, y2), point(x2, y2)];
            let xs = corners.iter().map(|c| c.0);
            let ys = corners.iter().map(|c| c.1);
            [
                xs.clone().fold(f32::INFINITY, f32::min),
                ys.clone().fold(f32::INFINITY, f32::min),
                xs.fold(f32::NEG_INFINITY, f32::max),
                ys.fold(f32::NEG_INFINITY, f32::max),
            ]
        });
    }

    fn sample(&self, image: &ImageTensor) -> (f32, f32, f32, f32) {
        let mut rng = rand::thread_rng();
        let degrees = uniform(&mut rng, -self.degrees.abs(), self.degrees.abs());
        let max_x = self.translate[0].abs() * image.width() as f32;
        let max_y = self.translate[1].abs() * image.height() as f32;
        let shift_x = uniform(&mut rng, -max_x, max_x).round();
        let shift_y = uniform(&mut rng, -max_y, max_y).round();
        let scale = uniform(&mut rng, self.scale[0], self.scale[1]);
        (degrees, shift_x, shift_y, scale)
    }
}

impl Transform for RandomAffine {
    fn name(&self) -> &'static str {
        "RandomAffine"
    }

    fn apply(&self, image: ImageTensor) -> ImageTensor {
        let (degrees, shift_x, shift_y, scale) = self.sample(&image);
        Self::apply_with(&image, degrees, shift_x, shift_y, scale)
    }

    fn apply_with_boxes(&self, image: ImageTensor, boxes: &mut Vec<[f32; 4]>) -> ImageTensor {
        let (degrees, shift_x, shift_y, scale) = self.sample(&image);
        Self::map_boxes(boxes, image.height(), image.width(), degrees, shift_x, shift_y, scale);
        Self::apply_with(&image, degrees, shift_x, shift_y, scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorJitter {
    pub brightness: f32,
    pub contrast: f32,
}

impl ColorJitter {
    pub fn apply_with(mut image: ImageTensor, brightness: f32, contrast: f32) -> ImageTensor {
        for v in image.data_mut().iter_mut() {
            *v = (*v * brightness).clamp(0.0, 1.0);
        }
        // radiographs are replicated gray, so the first plane is the grayscale mean
        let plane = image.plane(0);
        let mean = plane.iter().sum::<f32>() / plane.len().max(1) as f32;
        for v in image.data_mut().iter_mut() {
            *v = ((*v - mean) * contrast + mean).clamp(0.0, 1.0);
        }
        image
    }
}

impl Transform for ColorJitter {
    fn name(&self) -> &'static str {
        "ColorJitter"
    }

    fn apply(&self, image: ImageTensor) -> ImageTensor {
        let mut rng = rand::thread_rng();
        let brightness = uniform(&mut rng, (1.0 - self.brightness).max(0.0), 1.0 + self.brightness);
        let contrast = uniform(&mut rng, (1.0 - self.contrast).max(0.0), 1.0 + self.contrast);
        Self::apply_with(image, brightness, contrast)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    pub fn imagenet() -> Self {
        Normalize {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    pub fn half() -> Self {
        Normalize {
            mean: [0.5; 3],
            std: [0.5; 3],
        }
    }
}

impl Transform for Normalize {
    fn name(&self) -> &'static str {
        "Normalize"
    }

    fn apply(&self, mut image: ImageTensor) -> ImageTensor {
        let size = image.height() * image.width();
        for (c, plane) in image.data_mut().chunks_mut(size.max(1)).enumerate() {
            let (mean, std) = (self.mean[c % 3], self.std[c % 3]);
            for v in plane.iter_mut() {
                *v = (*v - mean) / std;
            }
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(height: usize, width: usize) -> ImageTensor {
        let data = (0..3 * height * width).map(|i| (i % (height * width)) as f32).collect();
        ImageTensor::new(3, height, width, data).unwrap()
    }

    #[test]
    fn center_crop_takes_the_middle() {
        let cropped = CenterCrop::new(2).apply(ramp(4, 4));
        assert_eq!(cropped.shape(), [3, 2, 2]);
        assert_eq!(cropped.plane(0), &[5.0, 6.0, 9.0, 10.0]);
    }

    #[test]
    fn crops_larger_than_the_image_pad_with_zeros() {
        let cropped = CenterCrop::new(4).apply(ramp(2, 2));
        assert_eq!(cropped.shape(), [3, 4, 4]);
        assert_eq!(cropped.get(0, 0, 0), 0.0);
        assert_eq!(cropped.get(0, 1, 1), 0.0);
        assert_eq!(cropped.get(0, 2, 2), 3.0);

        let cropped = RandomCrop::new(4).apply(ramp(2, 2));
        assert_eq!(cropped.shape(), [3, 4, 4]);
    }

    #[test]
    fn random_crop_stays_inside_the_image() {
        for _ in 0..20 {
            let cropped = RandomCrop::new(3).apply(ramp(5, 5));
            assert_eq!(cropped.shape(), [3, 3, 3]);
            // consecutive pixels of a row stay consecutive
            assert_eq!(cropped.get(0, 0, 1) - cropped.get(0, 0, 0), 1.0);
        }
    }

    #[test]
    fn flip_probability_extremes() {
        let image = ramp(2, 3);
        assert_eq!(RandomHorizontalFlip::new(0.0).apply(image.clone()), image);

        let flipped = RandomHorizontalFlip::new(1.0).apply(image.clone());
        assert_eq!(flipped.plane(0), &[2.0, 1.0, 0.0, 5.0, 4.0, 3.0]);
        assert_eq!(RandomHorizontalFlip::flip(flipped), image);
    }

    #[test]
    fn center_crop_shifts_and_clips_boxes() {
        let mut boxes = vec![[1.0, 3.0, 3.0, 4.0], [0.0, 0.0, 1.0, 1.0]];
        let cropped = CenterCrop::new(6).apply_with_boxes(ImageTensor::zeros(3, 8, 8), &mut boxes);
        assert_eq!(cropped.shape(), [3, 6, 6]);
        // the second box falls outside the window
        assert_eq!(boxes, vec![[0.0, 2.0, 2.0, 3.0]]);
    }

    #[test]
    fn random_crop_keeps_boxes_on_the_same_pixels() {
        // a single bright pixel at (y 3, x 4) inside a box around it
        let mut image = ImageTensor::zeros(1, 8, 8);
        let index = image.index(0, 3, 4);
        image.data_mut()[index] = 1.0;
        for _ in 0..20 {
            let mut boxes = vec![[4.0, 3.0, 5.0, 4.0]];
            let cropped = RandomCrop::new(6).apply_with_boxes(image.clone(), &mut boxes);
            if let [[x1, y1, _, _]] = boxes.as_slice() {
                assert_eq!(cropped.get(0, *y1 as usize, *x1 as usize), 1.0);
            }
        }
    }

    #[test]
    fn flip_mirrors_boxes() {
        let mut boxes = vec![[1.0, 0.0, 3.0, 2.0]];
        let flipped = RandomHorizontalFlip::new(1.0).apply_with_boxes(ramp(2, 4), &mut boxes);
        assert_eq!(flipped.plane(0)[0], 3.0);
        assert_eq!(boxes, vec![[1.0, 0.0, 3.0, 2.0]]);

        let mut boxes = vec![[0.0, 0.0, 1.0, 1.0]];
        RandomHorizontalFlip::new(1.0).apply_with_boxes(ramp(2, 4), &mut boxes);
        assert_eq!(boxes, vec![[3.0, 0.0, 4.0, 1.0]]);

        let mut boxes = vec![[0.0, 0.0, 1.0, 1.0]];
        RandomHorizontalFlip::new(0.0).apply_with_boxes(ramp(2, 4), &mut boxes);
        assert_eq!(boxes, vec![[0.0, 0.0, 1.0, 1.0]]);
    }

    #[test]
    fn affine_boxes_follow_translation() {
        let mut boxes = vec![[0.0, 0.0, 2.0, 1.0]];
        RandomAffine::map_boxes(&mut boxes, 3, 3, 0.0, 1.0, 0.0, 1.0);
        assert_eq!(boxes, vec![[1.0, 0.0, 3.0, 1.0]]);

        let mut boxes = vec![[1.0, 1.0, 2.0, 2.0]];
        RandomAffine::map_boxes(&mut boxes, 4, 4, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(boxes, vec![[1.0, 1.0, 2.0, 2.0]]);
    }

    #[test]
    fn affine_boxes_follow_a_quarter_turn() {
        // 90 degrees about the center of a 4x4 image
        let mut boxes = vec![[0.0, 0.0, 2.0, 1.0]];
        RandomAffine::map_boxes(&mut boxes, 4, 4, 90.0, 0.0, 0.0, 1.0);
        let [x1, y1, x2, y2] = boxes[0];
        assert!((x1 - 3.0).abs() < 1e-4 && (x2 - 4.0).abs() < 1e-4);
        assert!(y1.abs() < 1e-4 && (y2 - 2.0).abs() < 1e-4);
    }

    #[test]
    fn photometric_ops_leave_boxes_alone() {
        let mut boxes = vec![[1.0, 1.0, 2.0, 2.0]];
        Normalize::half().apply_with_boxes(ImageTensor::zeros(3, 4, 4), &mut boxes);
        ColorJitter {
            brightness: 0.5,
            contrast: 0.5,
        }
        .apply_with_boxes(ImageTensor::zeros(3, 4, 4), &mut boxes);
        assert_eq!(boxes, vec![[1.0, 1.0, 2.0, 2.0]]);
    }

    #[test]
    fn identity_affine_keeps_pixels() {
        let image = ramp(5, 5);
        assert_eq!(RandomAffine::apply_with(&image, 0.0, 0.0, 0.0, 1.0), image);
    }

    #[test]
    fn affine_translation_shifts_content() {
        let image = ramp(3, 3);
        let shifted = RandomAffine::apply_with(&image, 0.0, 1.0, 0.0, 1.0);
        assert_eq!(shifted.plane(0), &[0.0, 0.0, 1.0, 0.0, 3.0, 4.0, 0.0, 6.0, 7.0]);
    }

    #[test]
    fn color_jitter_identity_and_clamping() {
        let image = ImageTensor::new(1, 1, 2, vec![0.25, 0.75]).unwrap();
        assert_eq!(ColorJitter::apply_with(image.clone(), 1.0, 1.0), image);

        let bright = ColorJitter::apply_with(image, 4.0, 1.0);
        assert!(bright.data().iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn normalize_half_maps_unit_range() {
        let image = ImageTensor::new(3, 1, 2, vec![0.0, 1.0, 0.5, 0.5, 1.0, 0.0]).unwrap();
        let normalized = Normalize::half().apply(image);
        assert_eq!(normalized.data(), &[-1.0, 1.0, 0.0, 0.0, 1.0, -1.0]);
    }
}
