use image::GrayImage;

use crate::TransformError;

/// Float image in CHW layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self, TransformError> {
        let expected = channels * height * width;
        if data.len() != expected {
            return Err(TransformError::Shape {
                shape: [channels, height, width],
                expected,
                actual: data.len(),
            });
        }
        Ok(ImageTensor {
            channels,
            height,
            width,
            data,
        })
    }

    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        ImageTensor {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Scales 8-bit pixels to [0, 1] and repeats them over `channels`.
    pub fn from_luma(image: &GrayImage, channels: usize) -> Self {
        let (width, height) = image.dimensions();
        let plane: Vec<f32> = image.as_raw().iter().map(|&p| p as f32 / 255.0).collect();
        let mut data = Vec::with_capacity(plane.len() * channels);
        for _ in 0..channels {
            data.extend_from_slice(&plane);
        }
        ImageTensor {
            channels,
            height: height as usize,
            width: width as usize,
            data,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn index(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }

    #[inline]
    pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(c, y, x)]
    }

    pub fn plane(&self, c: usize) -> &[f32] {
        let size = self.height * self.width;
        &self.data[c * size..(c + 1) * size]
    }
}
