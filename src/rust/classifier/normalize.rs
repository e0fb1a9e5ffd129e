use std::fmt;

use image::{DynamicImage, GrayImage, Luma};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::frame::DecodedImage;

/// Integer luminance weights (per mille) for R, G and B.
///
/// These are the weights of a zero-saturation colour matrix; the reference model
/// was trained on images desaturated with them.
pub const LUMA_WEIGHTS: [u32; 3] = [213, 715, 72];

/// Height × width × channels of a model input tensor (batch axis excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl TensorShape {
    pub fn square(size: usize, channels: usize) -> Self {
        Self {
            height: size,
            width: size,
            channels,
        }
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Preprocessing parameters fixed by the model's training configuration.
///
/// Pixel values are mapped with `(v - mean) / std`. The defaults describe the
/// reference model: 224×224, three identical gray channels, range [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub input_size: u32,
    pub channels: usize,
    pub mean: f32,
    pub std: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            channels: 3,
            mean: 0.0,
            std: 255.0,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.input_size == 0 {
            return Err(ClassifierError::Configuration("Input size must be greater than zero".into()));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(ClassifierError::Configuration(format!(
                "Unsupported channel count {} (expected 1 or 3)",
                self.channels
            )));
        }
        if !self.mean.is_finite() || !self.std.is_finite() || self.std == 0.0 {
            return Err(ClassifierError::Configuration(format!(
                "Invalid normalization parameters mean={} std={}",
                self.mean, self.std
            )));
        }
        Ok(())
    }

    pub fn output_shape(&self) -> TensorShape {
        TensorShape::square(self.input_size as usize, self.channels)
    }
}

/// A fixed-shape H×W×C tensor ready to be fed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array3<f32>,
}

impl NormalizedTensor {
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn zeros(shape: TensorShape) -> Self {
        Self {
            data: Array3::zeros(shape.dims()),
        }
    }

    pub fn shape(&self) -> TensorShape {
        let (height, width, channels) = self.data.dim();
        TensorShape {
            height,
            width,
            channels,
        }
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }
}

/// Turns decoded images into model input tensors.
///
/// Grayscale → bilinear resize → affine range mapping → channel expansion.
/// The transformation is pure: the same image always yields the same bits.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    config: PreprocessConfig,
}

impl ImageNormalizer {
    pub fn new(config: PreprocessConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn output_shape(&self) -> TensorShape {
        self.config.output_shape()
    }

    pub fn normalize(&self, image: &DecodedImage) -> Result<NormalizedTensor, ClassifierError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassifierError::Preprocessing(format!(
                "Degenerate image dimensions {}x{}",
                image.width(),
                image.height()
            )));
        }

        let gray = to_grayscale(image.as_dynamic());
        let size = self.config.input_size;
        let resized = if gray.dimensions() == (size, size) {
            gray
        } else {
            resize_bilinear(&gray, size, size)
        };

        let PreprocessConfig { mean, std, .. } = self.config;
        let shape = self.output_shape();
        let data = Array3::from_shape_fn(shape.dims(), |(y, x, _)| {
            (resized.get_pixel(x as u32, y as u32)[0] as f32 - mean) / std
        });
        Ok(NormalizedTensor { data })
    }
}

/// Resizes with 2×2 bilinear sampling at every scale factor.
///
/// Output pixel centres map back with `src = (dst + 0.5) * in / out - 0.5`,
/// clamped to the edges. Unlike a kernel widened by the scale factor, shrinking
/// never averages more than the four nearest source pixels.
pub fn resize_bilinear(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (in_w, in_h) = image.dimensions();
    if in_w == 0 || in_h == 0 {
        return GrayImage::new(width, height);
    }
    let scale_x = in_w as f32 / width as f32;
    let scale_y = in_h as f32 / height as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let sx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (in_w - 1) as f32);
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (in_h - 1) as f32);
        Luma([bilinear_sample(image, sx, sy)])
    })
}

fn bilinear_sample(image: &GrayImage, x: f32, y: f32) -> u8 {
    let x1 = x.floor() as u32;
    let y1 = y.floor() as u32;
    let x2 = (x1 + 1).min(image.width() - 1);
    let y2 = (y1 + 1).min(image.height() - 1);

    let dx = x - x1 as f32;
    let dy = y - y1 as f32;

    let p11 = image.get_pixel(x1, y1)[0] as f32;
    let p12 = image.get_pixel(x1, y2)[0] as f32;
    let p21 = image.get_pixel(x2, y1)[0] as f32;
    let p22 = image.get_pixel(x2, y2)[0] as f32;

    let val = (1.0 - dx) * (1.0 - dy) * p11 + dx * (1.0 - dy) * p21 + (1.0 - dx) * dy * p12 + dx * dy * p22;
    val.round().clamp(0.0, 255.0) as u8
}

/// Weighted luminance of one RGB pixel, rounded to nearest.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let [wr, wg, wb] = LUMA_WEIGHTS;
    ((wr * r as u32 + wg * g as u32 + wb * b as u32 + 500) / 1000) as u8
}

/// Desaturates an image. Single-channel 8-bit input passes through untouched.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([luminance(r, g, b)])
    })
}
