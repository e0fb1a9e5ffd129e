use std::fmt;
use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use super::error::ClassifierError;

/// Pixel layout of a [`RawFrame`] buffer. All layouts are tightly packed (no row padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Full-resolution Y plane followed by an interleaved V/U plane at quarter resolution
    Nv21,
    /// Y plane, then U plane, then V plane, chroma at quarter resolution
    I420,
    /// Packed 8-bit RGB
    Rgb8,
    /// Packed 8-bit RGBA
    Rgba8,
    /// Single 8-bit luma channel
    Luma8,
}

impl PixelFormat {
    /// Number of bytes a tightly packed frame of this format occupies, or `None` on overflow.
    pub fn expected_len(&self, width: u32, height: u32) -> Option<usize> {
        let w = width as usize;
        let h = height as usize;
        let pixels = w.checked_mul(h)?;
        match self {
            Self::Nv21 | Self::I420 => {
                let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?;
                pixels.checked_add(chroma.checked_mul(2)?)
            }
            Self::Rgb8 => pixels.checked_mul(3),
            Self::Rgba8 => pixels.checked_mul(4),
            Self::Luma8 => Some(pixels),
        }
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A single captured frame that owns its pixel buffer.
///
/// The frame is released exactly once, when it is dropped. A camera source that
/// recycles buffers attaches a release hook with [`RawFrame::with_release_hook`];
/// the hook runs on whichever exit path drops the frame (result delivered,
/// frame rejected by the gate, or a per-frame error).
pub struct RawFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    release_hook: Option<ReleaseHook>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
            release_hook: None,
        }
    }

    /// Registers a callback that runs once when the frame is released.
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release_hook = Some(Box::new(hook));
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Releases the frame now instead of at the end of the current scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        if let Some(hook) = self.release_hook.take() {
            hook();
        }
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .field("has_release_hook", &self.release_hook.is_some())
            .finish()
    }
}

/// A decoded, addressable pixel grid. Immutable once produced.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    inner: DynamicImage,
}

impl DecodedImage {
    /// Decodes an image file (imported still image).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let inner = image::open(path).map_err(|e| {
            ClassifierError::Preprocessing(format!("Failed to decode {}: {}", path.display(), e))
        })?;
        Ok(Self { inner })
    }

    /// Decodes an encoded image held in memory (JPEG, PNG, ...).
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, ClassifierError> {
        let inner = image::load_from_memory(bytes)
            .map_err(|e| ClassifierError::Preprocessing(format!("Failed to decode image: {}", e)))?;
        Ok(Self { inner })
    }

    /// Converts a raw camera frame into an RGB or grayscale grid.
    ///
    /// YUV frames use full-range BT.601 coefficients.
    pub fn from_frame(frame: &RawFrame) -> Result<Self, ClassifierError> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(ClassifierError::Preprocessing(format!(
                "Degenerate frame dimensions {}x{}",
                width, height
            )));
        }
        let expected = frame.format().expected_len(width, height).ok_or_else(|| {
            ClassifierError::Preprocessing(format!("Frame dimensions {}x{} overflow", width, height))
        })?;
        if frame.data().len() < expected {
            return Err(ClassifierError::Preprocessing(format!(
                "Frame buffer too short for {:?} {}x{}: {} bytes (need {})",
                frame.format(),
                width,
                height,
                frame.data().len(),
                expected
            )));
        }

        let data = &frame.data()[..expected];
        let short = || ClassifierError::Preprocessing("Frame buffer does not match its dimensions".into());
        let inner = match frame.format() {
            PixelFormat::Rgb8 => {
                DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, data.to_vec()).ok_or_else(short)?)
            }
            PixelFormat::Rgba8 => {
                DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, data.to_vec()).ok_or_else(short)?)
            }
            PixelFormat::Luma8 => {
                DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, data.to_vec()).ok_or_else(short)?)
            }
            PixelFormat::Nv21 | PixelFormat::I420 => {
                let rgb = yuv420_to_rgb(data, width, height, frame.format());
                DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, rgb).ok_or_else(short)?)
            }
        };
        Ok(Self { inner })
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.inner
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(inner: DynamicImage) -> Self {
        Self { inner }
    }
}

impl From<RgbImage> for DecodedImage {
    fn from(image: RgbImage) -> Self {
        Self::from(DynamicImage::ImageRgb8(image))
    }
}

impl From<GrayImage> for DecodedImage {
    fn from(image: GrayImage) -> Self {
        Self::from(DynamicImage::ImageLuma8(image))
    }
}

/// Converts 4:2:0 YUV (NV21 or I420) into packed RGB.
///
/// `data` must already be length-checked against [`PixelFormat::expected_len`].
fn yuv420_to_rgb(data: &[u8], width: u32, height: u32, format: PixelFormat) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let chroma_w = w.div_ceil(2);
    let chroma_len = chroma_w * h.div_ceil(2);
    let (y_plane, chroma) = data.split_at(w * h);

    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        for col in 0..w {
            let c = (row / 2) * chroma_w + col / 2;
            let (u, v) = match format {
                PixelFormat::Nv21 => (chroma[2 * c + 1], chroma[2 * c]),
                _ => (chroma[c], chroma[chroma_len + c]),
            };
            let y = y_plane[row * w + col] as f32;
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    rgb
}
