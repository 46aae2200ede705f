//! Pixel buffer types shared by every focus stacking stage.
//!
//! Frames are stored as interleaved row-major buffers. Input and output use
//! `u8` samples; pyramid math runs on `f32` so that negative Laplacian values
//! and sub-integer detail survive until the final conversion.

use crate::errors::FocusStackError;

/// BT.601 luma weights for interleaved RGB.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Numeric sample type of an [`Image`].
pub trait Sample: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    fn to_f32(self) -> f32;
}

impl Sample for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Sample for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

/// Rectangular interleaved pixel buffer with 1 or 3 channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T: Sample> {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<T>,
}

/// 8-bit frame as decoded from the burst or handed to persistence.
pub type Frame = Image<u8>;

/// Floating-point image used for pyramid levels.
pub type FloatImage = Image<f32>;

impl<T: Sample> Image<T> {
    /// Create an image filled with `T::default()`.
    pub fn new(width: usize, height: usize, channels: usize) -> Result<Self, FocusStackError> {
        Self::filled(width, height, channels, T::default())
    }

    /// Create an image with every sample set to `value`.
    pub fn filled(
        width: usize,
        height: usize,
        channels: usize,
        value: T,
    ) -> Result<Self, FocusStackError> {
        validate_shape(width, height, channels)?;
        Ok(Self {
            width,
            height,
            channels,
            data: vec![value; width * height * channels],
        })
    }

    /// Wrap an existing interleaved buffer.
    ///
    /// The buffer length must be exactly `width * height * channels`.
    pub fn from_vec(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<T>,
    ) -> Result<Self, FocusStackError> {
        validate_shape(width, height, channels)?;
        let expected_size = width * height * channels;
        if data.len() != expected_size {
            return Err(FocusStackError::DataCorruption {
                frame_size: data.len(),
                expected_size,
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build from parts already known to be consistent (derived from an
    /// existing image's shape).
    pub(crate) fn from_raw(width: usize, height: usize, channels: usize, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), width * height * channels);
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// True when both images have the same width, height and channel count.
    pub fn same_shape<U: Sample>(&self, other: &Image<U>) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> T {
        self.data[(y * self.width + x) * self.channels + c]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: T) {
        self.data[(y * self.width + x) * self.channels + c] = value;
    }

    /// All channel samples of one pixel.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[T] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Promote every sample to `f32`.
    pub fn to_f32(&self) -> FloatImage {
        Image {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: self.data.iter().map(|v| v.to_f32()).collect(),
        }
    }

    /// Single channel BT.601 luminance as `f32`.
    ///
    /// Single channel images are promoted without weighting.
    pub fn luminance(&self) -> FloatImage {
        let data = if self.channels == 1 {
            self.data.iter().map(|v| v.to_f32()).collect()
        } else {
            self.data
                .chunks_exact(self.channels)
                .map(|px| {
                    LUMA_WEIGHTS[0] * px[0].to_f32()
                        + LUMA_WEIGHTS[1] * px[1].to_f32()
                        + LUMA_WEIGHTS[2] * px[2].to_f32()
                })
                .collect()
        };
        Image {
            width: self.width,
            height: self.height,
            channels: 1,
            data,
        }
    }
}

impl FloatImage {
    /// Convert to 8-bit with rounding and clamping to `[0, 255]`.
    ///
    /// Non-finite samples become 0.
    pub fn to_u8_saturating(&self) -> Frame {
        Image {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: self.data.iter().map(|&v| saturate_u8(v)).collect(),
        }
    }

    /// Number of NaN or infinite samples.
    pub fn count_non_finite(&self) -> usize {
        self.data.iter().filter(|v| !v.is_finite()).count()
    }

    /// Largest absolute per-sample difference against an image of the same shape.
    pub fn max_abs_diff(&self, other: &FloatImage) -> Option<f32> {
        if !self.same_shape(other) {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f32::max),
        )
    }
}

/// Round half away from zero and clamp to the `u8` range.
#[inline]
pub fn saturate_u8(value: f32) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

fn validate_shape(width: usize, height: usize, channels: usize) -> Result<(), FocusStackError> {
    if width == 0 || height == 0 {
        return Err(FocusStackError::InvalidConfig(format!(
            "image dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    if channels != 1 && channels != 3 {
        return Err(FocusStackError::InvalidConfig(format!(
            "unsupported channel count {} (expected 1 or 3)",
            channels
        )));
    }
    Ok(())
}
