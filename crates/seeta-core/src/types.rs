use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array3, ArrayView2, ArrayView3};
use seeta_sys::{FEATURE_LEN, LANDMARK_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input rejected before it reaches the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarshalError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("expected 5 landmarks, got {0}")]
    LandmarkCount(usize),
    #[error("landmark coordinates must come in x,y pairs, got {0} values")]
    UnpairedCoordinates(usize),
    #[error("landmark {index} has a non-finite coordinate")]
    NonFiniteLandmark { index: usize },
    #[error("landmark {index} lies outside the engine's 32-bit pixel range")]
    LandmarkOutOfRange { index: usize },
    #[error("feature length mismatch: expected {expected} values, got {actual}")]
    FeatureLength { expected: usize, actual: usize },
}

/// An 8-bit image, row-major with interleaved channels.
///
/// Color images hold samples in BGR order, which is what the engine expects.
/// The buffer length always equals `height * width * channels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    height: u32,
    width: u32,
    channels: u32,
}

impl Image {
    /// Wrap a raw sample buffer, validating its shape.
    pub fn new(data: Vec<u8>, height: u32, width: u32, channels: u32) -> Result<Self, MarshalError> {
        if !matches!(channels, 1 | 3) {
            return Err(MarshalError::InvalidImage(format!(
                "unsupported channel count {channels} (need 1 or 3)"
            )));
        }
        if height == 0 || width == 0 {
            return Err(MarshalError::InvalidImage(format!(
                "empty image {width}x{height}"
            )));
        }
        // Dimensions cross the boundary as 32-bit signed integers.
        if height > i32::MAX as u32 || width > i32::MAX as u32 {
            return Err(MarshalError::InvalidImage(format!(
                "dimensions {width}x{height} exceed the engine's limits"
            )));
        }
        let expected = (height as usize)
            .checked_mul(width as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .ok_or_else(|| MarshalError::InvalidImage("image size overflows usize".into()))?;
        if data.len() != expected {
            return Err(MarshalError::InvalidImage(format!(
                "buffer holds {} bytes, shape {height}x{width}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            height,
            width,
            channels,
        })
    }

    /// Build from a (height, width, channels) array view. Any memory layout is accepted.
    pub fn from_array(view: ArrayView3<'_, u8>) -> Result<Self, MarshalError> {
        let (h, w, c) = view.dim();
        let data = view.iter().copied().collect();
        Self::new(data, dim_u32(h)?, dim_u32(w)?, dim_u32(c)?)
    }

    /// Build a single-channel image from a (height, width) array view.
    pub fn from_gray_array(view: ArrayView2<'_, u8>) -> Result<Self, MarshalError> {
        let (h, w) = view.dim();
        let data = view.iter().copied().collect();
        Self::new(data, dim_u32(h)?, dim_u32(w)?, 1)
    }

    /// Build from a decoded image. `Luma8` stays single-channel; everything
    /// else is converted to 8-bit color and stored as BGR.
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self, MarshalError> {
        match img {
            DynamicImage::ImageLuma8(gray) => {
                Self::new(gray.as_raw().clone(), gray.height(), gray.width(), 1)
            }
            other => {
                let rgb = other.to_rgb8();
                let data = rgb
                    .pixels()
                    .flat_map(|p| {
                        let [r, g, b] = p.0;
                        [b, g, r]
                    })
                    .collect();
                Self::new(data, rgb.height(), rgb.width(), 3)
            }
        }
    }

    /// Copy into a (height, width, channels) array.
    pub fn to_array(&self) -> Array3<u8> {
        let (w, c) = (self.width as usize, self.channels as usize);
        Array3::from_shape_fn(
            (self.height as usize, w, c),
            |(y, x, ch)| self.data[(y * w + x) * c + ch],
        )
    }

    /// Convert back to a decoded image, swapping BGR to RGB.
    pub fn to_dynamic(&self) -> DynamicImage {
        let c = self.channels as usize;
        let w = self.width as usize;
        let offset = |x: u32, y: u32| (y as usize * w + x as usize) * c;
        if c == 1 {
            DynamicImage::ImageLuma8(GrayImage::from_fn(self.width, self.height, |x, y| {
                Luma([self.data[offset(x, y)]])
            }))
        } else {
            DynamicImage::ImageRgb8(RgbImage::from_fn(self.width, self.height, |x, y| {
                let i = offset(x, y);
                Rgb([self.data[i + 2], self.data[i + 1], self.data[i]])
            }))
        }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Raw interleaved samples.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

fn dim_u32(n: usize) -> Result<u32, MarshalError> {
    u32::try_from(n)
        .map_err(|_| MarshalError::InvalidImage(format!("dimension {n} does not fit in u32")))
}

/// Five facial keypoints in pixel coordinates:
/// [left_eye, right_eye, nose, left_mouth, right_mouth].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmarks([(f32, f32); LANDMARK_COUNT]);

impl Landmarks {
    pub fn new(points: [(f32, f32); LANDMARK_COUNT]) -> Result<Self, MarshalError> {
        if let Some(index) = points
            .iter()
            .position(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(MarshalError::NonFiniteLandmark { index });
        }
        if let Some(index) = points
            .iter()
            .position(|&(x, y)| !rounds_into_i32(x) || !rounds_into_i32(y))
        {
            return Err(MarshalError::LandmarkOutOfRange { index });
        }
        Ok(Self(points))
    }

    /// Parse interleaved `x0, y0, x1, y1, ..., x4, y4` coordinates.
    pub fn from_flat(coords: &[f32]) -> Result<Self, MarshalError> {
        if coords.len() % 2 != 0 {
            return Err(MarshalError::UnpairedCoordinates(coords.len()));
        }
        let points: Vec<(f32, f32)> = coords.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        Self::try_from(points.as_slice())
    }

    pub fn points(&self) -> &[(f32, f32); LANDMARK_COUNT] {
        &self.0
    }
}

/// Coordinates cross the boundary as whole pixels in an i32.
fn rounds_into_i32(v: f32) -> bool {
    // 2^31 is exact in f32; i32::MAX is not.
    let r = v.round();
    r >= i32::MIN as f32 && r < -(i32::MIN as f32)
}

impl TryFrom<&[(f32, f32)]> for Landmarks {
    type Error = MarshalError;

    fn try_from(points: &[(f32, f32)]) -> Result<Self, Self::Error> {
        let fixed: [(f32, f32); LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| MarshalError::LandmarkCount(points.len()))?;
        Self::new(fixed)
    }
}

impl TryFrom<Vec<(f32, f32)>> for Landmarks {
    type Error = MarshalError;

    fn try_from(points: Vec<(f32, f32)>) -> Result<Self, Self::Error> {
        Self::try_from(points.as_slice())
    }
}

/// Face feature vector produced by the engine (always 2048 values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub(crate) fn from_engine(values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), FEATURE_LEN);
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = MarshalError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        check_feature_len(&values)?;
        Ok(Self(values))
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(feature: FeatureVector) -> Self {
        feature.0
    }
}

impl AsRef<[f32]> for FeatureVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

pub(crate) fn check_feature_len(values: &[f32]) -> Result<(), MarshalError> {
    if values.len() != FEATURE_LEN {
        return Err(MarshalError::FeatureLength {
            expected: FEATURE_LEN,
            actual: values.len(),
        });
    }
    Ok(())
}
