//! Conversions between owned values and the engine's transfer structs.
//!
//! Engine-allocated results are wrapped in drop guards the moment they cross
//! the boundary, so they are freed on every path, including errors.

use crate::types::{FeatureVector, Image, Landmarks, MarshalError};
use libc::{c_float, c_int};
use seeta_sys::{EngineApi, ImageData, LandMarks, FEATURE_LEN};
use std::ptr::NonNull;
use thiserror::Error;

/// An engine-allocated image that cannot be turned into an [`Image`].
#[derive(Debug, Error)]
pub(crate) enum NativeImageError {
    #[error("engine returned image with shape {height}x{width}x{channels}")]
    Shape {
        height: c_int,
        width: c_int,
        channels: c_int,
    },
    #[error("engine returned image with null data")]
    NullData,
    #[error("engine returned unusable image: {0}")]
    Invalid(#[from] MarshalError),
}

/// An input image lent to the engine for the duration of one call.
///
/// The engine takes a mutable data pointer, so it gets a scratch copy
/// rather than the caller's buffer.
pub(crate) struct ImageTransfer {
    raw: ImageData,
    _buffer: Vec<u8>,
}

impl ImageTransfer {
    pub(crate) fn new(image: &Image) -> Self {
        let mut buffer = image.data().to_vec();
        // Image guarantees both dimensions fit in i32.
        let raw = ImageData {
            height: image.height() as c_int,
            width: image.width() as c_int,
            channels: image.channels() as c_int,
            data: buffer.as_mut_ptr(),
        };
        Self {
            raw,
            _buffer: buffer,
        }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut ImageData {
        &mut self.raw
    }
}

/// Round landmark coordinates to whole pixels in the engine's x-then-y layout.
///
/// Landmarks guarantees every rounded coordinate fits in i32.
pub(crate) fn landmarks_to_raw(landmarks: &Landmarks) -> LandMarks {
    let mut raw = LandMarks::default();
    for (i, &(x, y)) in landmarks.points().iter().enumerate() {
        raw.x[i] = x.round() as c_int;
        raw.y[i] = y.round() as c_int;
    }
    raw
}

/// A cropped face image allocated by the engine. Freed on drop.
pub(crate) struct NativeImage {
    ptr: NonNull<ImageData>,
    api: &'static EngineApi,
}

impl NativeImage {
    /// Take ownership of a `crop_face` result. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live result of `api.crop_face` not yet freed.
    pub(crate) unsafe fn from_raw(ptr: *mut ImageData, api: &'static EngineApi) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, api })
    }

    /// Copy the engine's pixels into an owned [`Image`].
    pub(crate) fn to_image(&self) -> Result<Image, NativeImageError> {
        // SAFETY: ptr is a live engine result (from_raw contract).
        let raw = unsafe { self.ptr.as_ref() };
        let (h, w, c) = (raw.height, raw.width, raw.channels);
        let shape = NativeImageError::Shape {
            height: h,
            width: w,
            channels: c,
        };
        if h <= 0 || w <= 0 || c <= 0 {
            return Err(shape);
        }
        if raw.data.is_null() {
            return Err(NativeImageError::NullData);
        }
        let len = (h as usize)
            .checked_mul(w as usize)
            .and_then(|n| n.checked_mul(c as usize))
            .ok_or(shape)?;

        // SAFETY: the engine allocates exactly height*width*channels bytes at data.
        let pixels = unsafe { std::slice::from_raw_parts(raw.data, len) }.to_vec();
        Ok(Image::new(pixels, h as u32, w as u32, c as u32)?)
    }
}

impl Drop for NativeImage {
    fn drop(&mut self) {
        // SAFETY: we own the result and free it exactly once.
        unsafe { (self.api.free_image_data)(self.ptr.as_ptr()) }
    }
}

/// A feature buffer allocated by the engine. Freed on drop.
pub(crate) struct NativeFeature {
    ptr: NonNull<c_float>,
    api: &'static EngineApi,
}

impl NativeFeature {
    /// Take ownership of an extraction result. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live `FEATURE_LEN`-float buffer returned by
    /// one of `api`'s extraction entry points and not yet freed.
    pub(crate) unsafe fn from_raw(ptr: *mut c_float, api: &'static EngineApi) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, api })
    }

    pub(crate) fn to_vector(&self) -> FeatureVector {
        // SAFETY: the buffer holds FEATURE_LEN floats (from_raw contract).
        let values = unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), FEATURE_LEN) };
        FeatureVector::from_engine(values.to_vec())
    }
}

impl Drop for NativeFeature {
    fn drop(&mut self) {
        // SAFETY: we own the buffer and free it exactly once.
        unsafe { (self.api.free_feature)(self.ptr.as_ptr()) }
    }
}
