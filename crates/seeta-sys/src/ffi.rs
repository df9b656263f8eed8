//! ABI mirrors of the engine's transfer structs and entry-point signatures.
//!
//! This is the only module that reasons about raw memory layout. Everything
//! above it works with owned Rust values.

use libc::{c_char, c_float, c_int};

/// Number of facial keypoints the engine expects, in fixed order:
/// left eye, right eye, nose tip, left mouth corner, right mouth corner.
pub const LANDMARK_COUNT: usize = 5;

/// Length of every feature buffer returned by the extraction entry points.
pub const FEATURE_LEN: usize = 2048;

/// Mirror of the engine's image transfer struct.
///
/// Layout (64-bit):
///   height:i32 width:i32 channels:i32 _pad:4 data:*mut u8
/// Total: 4+4+4+4+8 = 24 bytes — verified by compile-time assert.
#[repr(C)]
#[derive(Debug)]
pub struct ImageData {
    pub height: c_int,
    pub width: c_int,
    pub channels: c_int,
    /// Row-major, interleaved samples. Borrowed on input, engine-owned on output.
    pub data: *mut u8,
}

#[cfg(target_pointer_width = "64")]
const _IMAGE_SIZE_ASSERT: () = assert!(
    std::mem::size_of::<ImageData>() == 24,
    "ImageData must be 24 bytes to match the engine ABI"
);

/// Mirror of the engine's landmark transfer struct: five x coordinates
/// followed by five y coordinates, in whole pixels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LandMarks {
    pub x: [c_int; LANDMARK_COUNT],
    pub y: [c_int; LANDMARK_COUNT],
}

const _LANDMARKS_SIZE_ASSERT: () = assert!(
    std::mem::size_of::<LandMarks>() == 40,
    "LandMarks must be 40 bytes to match the engine ABI"
);

/// Opaque engine instance. Only ever handled behind a pointer.
#[repr(C)]
pub struct RawIdentifier {
    _unused: [u8; 0],
}

pub type GetFaceIdentifierFn = unsafe extern "C" fn(model_path: *const c_char) -> *mut RawIdentifier;
pub type CropFaceFn = unsafe extern "C" fn(
    identifier: *mut RawIdentifier,
    image: *mut ImageData,
    landmarks: *mut LandMarks,
) -> *mut ImageData;
pub type ExtractFeatureFn =
    unsafe extern "C" fn(identifier: *mut RawIdentifier, image: *mut ImageData) -> *mut c_float;
pub type ExtractFeatureWithCropFn = unsafe extern "C" fn(
    identifier: *mut RawIdentifier,
    image: *mut ImageData,
    landmarks: *mut LandMarks,
) -> *mut c_float;
pub type CalcSimilarityFn = unsafe extern "C" fn(
    identifier: *mut RawIdentifier,
    feature_a: *mut c_float,
    feature_b: *mut c_float,
) -> c_float;
pub type FreeFeatureFn = unsafe extern "C" fn(feature: *mut c_float);
pub type FreeImageDataFn = unsafe extern "C" fn(image: *mut ImageData);
pub type FreeIdentifierFn = unsafe extern "C" fn(identifier: *mut RawIdentifier);

/// The engine's entry points, bound once.
///
/// Built by [`crate::NativeLibrary`] from the shared library, or assembled
/// by hand from in-process functions when the real engine is not wanted.
#[derive(Debug, Clone, Copy)]
pub struct EngineApi {
    pub get_face_identifier: GetFaceIdentifierFn,
    pub crop_face: CropFaceFn,
    pub extract_feature: ExtractFeatureFn,
    pub extract_feature_with_crop: ExtractFeatureWithCropFn,
    pub calc_similarity: CalcSimilarityFn,
    pub free_feature: FreeFeatureFn,
    pub free_image_data: FreeImageDataFn,
    pub free_identifier: FreeIdentifierFn,
}
