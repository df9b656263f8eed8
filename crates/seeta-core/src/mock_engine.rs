//! In-process stand-in for the engine library, instrumented to count
//! allocations and frees made on the current thread.

use libc::{c_char, c_float, c_int};
use seeta_sys::{EngineApi, ImageData, LandMarks, RawIdentifier, FEATURE_LEN};
use std::cell::Cell;
use std::ptr;

pub const CROP_HEIGHT: c_int = 6;
pub const CROP_WIDTH: c_int = 4;

/// Any file that exists will do as a model path for the mock.
pub const MODEL_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub identifiers_created: usize,
    pub identifiers_freed: usize,
    pub images_allocated: usize,
    pub images_freed: usize,
    pub features_allocated: usize,
    pub features_freed: usize,
    /// Non-free entry points invoked.
    pub calls: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Every constructor and operation returns null.
    NullResults,
    /// `crop_face` returns a struct with zero height and null data.
    MalformedCrop,
    /// `crop_face` returns a well-formed four-channel image.
    FourChannelCrop,
}

thread_local! {
    static COUNTS: Cell<Counts> = Cell::new(Counts::default());
    static MODE: Cell<Mode> = const { Cell::new(Mode::Normal) };
    static LAST_LANDMARKS: Cell<Option<LandMarks>> = const { Cell::new(None) };
}

pub static API: EngineApi = EngineApi {
    get_face_identifier: mock_get_face_identifier,
    crop_face: mock_crop_face,
    extract_feature: mock_extract_feature,
    extract_feature_with_crop: mock_extract_feature_with_crop,
    calc_similarity: mock_calc_similarity,
    free_feature: mock_free_feature,
    free_image_data: mock_free_image_data,
    free_identifier: mock_free_identifier,
};

pub fn counts() -> Counts {
    COUNTS.with(Cell::get)
}

pub fn reset() {
    COUNTS.with(|c| c.set(Counts::default()));
    MODE.with(|m| m.set(Mode::Normal));
    LAST_LANDMARKS.with(|l| l.set(None));
}

pub fn set_mode(mode: Mode) {
    MODE.with(|m| m.set(mode));
}

pub fn last_landmarks() -> Option<LandMarks> {
    LAST_LANDMARKS.with(Cell::get)
}

fn mode() -> Mode {
    MODE.with(Cell::get)
}

fn bump(f: impl FnOnce(&mut Counts)) {
    COUNTS.with(|c| {
        let mut counts = c.get();
        f(&mut counts);
        c.set(counts);
    });
}

unsafe fn image_bytes<'a>(image: *const ImageData) -> &'a [u8] {
    let img = unsafe { &*image };
    let len = (img.height * img.width * img.channels) as usize;
    unsafe { std::slice::from_raw_parts(img.data, len) }
}

/// Deterministic in the image bytes, so extracting one image twice
/// yields identical vectors.
unsafe fn feature_for(image: *const ImageData, bias: f32) -> *mut c_float {
    let sum: u64 = unsafe { image_bytes(image) }.iter().map(|&b| b as u64).sum();
    let seed = (sum % 1009) as f32 + bias + 1.0;
    let values: Box<[f32]> = (0..FEATURE_LEN)
        .map(|i| ((i as f32 + 1.0) * seed * 0.001).sin())
        .collect();
    bump(|c| c.features_allocated += 1);
    Box::into_raw(values) as *mut c_float
}

unsafe extern "C" fn mock_get_face_identifier(_model_path: *const c_char) -> *mut RawIdentifier {
    bump(|c| c.calls += 1);
    if mode() == Mode::NullResults {
        return ptr::null_mut();
    }
    bump(|c| c.identifiers_created += 1);
    Box::into_raw(Box::new(0u64)).cast::<RawIdentifier>()
}

unsafe extern "C" fn mock_free_identifier(identifier: *mut RawIdentifier) {
    bump(|c| c.identifiers_freed += 1);
    drop(unsafe { Box::from_raw(identifier.cast::<u64>()) });
}

unsafe extern "C" fn mock_crop_face(
    _identifier: *mut RawIdentifier,
    image: *mut ImageData,
    landmarks: *mut LandMarks,
) -> *mut ImageData {
    bump(|c| c.calls += 1);
    let marks = unsafe { *landmarks };
    LAST_LANDMARKS.with(|l| l.set(Some(marks)));

    let result = match mode() {
        Mode::NullResults => return ptr::null_mut(),
        Mode::MalformedCrop => ImageData {
            height: 0,
            width: CROP_WIDTH,
            channels: 3,
            data: ptr::null_mut(),
        },
        Mode::FourChannelCrop => {
            let len = (CROP_HEIGHT * CROP_WIDTH * 4) as usize;
            let data: Box<[u8]> = vec![0u8; len].into_boxed_slice();
            ImageData {
                height: CROP_HEIGHT,
                width: CROP_WIDTH,
                channels: 4,
                data: Box::into_raw(data) as *mut u8,
            }
        }
        Mode::Normal => {
            let channels = unsafe { (*image).channels };
            let src = unsafe { image_bytes(image) };
            let len = (CROP_HEIGHT * CROP_WIDTH * channels) as usize;
            let data: Box<[u8]> = (0..len)
                .map(|i| src[i % src.len()].wrapping_add(marks.x[0] as u8))
                .collect();
            ImageData {
                height: CROP_HEIGHT,
                width: CROP_WIDTH,
                channels,
                data: Box::into_raw(data) as *mut u8,
            }
        }
    };
    bump(|c| c.images_allocated += 1);
    Box::into_raw(Box::new(result))
}

unsafe extern "C" fn mock_free_image_data(image: *mut ImageData) {
    bump(|c| c.images_freed += 1);
    let img = unsafe { Box::from_raw(image) };
    if !img.data.is_null() {
        let len = (img.height * img.width * img.channels) as usize;
        drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(img.data, len)) });
    }
}

unsafe extern "C" fn mock_extract_feature(
    _identifier: *mut RawIdentifier,
    image: *mut ImageData,
) -> *mut c_float {
    bump(|c| c.calls += 1);
    if mode() == Mode::NullResults {
        return ptr::null_mut();
    }
    unsafe { feature_for(image, 0.0) }
}

unsafe extern "C" fn mock_extract_feature_with_crop(
    _identifier: *mut RawIdentifier,
    image: *mut ImageData,
    landmarks: *mut LandMarks,
) -> *mut c_float {
    bump(|c| c.calls += 1);
    let marks = unsafe { *landmarks };
    LAST_LANDMARKS.with(|l| l.set(Some(marks)));
    if mode() == Mode::NullResults {
        return ptr::null_mut();
    }
    unsafe { feature_for(image, marks.x[0] as f32) }
}

unsafe extern "C" fn mock_free_feature(feature: *mut c_float) {
    bump(|c| c.features_freed += 1);
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(feature, FEATURE_LEN)) });
}

/// Cosine similarity over the full buffers.
unsafe extern "C" fn mock_calc_similarity(
    _identifier: *mut RawIdentifier,
    feature_a: *mut c_float,
    feature_b: *mut c_float,
) -> c_float {
    bump(|c| c.calls += 1);
    let a = unsafe { std::slice::from_raw_parts(feature_a, FEATURE_LEN) };
    let b = unsafe { std::slice::from_raw_parts(feature_b, FEATURE_LEN) };
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}
