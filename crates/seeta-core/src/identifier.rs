//! Face identifier backed by the native Seeta engine.
//!
//! Owns one engine handle and exposes crop, feature extraction and
//! similarity scoring over owned Rust values.

use crate::marshal::{self, ImageTransfer, NativeFeature, NativeImage};
use crate::types::{self, FeatureVector, Image, Landmarks, MarshalError};
use seeta_sys::{EngineApi, LoadError, RawIdentifier};
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentifierError {
    #[error("engine library: {0}")]
    Load(#[from] LoadError),
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("model path cannot be passed to the engine: {0}")]
    InvalidModelPath(String),
    #[error("engine returned a null identifier for model {0}")]
    NullHandle(String),
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error("{op} failed: {reason}")]
    NativeCall { op: &'static str, reason: String },
    #[error("identifier used after release")]
    Released,
}

/// Coarse category of an [`IdentifierError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Library, platform, model path or handle construction.
    Initialization,
    /// Input rejected before any native call.
    Precondition,
    /// The engine signalled failure.
    NativeCall,
    /// Operation on a released identifier.
    UseAfterRelease,
}

impl IdentifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) | Self::ModelNotFound(_) | Self::InvalidModelPath(_) | Self::NullHandle(_) => {
                ErrorKind::Initialization
            }
            Self::Marshal(_) => ErrorKind::Precondition,
            Self::NativeCall { .. } => ErrorKind::NativeCall,
            Self::Released => ErrorKind::UseAfterRelease,
        }
    }
}

/// Exclusive owner of one engine instance. Freed exactly once on drop.
struct Handle {
    raw: NonNull<RawIdentifier>,
    api: &'static EngineApi,
}

// SAFETY: the handle is only reachable through its single owner; moving it
// between threads does not share it. Identifier stays !Sync.
unsafe impl Send for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        tracing::debug!("freeing engine identifier");
        // SAFETY: raw came from get_face_identifier and is freed only here.
        unsafe { (self.api.free_identifier)(self.raw.as_ptr()) }
    }
}

/// Seeta face identifier.
///
/// Two states: live, and released after [`release`](Self::release). Every
/// operation on a released identifier fails with [`IdentifierError::Released`].
/// Dropping a live identifier releases it.
///
/// `Identifier` is `Send` but not `Sync`. Sharing one across threads needs
/// external serialization, e.g. `Mutex<Identifier>`.
pub struct Identifier {
    handle: Option<Handle>,
    model_path: PathBuf,
}

impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identifier")
            .field("model_path", &self.model_path)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Identifier {
    /// Load the engine library (once per process) and create an identifier
    /// from the model file at `model_path`.
    pub fn new(model_path: impl AsRef<Path>) -> Result<Self, IdentifierError> {
        let library = seeta_sys::load()?;
        Self::with_api(library.api(), model_path)
    }

    /// Create an identifier through an explicit binding table.
    pub fn with_api(
        api: &'static EngineApi,
        model_path: impl AsRef<Path>,
    ) -> Result<Self, IdentifierError> {
        let model_path = model_path.as_ref();
        let shown = model_path.display().to_string();
        if !model_path.exists() {
            return Err(IdentifierError::ModelNotFound(shown));
        }
        let utf8 = model_path
            .to_str()
            .ok_or_else(|| IdentifierError::InvalidModelPath(format!("{shown}: not valid UTF-8")))?;
        let c_path = CString::new(utf8)
            .map_err(|_| IdentifierError::InvalidModelPath(format!("{shown}: interior NUL byte")))?;

        // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
        let raw = unsafe { (api.get_face_identifier)(c_path.as_ptr()) };
        let raw = NonNull::new(raw).ok_or_else(|| IdentifierError::NullHandle(shown))?;

        tracing::info!(path = %model_path.display(), "created Seeta identifier");

        Ok(Self {
            handle: Some(Handle { raw, api }),
            model_path: model_path.to_path_buf(),
        })
    }

    /// Crop and align the face described by `landmarks` out of `image`.
    pub fn crop_face(&self, image: &Image, landmarks: &Landmarks) -> Result<Image, IdentifierError> {
        let handle = self.live()?;
        let mut input = ImageTransfer::new(image);
        let mut marks = marshal::landmarks_to_raw(landmarks);

        // SAFETY: input and marks outlive the call; the result is owned by the guard.
        let native = unsafe {
            let raw = (handle.api.crop_face)(handle.raw.as_ptr(), input.as_mut_ptr(), &mut marks);
            NativeImage::from_raw(raw, handle.api)
        }
        .ok_or_else(|| native_failure("crop_face", "engine returned null"))?;

        let cropped = native
            .to_image()
            .map_err(|e| IdentifierError::NativeCall {
                op: "crop_face",
                reason: e.to_string(),
            })?;

        tracing::debug!(
            height = cropped.height(),
            width = cropped.width(),
            channels = cropped.channels(),
            "cropped face"
        );
        Ok(cropped)
    }

    /// Extract a feature vector from an already cropped face image.
    pub fn extract_feature(&self, image: &Image) -> Result<FeatureVector, IdentifierError> {
        let handle = self.live()?;
        let mut input = ImageTransfer::new(image);

        // SAFETY: input outlives the call; the buffer is owned by the guard.
        let native = unsafe {
            let raw = (handle.api.extract_feature)(handle.raw.as_ptr(), input.as_mut_ptr());
            NativeFeature::from_raw(raw, handle.api)
        }
        .ok_or_else(|| native_failure("extract_feature", "engine returned null"))?;

        Ok(native.to_vector())
    }

    /// Extract a feature vector, letting the engine align and crop the face
    /// described by `landmarks` first.
    pub fn extract_feature_with_crop(
        &self,
        image: &Image,
        landmarks: &Landmarks,
    ) -> Result<FeatureVector, IdentifierError> {
        let handle = self.live()?;
        let mut input = ImageTransfer::new(image);
        let mut marks = marshal::landmarks_to_raw(landmarks);

        // SAFETY: input and marks outlive the call; the buffer is owned by the guard.
        let native = unsafe {
            let raw = (handle.api.extract_feature_with_crop)(
                handle.raw.as_ptr(),
                input.as_mut_ptr(),
                &mut marks,
            );
            NativeFeature::from_raw(raw, handle.api)
        }
        .ok_or_else(|| native_failure("extract_feature_with_crop", "engine returned null"))?;

        Ok(native.to_vector())
    }

    /// Score two feature vectors with the engine's own metric.
    ///
    /// The score is returned unmodified; its range is defined by the engine.
    /// Both inputs must hold exactly 2048 values.
    pub fn calc_similarity(&self, feature_a: &[f32], feature_b: &[f32]) -> Result<f32, IdentifierError> {
        let handle = self.live()?;
        types::check_feature_len(feature_a)?;
        types::check_feature_len(feature_b)?;

        // The engine takes mutable pointers; give it copies.
        let mut a = feature_a.to_vec();
        let mut b = feature_b.to_vec();

        // SAFETY: both buffers hold FEATURE_LEN floats and outlive the call.
        let score =
            unsafe { (handle.api.calc_similarity)(handle.raw.as_ptr(), a.as_mut_ptr(), b.as_mut_ptr()) };
        Ok(score)
    }

    /// Free the engine handle. The identifier is unusable afterwards.
    pub fn release(&mut self) -> Result<(), IdentifierError> {
        let handle = self.handle.take().ok_or(IdentifierError::Released)?;
        drop(handle);
        tracing::info!(path = %self.model_path.display(), "released Seeta identifier");
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Model file this identifier was created from.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn live(&self) -> Result<&Handle, IdentifierError> {
        self.handle.as_ref().ok_or(IdentifierError::Released)
    }
}

fn native_failure(op: &'static str, reason: &str) -> IdentifierError {
    IdentifierError::NativeCall {
        op,
        reason: reason.to_string(),
    }
}
