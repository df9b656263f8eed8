//! seeta-sys — Binding table for the Seeta face identification library.
//!
//! Mirrors the engine's C transfer structs and loads `libseeta_fi_lib`
//! at runtime. Nothing here is safe to call directly; see `seeta-core`.

pub mod ffi;
pub mod loader;

pub use ffi::{EngineApi, ImageData, LandMarks, RawIdentifier, FEATURE_LEN, LANDMARK_COUNT};
pub use loader::{load, LoadError, NativeLibrary, LIB_PATH_ENV};
