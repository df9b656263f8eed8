//! seeta-core — Safe face identification over the Seeta engine library.
//!
//! Wraps the native handle in an owned [`Identifier`] and converts between
//! owned images, landmarks and feature vectors and the engine's C structs.
//! Every buffer the engine hands back is copied and freed before returning.

pub mod identifier;
mod marshal;
pub mod types;

#[cfg(test)]
mod mock_engine;

pub use identifier::{ErrorKind, Identifier, IdentifierError};
pub use seeta_sys::{FEATURE_LEN, LANDMARK_COUNT};
pub use types::{FeatureVector, Image, Landmarks, MarshalError};
