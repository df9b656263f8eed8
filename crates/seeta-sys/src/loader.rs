//! Native library resolution and the process-wide binding table.
//!
//! The engine ships as `libseeta_fi_lib` with one filename per platform.
//! Candidates are tried in order: the `SEETA_LIB_PATH` override, the bare
//! filename through the system loader search path, then the engine's
//! in-tree build directory.

use crate::ffi::EngineApi;
use libloading::Library;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Environment variable naming the library file, or a directory holding it.
pub const LIB_PATH_ENV: &str = "SEETA_LIB_PATH";

/// Build directory of the engine, relative to the working directory.
const FALLBACK_DIR: &str = "../SeetaFaceEngine/library";

/// Library filename and fallback subdirectory for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLibrary {
    pub file_name: &'static str,
    /// Subdirectory of the fallback directory the build drops the library in.
    pub fallback_subdir: &'static str,
}

#[cfg(target_os = "linux")]
const PLATFORM_LIBRARY: Option<PlatformLibrary> = Some(PlatformLibrary {
    file_name: "libseeta_fi_lib.so",
    fallback_subdir: "",
});

#[cfg(target_os = "macos")]
const PLATFORM_LIBRARY: Option<PlatformLibrary> = Some(PlatformLibrary {
    file_name: "libseeta_fi_lib.dylib",
    fallback_subdir: "",
});

#[cfg(target_os = "windows")]
const PLATFORM_LIBRARY: Option<PlatformLibrary> = Some(PlatformLibrary {
    file_name: "libseeta_fi_lib.dll",
    fallback_subdir: "release",
});

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const PLATFORM_LIBRARY: Option<PlatformLibrary> = None;

static LIBRARY: OnceLock<NativeLibrary> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(&'static str),
    #[error("native library not found (tried {tried:?}): {reason}")]
    NotFound { tried: Vec<PathBuf>, reason: String },
    #[error("missing entry point `{symbol}` in {}: {source}", .path.display())]
    MissingSymbol {
        symbol: &'static str,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

/// The engine library for the current platform, if it has one.
pub fn platform_library() -> Result<PlatformLibrary, LoadError> {
    PLATFORM_LIBRARY.ok_or(LoadError::UnsupportedPlatform(std::env::consts::OS))
}

/// Ordered list of paths to try, given an optional `SEETA_LIB_PATH` value.
pub fn library_candidates(env_override: Option<&OsStr>) -> Result<Vec<PathBuf>, LoadError> {
    let platform = platform_library()?;
    let mut candidates = Vec::with_capacity(3);

    if let Some(raw) = env_override.filter(|v| !v.is_empty()) {
        let path = PathBuf::from(raw);
        if path.is_dir() {
            candidates.push(path.join(platform.file_name));
        } else {
            candidates.push(path);
        }
    }

    // A bare filename goes through the dynamic loader's own search path.
    candidates.push(PathBuf::from(platform.file_name));

    let mut fallback = PathBuf::from(FALLBACK_DIR);
    if !platform.fallback_subdir.is_empty() {
        fallback.push(platform.fallback_subdir);
    }
    candidates.push(fallback.join(platform.file_name));

    Ok(candidates)
}

/// A loaded engine library together with its bound entry points.
///
/// The `Library` is kept alive alongside the function pointers taken from it.
pub struct NativeLibrary {
    path: PathBuf,
    api: EngineApi,
    _library: Library,
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl NativeLibrary {
    /// Load the library at `path` and bind every entry point.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        // SAFETY: loading runs the library's initializers. The engine library
        // has no initialization routines with preconditions on the caller.
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::NotFound {
            tried: vec![path.to_path_buf()],
            reason: e.to_string(),
        })?;

        // SAFETY: each symbol is bound with the signature the engine exports.
        let api = unsafe {
            EngineApi {
                get_face_identifier: bind(&library, path, "get_face_identifier")?,
                crop_face: bind(&library, path, "crop_face")?,
                extract_feature: bind(&library, path, "extract_feature")?,
                extract_feature_with_crop: bind(&library, path, "extract_feature_with_crop")?,
                calc_similarity: bind(&library, path, "calc_similarity")?,
                free_feature: bind(&library, path, "free_feature")?,
                free_image_data: bind(&library, path, "free_image_data")?,
                free_identifier: bind(&library, path, "free_identifier")?,
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            api,
            _library: library,
        })
    }

    /// Try each candidate in order and keep the first that loads.
    pub fn open_first(candidates: &[PathBuf]) -> Result<Self, LoadError> {
        let mut reason = String::from("no candidate paths");
        for candidate in candidates {
            tracing::debug!(path = %candidate.display(), "trying engine library");
            match Self::open(candidate) {
                Ok(lib) => return Ok(lib),
                // A library that loads but lacks an entry point is not worth
                // skipping past: the next candidate is the same build.
                Err(e @ LoadError::MissingSymbol { .. }) => return Err(e),
                Err(e) => reason = e.to_string(),
            }
        }
        Err(LoadError::NotFound {
            tried: candidates.to_vec(),
            reason,
        })
    }

    pub fn api(&self) -> &EngineApi {
        &self.api
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// # Safety
///
/// `T` must be the exact function pointer type of `symbol`.
unsafe fn bind<T: Copy>(library: &Library, path: &Path, symbol: &'static str) -> Result<T, LoadError> {
    // SAFETY: forwarded to the caller.
    let sym = unsafe { library.get::<T>(symbol.as_bytes()) }.map_err(|source| {
        LoadError::MissingSymbol {
            symbol,
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(*sym)
}

/// Load the engine library once per process and return its binding table.
///
/// Subsequent calls return the same instance. The library is never unloaded.
pub fn load() -> Result<&'static NativeLibrary, LoadError> {
    if let Some(lib) = LIBRARY.get() {
        return Ok(lib);
    }

    let env_override = std::env::var_os(LIB_PATH_ENV);
    let candidates = library_candidates(env_override.as_deref())?;
    let lib = NativeLibrary::open_first(&candidates)?;
    tracing::info!(path = %lib.path().display(), "loaded Seeta identification library");

    // A concurrent loser drops its handle; the OS refcounts the mapping.
    Ok(LIBRARY.get_or_init(|| lib))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_library_name() {
        let platform = platform_library().unwrap();
        assert_eq!(platform.file_name, "libseeta_fi_lib.so");
        assert_eq!(platform.fallback_subdir, "");
    }

    #[test]
    fn candidates_without_override() {
        let platform = platform_library().unwrap();
        let candidates = library_candidates(None).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], PathBuf::from(platform.file_name));
        assert!(candidates[1].starts_with(FALLBACK_DIR));
        assert!(candidates[1].ends_with(platform.file_name));
    }

    #[test]
    fn empty_override_is_ignored() {
        let candidates = library_candidates(Some(OsStr::new(""))).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn file_override_comes_first() {
        let candidates =
            library_candidates(Some(OsStr::new("/opt/seeta/custom_build.so"))).unwrap();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0], PathBuf::from("/opt/seeta/custom_build.so"));
    }

    #[test]
    fn directory_override_is_joined_with_file_name() {
        let platform = platform_library().unwrap();
        let dir = std::env::temp_dir();
        let candidates = library_candidates(Some(dir.as_os_str())).unwrap();
        assert_eq!(candidates[0], dir.join(platform.file_name));
    }

    #[test]
    fn open_missing_library_is_not_found() {
        let path = Path::new("/nonexistent/seeta/libseeta_fi_lib.so");
        match NativeLibrary::open(path) {
            Err(LoadError::NotFound { tried, .. }) => assert_eq!(tried, vec![path.to_path_buf()]),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn open_first_reports_every_candidate() {
        let candidates = vec![
            PathBuf::from("/nonexistent/a/libseeta_fi_lib.so"),
            PathBuf::from("/nonexistent/b/libseeta_fi_lib.so"),
        ];
        match NativeLibrary::open_first(&candidates) {
            Err(LoadError::NotFound { tried, reason }) => {
                assert_eq!(tried, candidates);
                assert!(!reason.is_empty());
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn open_first_with_no_candidates() {
        let err = NativeLibrary::open_first(&[]).unwrap_err();
        assert!(err.to_string().contains("no candidate paths"));
    }
}
