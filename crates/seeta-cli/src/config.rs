use std::path::PathBuf;

/// Default model location, next to the engine's in-tree build.
const DEFAULT_MODEL_PATH: &str = "../SeetaFaceEngine/model/seeta_fr_v1.0.bin";

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identification model file.
    pub model_path: PathBuf,
    /// Library file or directory override (`SEETA_LIB_PATH`).
    pub lib_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `SEETA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            model_path: non_empty("SEETA_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            lib_path: non_empty(seeta_sys::LIB_PATH_ENV).map(PathBuf::from),
        }
    }

    /// Apply a `--model` flag on top of the environment.
    pub fn with_model(mut self, model: Option<PathBuf>) -> Self {
        if let Some(path) = model {
            self.model_path = path;
        }
        self
    }
}
