//! comicfs configuration.
//!
//! Loaded from TOML; every field is optional and falls back to the defaults
//! below.
//!
//! ```toml
//! base_dir = "/srv/comics"
//! container_extensions = [".cbz", ".zip"]
//! decoders = [".webp", ".png", ".jpg"]
//! encoders = [".png"]
//! log_level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::imgconv::{builtin_codec, normalize_ext};

/// Errors loading or validating a [`ComicFsConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("base directory {0} does not exist or is not a directory")]
    BaseDir(PathBuf),

    #[error("no built-in codec for extension {0}")]
    UnknownCodec(String),

    #[error("invalid container extension {0:?}")]
    ContainerExtension(String),
}

fn default_container_extensions() -> Vec<String> {
    vec![".zip".into(), ".cbz".into()]
}

fn default_decoders() -> Vec<String> {
    vec![".webp".into(), ".png".into()]
}

fn default_encoders() -> Vec<String> {
    vec![".png".into()]
}

fn default_log_level() -> String {
    "info".into()
}

/// Everything needed to build a [`FilesystemRegistry`](crate::FilesystemRegistry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComicFsConfig {
    /// Directory mirrored at the root.
    pub base_dir: PathBuf,
    /// File extensions opened as zip containers.
    pub container_extensions: Vec<String>,
    /// Extensions a dual-extension name may convert from.
    pub decoders: Vec<String>,
    /// Extensions a dual-extension name may convert to.
    pub encoders: Vec<String>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ComicFsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            container_extensions: default_container_extensions(),
            decoders: default_decoders(),
            encoders: default_encoders(),
            log_level: default_log_level(),
        }
    }
}

impl ComicFsConfig {
    /// Defaults, mirroring `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_container_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.container_extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_decoders<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoders = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_encoders<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encoders = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Check the base directory exists and every extension is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_dir.is_dir() {
            return Err(ConfigError::BaseDir(self.base_dir.clone()));
        }

        for ext in &self.container_extensions {
            let norm = normalize_ext(ext);
            if norm.is_empty() || norm.contains(['.', '/']) {
                return Err(ConfigError::ContainerExtension(ext.clone()));
            }
        }

        for ext in self.decoders.iter().chain(&self.encoders) {
            if builtin_codec(&normalize_ext(ext)).is_none() {
                return Err(ConfigError::UnknownCodec(ext.clone()));
            }
        }

        Ok(())
    }
}
