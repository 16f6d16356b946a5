//! Launch configuration for the replay tool.

use crate::backend::ApiPaths;
use crate::geo::SceneOrigin;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TwinConfig {
    pub scene_id: String,
    #[serde(default)]
    pub origin: Option<SceneOrigin>,
    pub backend: BackendConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackendConfig {
    #[serde(rename_all = "camelCase")]
    Http {
        base_url: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        paths: ApiPaths,
    },
    Snapshot { path: PathBuf },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    #[serde(default = "default_stagger_delays_ms")]
    pub stagger_delays_ms: [u64; 2],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            stagger_delays_ms: default_stagger_delays_ms(),
        }
    }
}

impl RenderConfig {
    pub fn stagger_delays(&self) -> [Duration; 2] {
        self.stagger_delays_ms.map(Duration::from_millis)
    }
}

fn default_stagger_delays_ms() -> [u64; 2] {
    [50, 100]
}

impl TwinConfig {
    pub fn from_json(path: &Path, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The configured origin, else `fallback` (usually the snapshot's own).
    pub fn origin_or(&self, fallback: Option<SceneOrigin>) -> Option<SceneOrigin> {
        self.origin.or(fallback)
    }

    /// Resolve a relative snapshot path against the config file's directory.
    pub fn resolve_relative(mut self, config_path: &Path) -> Self {
        if let BackendConfig::Snapshot { path } = &mut self.backend {
            if path.is_relative() {
                if let Some(dir) = config_path.parent() {
                    *path = dir.join(&*path);
                }
            }
        }
        self
    }
}

pub fn load_config(path: &Path) -> Result<TwinConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(TwinConfig::from_json(path, &text)?.resolve_relative(path))
}
