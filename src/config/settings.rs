use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::archive::{Compression, HashName};
use crate::session::DEFAULT_BACKEND;
use crate::util::paths::config_path;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Run configuration after merging the config file over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where final artifacts are placed
    pub tmp_dir: PathBuf,
    pub compression: Compression,
    pub hash: HashName,
    /// Run experimental plugins by default
    pub experimental: bool,
    pub skip_plugins: Vec<String>,
    pub enable_plugins: Vec<String>,
    /// Tracing directive for the log file, e.g. `debug` or `vmcore_report=trace`
    pub log_level: Option<String>,
    /// Introspection backend name
    pub backend: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir(),
            compression: Compression::default(),
            hash: HashName::default(),
            experimental: false,
            skip_plugins: Vec::new(),
            enable_plugins: Vec::new(),
            log_level: None,
            backend: DEFAULT_BACKEND.to_string(),
        }
    }
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub tmp_dir: Option<PathBuf>,
    pub compression: Option<Compression>,
    pub hash: Option<HashName>,
    pub experimental: Option<bool>,
    pub skip_plugins: Option<Vec<String>>,
    pub enable_plugins: Option<Vec<String>>,
    pub log_level: Option<String>,
    pub backend: Option<String>,
}

impl Config {
    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_file = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        if !config_file.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_file).map_err(|source| ConfigError::Read {
            path: config_file.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_file.clone(),
            source,
        })?;
        tracing::debug!(path = %config_file.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let toml_config = toml::from_str::<TomlConfig>(contents)?;
        let mut config = Self::default();
        config.merge(toml_config);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(tmp_dir) = toml_config.tmp_dir {
            self.tmp_dir = tmp_dir;
        }
        if let Some(compression) = toml_config.compression {
            self.compression = compression;
        }
        if let Some(hash) = toml_config.hash {
            self.hash = hash;
        }
        if let Some(experimental) = toml_config.experimental {
            self.experimental = experimental;
        }
        if let Some(skip) = toml_config.skip_plugins {
            self.skip_plugins = skip;
        }
        if let Some(enable) = toml_config.enable_plugins {
            self.enable_plugins = enable;
        }
        if toml_config.log_level.is_some() {
            self.log_level = toml_config.log_level;
        }
        if let Some(backend) = toml_config.backend {
            self.backend = backend;
        }
    }
}
