use config::{Config, Environment, File as ConfigFile};
use serde::de::DeserializeOwned;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::embedding::EmbedderConfig;
use crate::error::ConfigError;
use crate::store::StoreConfig;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const DEFAULT_MODEL: &str = "BAAI/bge-small-en-v1.5";

const CONFIG_FILE_NAME: &str = "pagevec_config";
const ENV_PREFIX: &str = "PAGEVEC";

/// Raw values as found in the config sources; all optional.
pub struct PagevecConfig {
    pub data_dir: Option<String>,
    pub db_dir: Option<String>,
    pub model: Option<String>,
    pub model_cache_dir: Option<String>,
    pub dimension: Option<usize>,
    pub top_k: Option<usize>,
    pub preview_chars: Option<usize>,
    pub download_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
}

impl PagevecConfig {
    pub fn try_from(config: &Config) -> Result<Self, config::ConfigError> {
        Ok(PagevecConfig {
            data_dir: optional(config, "data_dir")?,
            db_dir: optional(config, "db_dir")?,
            model: optional(config, "model")?,
            model_cache_dir: optional(config, "model_cache_dir")?,
            dimension: optional(config, "dimension")?,
            top_k: optional(config, "top_k")?,
            preview_chars: optional(config, "preview_chars")?,
            download_timeout_secs: optional(config, "download_timeout_secs")?,
            verbose: optional(config, "verbose")?,
        })
    }
}

/// Absent keys are `None`; present but malformed keys are errors.
fn optional<T: DeserializeOwned>(
    config: &Config,
    key: &str,
) -> Result<Option<T>, config::ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Effective settings after layering defaults, config file and environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub db_dir: PathBuf,
    pub model: String,
    pub model_cache_dir: Option<PathBuf>,
    pub dimension: Option<usize>,
    pub top_k: usize,
    pub preview_chars: usize,
    pub download_timeout_secs: u64,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_dir: PathBuf::from("db"),
            model: DEFAULT_MODEL.to_string(),
            model_cache_dir: None,
            dimension: None,
            top_k: 5,
            preview_chars: 400,
            download_timeout_secs: 60,
            verbose: false,
        }
    }
}

impl Settings {
    /// Reads `pagevec_config.*` from the working directory (or `config_file`
    /// when given) and `PAGEVEC_*` environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match config_file {
            Some(path) => ConfigFile::from(path).required(true),
            None => ConfigFile::with_name(CONFIG_FILE_NAME).required(false),
        };
        let config = Config::builder()
            .add_source(file_source)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let raw = PagevecConfig::try_from(config)?;
        let defaults = Settings::default();

        let top_k = raw.top_k.unwrap_or(defaults.top_k);
        if top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "top_k",
                reason: "must be greater than zero".to_string(),
            });
        }

        let preview_chars = raw.preview_chars.unwrap_or(defaults.preview_chars);
        if preview_chars == 0 {
            return Err(ConfigError::Invalid {
                key: "preview_chars",
                reason: "must be greater than zero".to_string(),
            });
        }

        if raw.dimension == Some(0) {
            return Err(ConfigError::Invalid {
                key: "dimension",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            data_dir: raw.data_dir.map(PathBuf::from).unwrap_or(defaults.data_dir),
            db_dir: raw.db_dir.map(PathBuf::from).unwrap_or(defaults.db_dir),
            model: raw.model.unwrap_or(defaults.model),
            model_cache_dir: raw.model_cache_dir.map(PathBuf::from),
            dimension: raw.dimension,
            top_k,
            preview_chars,
            download_timeout_secs: raw
                .download_timeout_secs
                .unwrap_or(defaults.download_timeout_secs),
            verbose: raw.verbose.unwrap_or(defaults.verbose),
        })
    }

    /// Each source document gets its own index directory under `db_dir`,
    /// named after the document's file stem.
    pub fn storage_dir_for(&self, document: &Path) -> PathBuf {
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.db_dir.join(stem)
    }

    pub fn store_config(&self, dimension: usize, document: &Path) -> StoreConfig {
        StoreConfig::new(dimension, self.storage_dir_for(document))
    }

    pub fn embedder_config(&self) -> EmbedderConfig {
        EmbedderConfig {
            model_id: self.model.clone(),
            cache_dir: self.model_cache_dir.clone(),
        }
    }

    /// Checks the configured dimension, if any, against the model's.
    pub fn check_dimension(&self, model_dimension: usize) -> Result<(), ConfigError> {
        match self.dimension {
            Some(expected) if expected != model_dimension => Err(ConfigError::Invalid {
                key: "dimension",
                reason: format!(
                    "configured {} but model '{}' produces {}",
                    expected, self.model, model_dimension
                ),
            }),
            _ => Ok(()),
        }
    }

    pub fn write_config<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "data_dir={}", self.data_dir.display())?;
        writeln!(out, "db_dir={}", self.db_dir.display())?;
        writeln!(out, "model={}", self.model)?;
        match &self.model_cache_dir {
            Some(dir) => writeln!(out, "model_cache_dir={}", dir.display())?,
            None => writeln!(out, "model_cache_dir=<hub default>")?,
        }
        match self.dimension {
            Some(dimension) => writeln!(out, "dimension={}", dimension)?,
            None => writeln!(out, "dimension=<from model>")?,
        }
        writeln!(out, "top_k={}", self.top_k)?;
        writeln!(out, "preview_chars={}", self.preview_chars)?;
        writeln!(out, "download_timeout_secs={}", self.download_timeout_secs)?;
        writeln!(out, "verbose={}", self.verbose)?;
        Ok(())
    }
}
