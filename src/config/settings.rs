//! TOML-based configuration.
//!
//! Supports a config file (tabular.toml) with environment variable expansion
//! in every path.
//!
//! Example configuration:
//! ```toml
//! [schema]
//! storage_name = "Regionalstatistik"
//! schema_path = "${TABULAR_DATA}/schema.json"
//! names_path = "${TABULAR_DATA}/names.json"
//!
//! [store]
//! index = "genesapi"
//! facts_path = "${TABULAR_DATA}/facts.ndjson"
//!
//! [cache]
//! enabled = true
//! backend = "sqlite"          # or "memory"
//! path = "${HOME}/.tabular/cache.db"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{CacheError, IndexedCache, MemoryCache, ResultCache, SqliteCache};
use crate::schema::{NameList, Schema};
use crate::store::NdjsonFactStore;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse {path}: {source}")]
    JsonError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Failed to open cache: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub schema: SchemaSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
}

/// Where the schema definition and region name-list come from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Name of the root schema node.
    pub storage_name: String,

    /// Path to the schema definition JSON.
    pub schema_path: Option<String>,

    /// Path to the region id → name JSON object.
    pub names_path: Option<String>,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            storage_name: "Regionalstatistik".to_string(),
            schema_path: None,
            names_path: None,
        }
    }
}

impl SchemaSettings {
    /// Load the schema index.
    pub fn load_schema(&self) -> Result<Schema, SettingsError> {
        let path = required_path(&self.schema_path, "schema.schema_path")?;
        let content = read(&path)?;
        Schema::from_json(&self.storage_name, &content)
            .map_err(|source| SettingsError::JsonError { path, source })
    }

    /// Load the region name-list.
    pub fn load_names(&self) -> Result<NameList, SettingsError> {
        let path = required_path(&self.names_path, "schema.names_path")?;
        let content = read(&path)?;
        NameList::from_json(&content).map_err(|source| SettingsError::JsonError { path, source })
    }
}

/// Fact store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Name of the fact index.
    pub index: String,

    /// Path to a newline-delimited JSON file of facts.
    pub facts_path: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            index: "genesapi".to_string(),
            facts_path: None,
        }
    }
}

impl StoreSettings {
    pub fn open(&self) -> Result<NdjsonFactStore, SettingsError> {
        let path = required_path(&self.facts_path, "store.facts_path")?;
        Ok(NdjsonFactStore::new(&self.index, path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Result cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    pub backend: CacheBackend,

    /// SQLite database path; defaults to `~/.tabular/cache.db`.
    pub path: Option<String>,

    /// Key namespace; defaults to `genesapi-tabular-cache--{store.index}`.
    pub index: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Sqlite,
            path: None,
            index: None,
        }
    }
}

impl CacheSettings {
    pub fn index_name(&self, store_index: &str) -> String {
        self.index
            .clone()
            .unwrap_or_else(|| format!("genesapi-tabular-cache--{}", store_index))
    }

    /// Open the configured backend, or `None` when caching is disabled.
    pub fn open(&self, store_index: &str) -> Result<Option<Box<dyn ResultCache>>, SettingsError> {
        if !self.enabled {
            return Ok(None);
        }
        let inner: Box<dyn ResultCache> = match self.backend {
            CacheBackend::Memory => Box::new(MemoryCache::new()),
            CacheBackend::Sqlite => {
                let path = match &self.path {
                    Some(path) => PathBuf::from(expand_env_vars(path)?),
                    None => SqliteCache::default_path()?,
                };
                Box::new(SqliteCache::open(&path)?)
            }
        };
        Ok(Some(Box::new(IndexedCache::new(
            self.index_name(store_index),
            inner,
        ))))
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = read(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TABULAR_CONFIG`
    /// 2. `./tabular.toml`
    /// 3. `~/.config/tabular/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TABULAR_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tabular.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tabular").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

fn required_path(value: &Option<String>, key: &str) -> Result<PathBuf, SettingsError> {
    let value = value
        .as_deref()
        .ok_or_else(|| SettingsError::InvalidConfig(format!("`{}` is not set", key)))?;
    Ok(PathBuf::from(expand_env_vars(value)?))
}

fn read(path: &Path) -> Result<String, SettingsError> {
    fs::read_to_string(path).map_err(|source| SettingsError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // lone `$`
                result.push('$');
                continue;
            }
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
