//! Configuration module.
//!
//! Loads `tabular.toml` and turns it into the process-wide handles: schema
//! index, region name-list, fact store and result cache.

mod settings;

pub use settings::{
    expand_env_vars, CacheBackend, CacheSettings, SchemaSettings, Settings, SettingsError,
    StoreSettings,
};
