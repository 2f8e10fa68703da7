//! Layered settings loading
//!
//! Settings structs derive `Deserialize` with `#[serde(default)]`; values come
//! from an optional file and then from prefixed environment variables, with
//! `__` separating nested keys (`CRM_DATABASE__URL`).

use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;

/// Load settings of type `T` from `file` (optional) and the environment.
pub fn load_settings<T: DeserializeOwned>(prefix: &str, file: Option<&str>) -> Result<T, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = file {
        builder = builder.add_source(File::with_name(path).required(false));
    }

    builder
        .add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
