use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::common::Config;

const ENV_PREFIX: &str = "TX_CACHE";

/// Loads the YAML config file (if present) and overlays `TX_CACHE__*` environment variables.
///
/// Nested keys use a double underscore, e.g. `TX_CACHE__FETCH__MAX_CONCURRENCY=64`.
pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    let settings = config::Config::builder()
        .add_source(config::File::from(config_path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .context("failed to read config")?;

    settings
        .try_deserialize()
        .context("failed to parse config")
}
