// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use tracing::debug;

use crate::monitor::config::EngineConfig;
use crate::monitor::error::{Error, Result};

/// Environment variables with this prefix override the config file.
///
/// Nested keys are separated by `__`, e.g. `GAMELOG_CONNECTIONS__MAIN__HOST`.
pub const ENV_PREFIX: &str = "GAMELOG_";

/// Load the engine configuration from an optional TOML file layered under
/// `GAMELOG_` environment variables, then validate it.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    load_config_with_prefix(path, ENV_PREFIX)
}

fn load_config_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<EngineConfig> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Loading config file");
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed(env_prefix).split("__"));

    let config: EngineConfig = figment
        .extract()
        .map_err(|e| Error::Config(e.to_string()))?;
    config.validate().map_err(Error::Config)?;
    Ok(config)
}
