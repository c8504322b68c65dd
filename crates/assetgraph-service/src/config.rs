//! Configuration for the asset graph services.
//!
//! Loaded from (in priority order):
//! 1. Environment variables (`ASSETGRAPH__` prefix, `__` between sections)
//! 2. Config file (`assetgraph.toml`, optional)
//! 3. Defaults

use serde::Deserialize;

use assetgraph_graph::GraphConfig;

/// Default config file prefix.
pub const DEFAULT_CONFIG_PREFIX: &str = "assetgraph";

const ENV_PREFIX: &str = "ASSETGRAPH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub neo4j: GraphConfig,
    pub log_format: LogFormat,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl AppConfig {
    /// Load from `{file_prefix}.toml` (or any format `config` recognizes)
    /// and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
