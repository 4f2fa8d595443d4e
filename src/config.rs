use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/rowguard.toml";
const ENV_PREFIX: &str = "ROWGUARD";

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database path, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrmSettings {
    /// Rows fetched per page when streaming a collection
    #[serde(default = "default_portion_size")]
    pub portion_size: u64,
    /// Wrap `drop()` cascades in one transaction
    #[serde(default)]
    pub transactional_cascades: bool,
    /// Stamp `created_at`/`updated_at` when those columns exist
    #[serde(default = "default_true")]
    pub auto_timestamps: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheSettings {
    /// TTL applied when a caller does not pass one
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OrmConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub orm: OrmSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

fn default_portion_size() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for OrmSettings {
    fn default() -> Self {
        Self {
            portion_size: default_portion_size(),
            transactional_cascades: false,
            auto_timestamps: true,
        }
    }
}

impl OrmConfig {
    /// Load the configuration from `config/rowguard.toml`, falling back to env vars.
    ///
    /// Environment variables use the `ROWGUARD` prefix and `__` as the section
    /// separator, e.g. `ROWGUARD__ORM__PORTION_SIZE=100`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when neither the file nor the environment yield a
    /// valid configuration.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Same as [`OrmConfig::load`] with an explicit file path
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when neither the file nor the environment yield a
    /// valid configuration.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // an unreadable file should not hide a usable environment
                if std::path::Path::new(path).exists() {
                    log::warn!("failed to load config file {path}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        settings.try_deserialize::<OrmConfig>().map_err(|e| {
            ConfigError::Message(format!("Configuration could not be loaded from file or environment: {e}"))
        })
    }
}
