mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, ConnectionSettings, LoggingSettings, ProcessingSettings, RetrySettings,
    ServerSettings, Settings,
};

/// Prefix for environment overrides, e.g. `ORDERFLOW__BROKER__PORT=1884`.
pub const ENV_PREFIX: &str = "ORDERFLOW";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing every section
pub fn load_config() -> Result<Settings, ConfigError> {
    // A missing .env file is the normal case outside development.
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
