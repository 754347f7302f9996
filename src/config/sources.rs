use super::ResponderConfig;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "ARCHSTREAM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "archstream.toml";
const ENV_PREFIX: &str = "ARCHSTREAM";
const ENV_SEPARATOR: &str = "__";

/// Load from the file named by `ARCHSTREAM_CONFIG` (or the default path)
/// and environment overrides.
pub fn load() -> Result<ResponderConfig, ConfigError> {
    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load from a specific file plus environment overrides
pub fn load_from_sources(config_path: PathBuf) -> Result<ResponderConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // ARCHSTREAM__CHUNK_SIZE -> chunk_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config, ResponderConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "chunk_size = 1048576\n").unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.chunk_size(), 1024 * 1024);
        assert_eq!(config.scheme, "kiwix");
    }
}
