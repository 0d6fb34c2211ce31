//! TOML loading and config hashing

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, parses and validates a configuration file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use doc_harvester::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Configured sites: {}", config.sites.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Hex SHA-256 of the configuration file as stored on disk
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_bytes(&std::fs::read(path)?))
}

/// Loads a configuration together with the hash recorded on crawl runs
///
/// The file is read once, so the hash always describes the rules that were
/// actually parsed.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_bytes(content.as_bytes())))
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
