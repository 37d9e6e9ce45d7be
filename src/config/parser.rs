use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let config: Config = toml::from_str(&content)?;

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between runs,
/// since a resumed run must see the same thresholds the original run used.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[orchestrator]
max-retries = 2
retirement-threshold = 3
zero-streak-limit = 3
max-pages-per-task = 500
workers-per-identity = 2
fetch-timeout-secs = 30
page-delay-ms = 250

[backoff]
base-secs = 2.0
cap-secs = 300.0
rate-limit-secs = 60.0
identity-cooldown-secs = 120.0
parse-error-limit = 2

[api]
endpoint = "https://api.example.com/graphql"
identities-path = "./identities.json"
backlog-path = "./backlog.txt"

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.orchestrator.max_retries, 2);
        assert_eq!(config.orchestrator.max_pages_per_task, 500);
        assert_eq!(config.orchestrator.workers_per_identity, 2);
        assert_eq!(config.backoff.rate_limit_secs, 60.0);
        assert_eq!(config.api.endpoint, "https://api.example.com/graphql");
    }

    #[test]
    fn test_load_config_applies_defaults() {
        let config_content = r#"
[orchestrator]

[api]
endpoint = "https://api.example.com/graphql"
identities-path = "./identities.json"
backlog-path = "./backlog.txt"

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.orchestrator.max_retries, 2);
        assert_eq!(config.orchestrator.retirement_threshold, 3);
        assert_eq!(config.orchestrator.zero_streak_limit, 3);
        assert_eq!(config.orchestrator.max_pages_per_task, 1000);
        assert_eq!(config.backoff.base_secs, 2.0);
        assert_eq!(config.backoff.parse_error_limit, 2);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[orchestrator]
zero-streak-limit = 0

[api]
endpoint = "https://api.example.com/graphql"
identities-path = "./identities.json"
backlog-path = "./backlog.txt"

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let config_content = "test content";
        let file = create_temp_config(config_content);

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
