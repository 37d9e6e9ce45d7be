use crate::config::types::{ApiConfig, BackoffConfig, Config, OrchestratorConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_orchestrator_config(&config.orchestrator)?;
    validate_backoff_config(&config.backoff)?;
    validate_api_config(&config.api)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates orchestrator configuration
fn validate_orchestrator_config(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    if config.zero_streak_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "zero_streak_limit must be >= 1, got {}",
            config.zero_streak_limit
        )));
    }

    if config.retirement_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "retirement_threshold must be >= 1, got {}",
            config.retirement_threshold
        )));
    }

    if config.max_pages_per_task < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages_per_task must be >= 1, got {}",
            config.max_pages_per_task
        )));
    }

    if config.workers_per_identity < 1 || config.workers_per_identity > 16 {
        return Err(ConfigError::Validation(format!(
            "workers_per_identity must be between 1 and 16, got {}",
            config.workers_per_identity
        )));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_secs must be >= 1, got {}",
            config.fetch_timeout_secs
        )));
    }

    Ok(())
}

/// Validates backoff configuration
fn validate_backoff_config(config: &BackoffConfig) -> Result<(), ConfigError> {
    if config.base_secs <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "base_secs must be > 0, got {}",
            config.base_secs
        )));
    }

    if config.cap_secs < config.base_secs {
        return Err(ConfigError::Validation(format!(
            "cap_secs ({}) must be >= base_secs ({})",
            config.cap_secs, config.base_secs
        )));
    }

    if config.identity_cooldown_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "identity_cooldown_secs must be >= 0, got {}",
            config.identity_cooldown_secs
        )));
    }

    Ok(())
}

/// Validates API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "endpoint must use http or https scheme, got '{}'",
            url.scheme()
        )));
    }

    if config.identities_path.is_empty() {
        return Err(ConfigError::Validation(
            "identities_path cannot be empty".to_string(),
        ));
    }

    if config.backlog_path.is_empty() {
        return Err(ConfigError::Validation(
            "backlog_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            orchestrator: OrchestratorConfig {
                max_retries: 2,
                retirement_threshold: 3,
                zero_streak_limit: 3,
                max_pages_per_task: 1000,
                workers_per_identity: 1,
                fetch_timeout_secs: 30,
                page_delay_ms: 250,
            },
            backoff: BackoffConfig::default(),
            api: ApiConfig {
                endpoint: "https://api.example.com/search".to_string(),
                identities_path: "./identities.json".to_string(),
                backlog_path: "./backlog.txt".to_string(),
            },
            output: OutputConfig {
                database_path: "./harrow.db".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_zero_streak_limit_rejected_at_zero() {
        let mut config = valid_config();
        config.orchestrator.zero_streak_limit = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_retirement_threshold_rejected_at_zero() {
        let mut config = valid_config();
        config.orchestrator.retirement_threshold = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_workers_per_identity_bounds() {
        let mut config = valid_config();
        config.orchestrator.workers_per_identity = 0;
        assert!(validate(&config).is_err());

        config.orchestrator.workers_per_identity = 17;
        assert!(validate(&config).is_err());

        config.orchestrator.workers_per_identity = 16;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = valid_config();
        config.api.endpoint = "not a url".to_string();
        let result = validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let mut config = valid_config();
        config.api.endpoint = "ftp://example.com/search".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_cap_below_base_rejected() {
        let mut config = valid_config();
        config.backoff.base_secs = 10.0;
        config.backoff.cap_secs = 5.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_database_path_rejected() {
        let mut config = valid_config();
        config.output.database_path = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_backlog_path_rejected() {
        let mut config = valid_config();
        config.api.backlog_path = String::new();
        assert!(validate(&config).is_err());
    }
}
