use crate::config::types::{
    ArchiveConfig, CaptureConfig, Config, CrawlerConfig, HostConfig, SettleConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_capture_config(&config.capture)?;
    validate_crawler_config(&config.crawler)?;
    validate_settle_config(&config.settle)?;
    validate_archive_config(&config.archive)?;
    validate_host_config(&config.host)?;
    Ok(())
}

/// Validates capture configuration
fn validate_capture_config(config: &CaptureConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.seed_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "seed-url must use an http or https scheme, got '{}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "seed-url '{}' has no host",
            config.seed_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth > 10 {
        return Err(ConfigError::Validation(format!(
            "max-depth must be between 0 and 10, got {}",
            config.max_depth
        )));
    }

    if config.workers < 1 || config.workers > 16 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 16, got {}",
            config.workers
        )));
    }

    if config.task_delay_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "task-delay-ms must be <= 60000ms, got {}ms",
            config.task_delay_ms
        )));
    }

    Ok(())
}

/// Validates settle detection timings
fn validate_settle_config(config: &SettleConfig) -> Result<(), ConfigError> {
    if config.idle_ms < 500 {
        return Err(ConfigError::Validation(format!(
            "idle-ms must be >= 500ms, got {}ms",
            config.idle_ms
        )));
    }

    if config.poll_ms < 100 || config.poll_ms > 5_000 {
        return Err(ConfigError::Validation(format!(
            "poll-ms must be between 100 and 5000ms, got {}ms",
            config.poll_ms
        )));
    }

    // A ceiling below the idle window could never be reached
    if config.max_wait_ms < config.idle_ms {
        return Err(ConfigError::Validation(format!(
            "max-wait-ms ({}ms) must be >= idle-ms ({}ms)",
            config.max_wait_ms, config.idle_ms
        )));
    }

    if config.tab_load_timeout_ms < 1_000 {
        return Err(ConfigError::Validation(format!(
            "tab-load-timeout-ms must be >= 1000ms, got {}ms",
            config.tab_load_timeout_ms
        )));
    }

    Ok(())
}

/// Validates archive output configuration
fn validate_archive_config(config: &ArchiveConfig) -> Result<(), ConfigError> {
    if config.output_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output-path cannot be empty".to_string(),
        ));
    }

    if !config.output_path.ends_with(".zip") {
        return Err(ConfigError::Validation(format!(
            "output-path must end with '.zip', got '{}'",
            config.output_path
        )));
    }

    Ok(())
}

/// Validates HTTP-backed host configuration
fn validate_host_config(config: &HostConfig) -> Result<(), ConfigError> {
    if config.state_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "state-dir cannot be empty".to_string(),
        ));
    }

    if config.download_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "download-dir cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}
