use super::{types::Config, ConfigError};

/// Validate configuration beyond what serde enforces structurally.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.catalog.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "catalog.url cannot be empty".to_string(),
        ));
    }

    if config.discovery.lookback_minutes <= 0 {
        return Err(ConfigError::ValidationError(
            "discovery.lookback_minutes must be positive".to_string(),
        ));
    }

    if config.discovery.min_age_hours < 0 {
        return Err(ConfigError::ValidationError(
            "discovery.min_age_hours cannot be negative".to_string(),
        ));
    }

    let roi = &config.discovery.roi;
    if roi.lon_min >= roi.lon_max || roi.lat_min >= roi.lat_max {
        return Err(ConfigError::ValidationError(
            "discovery.roi bounding box is degenerate".to_string(),
        ));
    }

    if config.download.workers == 0 || config.processing.workers == 0 {
        return Err(ConfigError::ValidationError(
            "worker pool sizes must be at least 1".to_string(),
        ));
    }

    if config.download.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "download.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.download.retry_delay_secs.is_empty() {
        return Err(ConfigError::ValidationError(
            "download.retry_delay_secs cannot be empty".to_string(),
        ));
    }

    if config.download.soft_time_limit_secs >= config.download.hard_time_limit_secs {
        return Err(ConfigError::ValidationError(
            "download.soft_time_limit_secs must be below the hard limit".to_string(),
        ));
    }

    for (name, value) in [
        ("quality.max_missing_pct", config.quality.max_missing_pct),
        ("quality.max_solar_zenith", config.quality.max_solar_zenith),
    ] {
        if !(0.0..=180.0).contains(&value) {
            return Err(ConfigError::ValidationError(format!(
                "{} out of range: {}",
                name, value
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[catalog]
url = "https://data.example.org"
key = "k"
secret = "s"
collection = "C"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = valid_config();
        config.download.workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_retry_schedule_fails() {
        let mut config = valid_config();
        config.download.retry_delay_secs = vec![];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_soft_limit_above_hard_fails() {
        let mut config = valid_config();
        config.download.soft_time_limit_secs = 2000;
        config.download.hard_time_limit_secs = 1200;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_degenerate_roi_fails() {
        let mut config = valid_config();
        config.discovery.roi.lon_min = 3.0;
        config.discovery.roi.lon_max = 2.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_negative_lookback_fails() {
        let mut config = valid_config();
        config.discovery.lookback_minutes = 0;
        assert!(validate_config(&config).is_err());
    }
}
