use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Engine timeout is not 0
/// - FLAC compression level is within 0-12
/// - Live session cap, when set, is not 0
/// - Host progress poll interval is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Engine validation
    if config.engine.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.timeout_secs cannot be 0".to_string(),
        ));
    }

    if let Some(level) = config.engine.flac_compression_level {
        if level > 12 {
            return Err(ConfigError::ValidationError(format!(
                "engine.flac_compression_level must be 0-12, got {}",
                level
            )));
        }
    }

    // Session validation
    if config.sessions.max_live_sessions == Some(0) {
        return Err(ConfigError::ValidationError(
            "sessions.max_live_sessions cannot be 0".to_string(),
        ));
    }

    // Host validation
    if config.host.progress_poll_ms == 0 {
        return Err(ConfigError::ValidationError(
            "host.progress_poll_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::engine::EngineConfig;
    use crate::service::SessionConfig;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_timeout_zero_fails() {
        let config = Config {
            engine: EngineConfig::default().with_timeout(0),
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_flac_level() {
        let config = Config {
            engine: EngineConfig::default().with_flac_compression(12),
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());

        let config = Config {
            engine: EngineConfig::default().with_flac_compression(13),
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("flac_compression_level"));
    }

    #[test]
    fn test_validate_zero_session_cap_fails() {
        let config = Config {
            sessions: SessionConfig::default().with_max_live_sessions(0),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_poll_interval_zero_fails() {
        let config = Config {
            host: HostConfig::default().with_progress_poll_ms(0),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
