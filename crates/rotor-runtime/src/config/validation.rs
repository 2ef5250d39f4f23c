//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ActionsConfig, DispatchConfig, EventLoopConfig, LogOutput, RotorConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &RotorConfig) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_dispatch(&config.dispatch)?;
    validate_actions(&config.actions)?;
    validate_event_loop(&config.event_loop)?;
    Ok(())
}

fn validate_logging(config: &RotorConfig) -> ConfigResult<()> {
    let logging = &config.logging;
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter targets cannot be empty"));
    }
    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.default_wait_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Default wait timeout must be greater than 0",
        ));
    }
    Ok(())
}

/// Validates correlation id ranges.
///
/// Every range must hold at least one id and no two ranges may share one,
/// otherwise the origin of a notification would be ambiguous.
fn validate_actions(actions: &ActionsConfig) -> ConfigResult<()> {
    let ranges: Vec<_> = std::iter::once(&actions.local_tags)
        .chain(&actions.remote_tags)
        .collect();

    if let Some(empty) = ranges.iter().find(|range| range.is_empty()) {
        return Err(ConfigError::validation(format!(
            "Tag range {empty} is empty"
        )));
    }

    for (i, first) in ranges.iter().enumerate() {
        for second in &ranges[i + 1..] {
            if first.overlaps(second) {
                return Err(ConfigError::validation(format!(
                    "Tag range {first} overlaps {second}"
                )));
            }
        }
    }

    Ok(())
}

fn validate_event_loop(event_loop: &EventLoopConfig) -> ConfigResult<()> {
    if event_loop.thread_name.is_empty() {
        return Err(ConfigError::validation("Event loop thread name cannot be empty"));
    }
    if event_loop.thread_name.contains('\0') {
        return Err(ConfigError::validation(
            "Event loop thread name cannot contain NUL bytes",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rotor_core::action::TagRange;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RotorConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_range_rejected() {
        let mut config = RotorConfig::default();
        config.actions.local_tags = TagRange::new(10, 5);

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert!(err.to_string().contains("10..=5"));
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let mut config = RotorConfig::default();
        config.actions.remote_tags.push(TagRange::new(1_500_000, 1_600_000));

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = RotorConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("rotor.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = RotorConfig::default();
        config.dispatch.default_wait_timeout_ms = 0;
        assert!(validate_config(&config).is_err());
    }
}
