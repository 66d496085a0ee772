use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Handler reference prefix must not be empty")]
    EmptyReferencePrefix,

    #[error("Handler reference prefix '{prefix}' must not start with a letter, digit or whitespace")]
    InvalidReferencePrefix { prefix: String },

    #[error("max_interaction_depth must be positive")]
    InvalidInteractionDepth,

    #[error("Wait timeout must be positive when set")]
    ZeroWaitTimeout,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_handlers(config)?;
    validate_wait(config)?;
    Ok(())
}

fn validate_handlers(config: &Config) -> Result<(), ValidationError> {
    let prefix = &config.handlers.reference_prefix;

    let Some(first) = prefix.chars().next() else {
        return Err(ValidationError::EmptyReferencePrefix);
    };

    // Plain words must never parse as handler references
    if first.is_alphanumeric() || first.is_whitespace() {
        return Err(ValidationError::InvalidReferencePrefix {
            prefix: prefix.clone(),
        });
    }

    if config.handlers.max_interaction_depth == 0 {
        return Err(ValidationError::InvalidInteractionDepth);
    }

    Ok(())
}

fn validate_wait(config: &Config) -> Result<(), ValidationError> {
    if config.wait.timeout.is_some_and(|t| t.is_zero()) {
        return Err(ValidationError::ZeroWaitTimeout);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_prefix() {
        let mut config = Config::default();
        config.handlers.reference_prefix = String::new();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyReferencePrefix)
        ));
    }

    #[test]
    fn test_alphanumeric_prefix() {
        let mut config = Config::default();
        config.handlers.reference_prefix = "x".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidReferencePrefix { .. })
        ));
    }

    #[test]
    fn test_zero_depth() {
        let mut config = Config::default();
        config.handlers.max_interaction_depth = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidInteractionDepth)
        ));
    }

    #[test]
    fn test_zero_wait_timeout() {
        let mut config = Config::default();
        config.wait.timeout = Some(HumanDuration::from_millis(0));

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroWaitTimeout)
        ));
    }
}
