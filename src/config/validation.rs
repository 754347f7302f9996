use super::ResponderConfig;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("chunk_size must be at least 1 byte")]
    ZeroChunkSize,

    #[error("invalid URL scheme '{0}'")]
    InvalidScheme(String),

    #[error("blocked_scripts.suffix must not be empty")]
    EmptyBlockedSuffix,

    #[error("remote.timeout_secs must be at least 1")]
    ZeroTimeout,

    #[error("remote.max_retries must be at least 1")]
    ZeroRetries,
}

/// Validate the entire configuration
pub fn validate(config: &ResponderConfig) -> Result<(), ValidationError> {
    if config.chunk_size() == 0 {
        return Err(ValidationError::ZeroChunkSize);
    }

    // RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
    let mut chars = config.scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme {
        return Err(ValidationError::InvalidScheme(config.scheme.clone()));
    }

    if config.blocked_scripts.suffix.is_empty() {
        return Err(ValidationError::EmptyBlockedSuffix);
    }

    if config.remote.timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout);
    }
    if config.remote.max_retries == 0 {
        return Err(ValidationError::ZeroRetries);
    }

    Ok(())
}
