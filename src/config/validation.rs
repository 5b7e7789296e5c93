//! Configuration validation.
//!
//! Validates a server descriptor before any identity connects with it.

use super::ServerConfig;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("domain is required")]
    MissingDomain,
    #[error("nick_template is empty")]
    EmptyNickTemplate,
    #[error("user_modes must be mode letters without a sign, got '{0}'")]
    InvalidUserModes(String),
    #[error("excluded_channels contains an invalid pattern '{0}': {1}")]
    InvalidExclusion(String, String),
    #[error("ipv6_prefix {0} leaves no room for per-identity addresses")]
    Ipv6PrefixTooNarrow(String),
}

/// Validate a descriptor, returning all errors found.
pub fn validate(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.domain.trim().is_empty() {
        errors.push(ValidationError::MissingDomain);
    }
    if config.nick_template.trim().is_empty() {
        errors.push(ValidationError::EmptyNickTemplate);
    }
    if !config.user_modes.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.push(ValidationError::InvalidUserModes(config.user_modes.clone()));
    }

    for pattern in &config.excluded_channels {
        if let Err(e) = glob::Pattern::new(pattern) {
            errors.push(ValidationError::InvalidExclusion(pattern.clone(), e.to_string()));
        }
    }

    if let Some(prefix) = config.ipv6_prefix
        && prefix.prefix_len() >= 128
    {
        errors.push(ValidationError::Ipv6PrefixTooNarrow(prefix.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
