//! Engine configuration.
//!
//! Configuration is an explicit value handed to [`crate::Tagging::new`].
//! It can be built in code, deserialized with serde, or loaded from
//! environment variables (`TAGGING_*` prefixed):
//!
//! ```rust
//! use tagging_core::TaggingConfig;
//!
//! let config = TaggingConfig::default().with_force_lowercase(true);
//! assert!(config.force_lowercase);
//! assert_eq!(config.max_tag_length, 50);
//! ```

use std::env;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults;
use crate::error::{Error, Result};

/// Options recognized by the tagging engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Lowercase every tag name before lookup and creation.
    pub force_lowercase: bool,
    /// Maximum number of characters in a tag name.
    pub max_tag_length: usize,
    /// Split tag input only on this character instead of the
    /// comma/whitespace rules, and render with it.
    pub forced_delimiter: Option<char>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            force_lowercase: defaults::FORCE_LOWERCASE,
            max_tag_length: defaults::MAX_TAG_LENGTH,
            forced_delimiter: None,
        }
    }
}

impl TaggingConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether tag names are lowercased.
    pub fn with_force_lowercase(mut self, force: bool) -> Self {
        self.force_lowercase = force;
        self
    }

    /// Set the maximum tag name length.
    pub fn with_max_tag_length(mut self, max: usize) -> Self {
        self.max_tag_length = max;
        self
    }

    /// Force a single delimiter character.
    pub fn with_forced_delimiter(mut self, delimiter: Option<char>) -> Self {
        self.forced_delimiter = delimiter;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = env::var(defaults::ENV_FORCE_LOWERCASE) {
            config.force_lowercase = parse_bool(defaults::ENV_FORCE_LOWERCASE, &value)?;
        }

        if let Ok(value) = env::var(defaults::ENV_MAX_TAG_LENGTH) {
            config.max_tag_length = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a positive integer, got '{}'",
                    defaults::ENV_MAX_TAG_LENGTH,
                    value
                ))
            })?;
        }

        if let Ok(value) = env::var(defaults::ENV_FORCE_DELIMITER) {
            let mut chars = value.chars();
            config.forced_delimiter = match (chars.next(), chars.next()) {
                (None, _) => None,
                (Some(c), None) => Some(c),
                _ => {
                    return Err(Error::Config(format!(
                        "{} must be a single character, got '{}'",
                        defaults::ENV_FORCE_DELIMITER,
                        value
                    )))
                }
            };
        }

        config.validate()?;
        debug!(
            force_lowercase = config.force_lowercase,
            max_tag_length = config.max_tag_length,
            forced_delimiter = ?config.forced_delimiter,
            "Loaded tagging config from environment"
        );
        Ok(config)
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_tag_length == 0 {
            return Err(Error::Config(
                "max_tag_length must be at least 1".to_string(),
            ));
        }
        if let Some(delimiter) = self.forced_delimiter {
            if delimiter == '"' || delimiter.is_whitespace() {
                return Err(Error::Config(format!(
                    "forced_delimiter cannot be {:?}",
                    delimiter
                )));
            }
        }
        Ok(())
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            var, value
        ))),
    }
}
