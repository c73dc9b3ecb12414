//! Environment variable configuration helpers

use std::num::ParseIntError;

use thiserror::Error;

/// Errors from the environment variable accessors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvVarError {
    #[error("environment variable '{0}' is required but not set")]
    Missing(String),

    #[error("environment variable '{key}' holds non-integer value '{value}': {source}")]
    Invalid {
        key: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Snapshot of one environment variable, captured at lookup time.
///
/// The value is read exactly once by [`env`]; later changes to the process
/// environment are not reflected.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvVar {
    key: String,
    value: Option<String>,
}

/// Look up an environment variable.
///
/// A variable set to the empty string counts as set.
pub fn env(key: impl Into<String>) -> EnvVar {
    let key = key.into();
    let value = std::env::var(&key).ok();
    EnvVar { key, value }
}

impl EnvVar {
    /// The key this binding was looked up under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the variable was set at lookup time.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// The captured value, or `fallback` when the variable was not set.
    pub fn with_default(self, fallback: impl Into<String>) -> String {
        self.value.unwrap_or_else(|| fallback.into())
    }

    /// The captured value, or [`EnvVarError::Missing`] when the variable was
    /// not set. Callers decide whether a missing value is fatal.
    pub fn required(self) -> Result<String, EnvVarError> {
        self.value.ok_or(EnvVarError::Missing(self.key))
    }

    /// Parse the captured value as an integer.
    ///
    /// Returns `Ok(fallback)` when the variable was not set, the parsed value
    /// when set to a valid integer, and [`EnvVarError::Invalid`] carrying the
    /// parse cause otherwise.
    pub fn with_default_int(self, fallback: i64) -> Result<i64, EnvVarError> {
        let EnvVar { key, value } = self;

        match value {
            None => Ok(fallback),
            Some(raw) => match raw.parse::<i64>() {
                Ok(parsed) => Ok(parsed),
                Err(source) => Err(EnvVarError::Invalid {
                    key,
                    value: raw,
                    source,
                }),
            },
        }
    }
}
