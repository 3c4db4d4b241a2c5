//! Environment variable loading with typed parsing and default handling.

use std::env;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

/// Environment variable loader with type conversion and validation.
pub struct EnvLoader;

impl EnvLoader {
    /// Load a required environment variable.
    pub fn load_required<T>(key: &str) -> EngineResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = env::var(key).map_err(|_| {
            EngineError::configuration(format!("missing environment variable {}", key))
        })?;

        value
            .parse()
            .map_err(|e| EngineError::configuration(format!("{}: {}", key, e)))
    }

    /// Load an optional environment variable, falling back to `default`.
    pub fn load_with_default<T>(key: &str, default: T) -> EngineResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => value
                .parse()
                .map_err(|e| EngineError::configuration(format!("{}: {}", key, e))),
            Err(_) => Ok(default),
        }
    }

    /// Load an optional environment variable.
    pub fn load_optional<T>(key: &str) -> EngineResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => value
                .parse()
                .map(Some)
                .map_err(|e| EngineError::configuration(format!("{}: {}", key, e))),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_used_when_unset() {
        let port: u16 = EnvLoader::load_with_default("DEFENSE_TEST_UNSET_PORT", 9000).unwrap();
        assert_eq!(port, 9000);
    }

    #[test]
    fn parse_failure_is_configuration_error() {
        env::set_var("DEFENSE_TEST_BAD_PORT", "not-a-port");
        let result: EngineResult<u16> = EnvLoader::load_with_default("DEFENSE_TEST_BAD_PORT", 1);
        assert!(result.is_err());
        env::remove_var("DEFENSE_TEST_BAD_PORT");
    }
}
