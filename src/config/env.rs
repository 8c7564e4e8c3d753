use std::str::FromStr;

use super::ConfigError;

/// Reads an environment variable, treating blank values as unset.
pub(super) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads and parses an environment variable.
pub(super) fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{value}': {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_blank_is_unset() {
        // SAFETY: serialized with the other environment tests
        unsafe { std::env::set_var("CALLBRIDGE_TEST_BLANK", "   ") };
        assert_eq!(env_var("CALLBRIDGE_TEST_BLANK"), None);
        unsafe { std::env::remove_var("CALLBRIDGE_TEST_BLANK") };
    }

    #[test]
    #[serial]
    fn test_parse_env() {
        unsafe { std::env::set_var("CALLBRIDGE_TEST_NUM", " 42 ") };
        assert_eq!(parse_env::<u64>("CALLBRIDGE_TEST_NUM").unwrap(), Some(42));

        unsafe { std::env::set_var("CALLBRIDGE_TEST_NUM", "forty") };
        let err = parse_env::<u64>("CALLBRIDGE_TEST_NUM").unwrap_err();
        assert!(err.to_string().contains("CALLBRIDGE_TEST_NUM"));

        unsafe { std::env::remove_var("CALLBRIDGE_TEST_NUM") };
        assert_eq!(parse_env::<u64>("CALLBRIDGE_TEST_NUM").unwrap(), None);
    }
}
