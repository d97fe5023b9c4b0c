//! Unit normalization for configuration scalars.
//!
//! Durations normalize to [`Duration`], sizes to bytes. Bare numbers are
//! seconds for durations, bytes for sizes and megabytes for memory limits.

use std::time::Duration;

use crate::domain::models::{ConfigValue, MemoryLimit};

use super::loader::ConfigError;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Words that mark a memory ceiling as absent.
const UNBOUNDED_WORDS: [&str; 3] = ["unbounded", "unlimited", "none"];

/// Parse a duration: integers are seconds, text goes through `humantime`.
pub fn duration(key: &str, value: &ConfigValue) -> Result<Duration, ConfigError> {
    match value {
        ConfigValue::Integer(secs) => {
            let secs = non_negative(key, value, *secs)?;
            Ok(Duration::from_secs(secs))
        }
        ConfigValue::Float(secs) => {
            let secs = non_negative_float(key, value, *secs)?;
            Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidDuration {
                key: key.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
        }
        ConfigValue::Text(text) => {
            let text = text.trim();
            if let Ok(secs) = text.parse::<i64>() {
                return duration(key, &ConfigValue::Integer(secs));
            }
            if text.starts_with('-') {
                return Err(negative(key, value));
            }
            humantime::parse_duration(text).map_err(|e| ConfigError::InvalidDuration {
                key: key.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

/// Parse a byte size: integers are bytes, text is `<number> <unit>`.
pub fn byte_size(key: &str, value: &ConfigValue) -> Result<u64, ConfigError> {
    sized(key, value, 1)
}

/// Parse a memory ceiling: integers are megabytes, the unbounded words and
/// `null` mean no ceiling.
pub fn memory_limit(key: &str, value: Option<&ConfigValue>) -> Result<MemoryLimit, ConfigError> {
    let Some(value) = value else {
        return Ok(MemoryLimit::Unbounded);
    };

    if let ConfigValue::Text(text) = value {
        let word = text.trim().to_ascii_lowercase();
        if UNBOUNDED_WORDS.contains(&word.as_str()) {
            return Ok(MemoryLimit::Unbounded);
        }
    }

    sized(key, value, MB).map(MemoryLimit::Bounded)
}

/// Shared size parser; `bare_unit` scales numbers without a suffix.
fn sized(key: &str, value: &ConfigValue, bare_unit: u64) -> Result<u64, ConfigError> {
    match value {
        ConfigValue::Integer(n) => {
            let n = non_negative(key, value, *n)?;
            n.checked_mul(bare_unit)
                .ok_or_else(|| invalid_size(key, value, "value overflows"))
        }
        ConfigValue::Float(n) => {
            let n = non_negative_float(key, value, *n)?;
            scale(key, value, n, bare_unit)
        }
        ConfigValue::Text(text) => {
            let text = text.trim();
            let split = text
                .find(|c: char| c.is_ascii_alphabetic())
                .unwrap_or(text.len());
            let (number, unit) = text.split_at(split);
            let number = number.trim();

            let amount: f64 = number
                .parse()
                .map_err(|_| invalid_size(key, value, "expected '<number> <unit>'"))?;
            let amount = non_negative_float(key, value, amount)?;

            let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
                "" => bare_unit,
                "b" => 1,
                "k" | "kb" | "kib" => KB,
                "m" | "mb" | "mib" => MB,
                "g" | "gb" | "gib" => GB,
                "t" | "tb" | "tib" => TB,
                other => {
                    return Err(invalid_size(key, value, &format!("unknown unit '{other}'")));
                }
            };

            scale(key, value, amount, multiplier)
        }
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale(key: &str, value: &ConfigValue, amount: f64, multiplier: u64) -> Result<u64, ConfigError> {
    let bytes = (amount * multiplier as f64).round();
    if bytes > u64::MAX as f64 {
        return Err(invalid_size(key, value, "value overflows"));
    }
    Ok(bytes as u64)
}

#[allow(clippy::cast_sign_loss)]
fn non_negative(key: &str, value: &ConfigValue, n: i64) -> Result<u64, ConfigError> {
    if n < 0 {
        return Err(negative(key, value));
    }
    Ok(n as u64)
}

fn non_negative_float(key: &str, value: &ConfigValue, n: f64) -> Result<f64, ConfigError> {
    if !n.is_finite() {
        return Err(ConfigError::ValidationFailed(format!(
            "{key}: '{value}' is not a finite number"
        )));
    }
    if n < 0.0 {
        return Err(negative(key, value));
    }
    Ok(n)
}

fn negative(key: &str, value: &ConfigValue) -> ConfigError {
    ConfigError::Negative {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn invalid_size(key: &str, value: &ConfigValue, reason: &str) -> ConfigError {
    ConfigError::InvalidByteSize {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ConfigValue {
        ConfigValue::text(s)
    }

    #[test]
    fn test_duration_forms() {
        assert_eq!(
            duration("k", &ConfigValue::Integer(1800)).unwrap(),
            Duration::from_secs(1800)
        );
        assert_eq!(duration("k", &text("15m")).unwrap(), Duration::from_secs(900));
        assert_eq!(
            duration("k", &text("2h 30m")).unwrap(),
            Duration::from_secs(9000)
        );
        assert_eq!(duration("k", &text("60")).unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_duration_rejects_negative_and_garbage() {
        assert!(matches!(
            duration("pilot.heartbeat", &ConfigValue::Integer(-1)),
            Err(ConfigError::Negative { .. })
        ));
        assert!(matches!(
            duration("pilot.heartbeat", &text("-5m")),
            Err(ConfigError::Negative { .. })
        ));
        assert!(matches!(
            duration("pilot.heartbeat", &text("soon")),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_float_duration_out_of_range_is_error() {
        assert_eq!(
            duration("k", &ConfigValue::Float(1.5)).unwrap(),
            Duration::from_millis(1500)
        );
        assert!(matches!(
            duration("pilot.heartbeat", &ConfigValue::Float(1e30)),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_byte_sizes() {
        assert_eq!(byte_size("k", &text("2 GB")).unwrap(), 2 * GB);
        assert_eq!(byte_size("k", &text("500 GB")).unwrap(), 500 * GB);
        assert_eq!(byte_size("k", &text("14336 MB")).unwrap(), 14336 * MB);
        assert_eq!(byte_size("k", &text("0.5 GB")).unwrap(), GB / 2);
        assert_eq!(byte_size("k", &text("1GiB")).unwrap(), GB);
        assert_eq!(byte_size("k", &text("3 kB")).unwrap(), 3 * KB);
        assert_eq!(byte_size("k", &ConfigValue::Integer(4096)).unwrap(), 4096);
    }

    #[test]
    fn test_byte_size_errors() {
        assert!(matches!(
            byte_size("k", &text("2 parsecs")),
            Err(ConfigError::InvalidByteSize { .. })
        ));
        assert!(matches!(
            byte_size("k", &text("GB")),
            Err(ConfigError::InvalidByteSize { .. })
        ));
        assert!(matches!(
            byte_size("k", &text("-1 GB")),
            Err(ConfigError::Negative { .. })
        ));
    }

    #[test]
    fn test_memory_limits() {
        assert_eq!(
            memory_limit("m", Some(&ConfigValue::Integer(1001))).unwrap(),
            MemoryLimit::Bounded(1001 * MB)
        );
        assert_eq!(
            memory_limit("m", Some(&text("2 GB"))).unwrap(),
            MemoryLimit::Bounded(2 * GB)
        );
        assert_eq!(memory_limit("m", None).unwrap(), MemoryLimit::Unbounded);
        assert_eq!(
            memory_limit("m", Some(&text("Unlimited"))).unwrap(),
            MemoryLimit::Unbounded
        );
        assert_eq!(
            memory_limit("m", Some(&ConfigValue::Integer(0))).unwrap(),
            MemoryLimit::Bounded(0)
        );
    }
}
