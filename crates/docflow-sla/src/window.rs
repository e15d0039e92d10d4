//! SLA window string parsing (`<n>m`, `<n>h`).

use thiserror::Error;

/// Errors parsing an SLA window expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The suffix is not `m` or `h`, or the prefix isn't a valid integer.
    #[error("unsupported_window:{0}")]
    Unsupported(String),
}

/// Parse a window string like `"5m"` or `"1h"` into seconds. Only minute and
/// hour suffixes are supported; anything else (including a bare number or a
/// seconds suffix) is rejected.
///
/// # Errors
/// Returns [`WindowError::Unsupported`] for any string that isn't
/// `<integer>m` or `<integer>h`.
pub fn parse_window(raw: &str) -> Result<i64, WindowError> {
    let trimmed = raw.trim().to_lowercase();

    if let Some(digits) = trimmed.strip_suffix('m') {
        return digits
            .parse::<i64>()
            .map(|mins| mins * 60)
            .map_err(|_| WindowError::Unsupported(raw.to_string()));
    }
    if let Some(digits) = trimmed.strip_suffix('h') {
        return digits
            .parse::<i64>()
            .map(|hours| hours * 3600)
            .map_err(|_| WindowError::Unsupported(raw.to_string()));
    }

    Err(WindowError::Unsupported(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_and_hours_parse() {
        assert_eq!(parse_window("5m"), Ok(300));
        assert_eq!(parse_window("1h"), Ok(3600));
        assert_eq!(parse_window("15m"), Ok(900));
    }

    #[test]
    fn seconds_suffix_unsupported() {
        let err = parse_window("5s").expect_err("should reject seconds");
        assert_eq!(err, WindowError::Unsupported("5s".to_string()));
    }

    #[test]
    fn bare_number_unsupported() {
        assert!(parse_window("5").is_err());
    }
}
