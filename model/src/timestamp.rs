use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

/// ISO-8601 with millisecond precision and a numeric offset, the same layout the
/// original listener shipped by default.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported timestamp format pattern: {pattern}")]
pub struct TimestampFormatError {
    pub pattern: String,
}

/// A strftime pattern, checked once at configuration time so that formatting during
/// row building cannot fail mid-batch.
#[derive(Debug, Clone)]
pub struct TimestampFormatter {
    pattern: String,
}

impl TimestampFormatter {
    pub fn new(pattern: &str) -> Result<Self, TimestampFormatError> {
        let pattern = pattern.trim();
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(TimestampFormatError {
                pattern: pattern.to_string(),
            });
        }

        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    pub fn format(&self, value: DateTime<Local>) -> String {
        value.format(&self.pattern).to_string()
    }
}

impl Default for TimestampFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_FORMAT).expect("default timestamp format is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_format_renders_iso_8601() {
        let formatter = TimestampFormatter::default();
        let value = Local.with_ymd_and_hms(2024, 3, 5, 13, 45, 6).unwrap();

        let rendered = formatter.format(value);
        assert!(rendered.starts_with("2024-03-05T13:45:06.000"), "{rendered}");
    }

    #[test]
    fn test_invalid_pattern_is_rejected_at_construction() {
        let result = TimestampFormatter::new("%Y-%Q");
        assert!(result.is_err());
    }

    #[test]
    fn test_pattern_is_trimmed() {
        let formatter = TimestampFormatter::new(" %H:%M:%S ").unwrap();
        let value = Local.with_ymd_and_hms(2024, 3, 5, 13, 45, 6).unwrap();

        assert_eq!(formatter.format(value), "13:45:06");
    }
}
