//! Due-date parsing for CREATE_TASK actions.
//!
//! Accepts relative offsets like `+3 days`, `+1 week`, `+12 hours`, or an
//! absolute RFC 3339 / `YYYY-MM-DD` date.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

use leadflow_core::error::{CrmError, CrmResult};

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\+(\d+)\s*(day|days|week|weeks|hour|hours)$")
            .expect("valid relative date pattern")
    })
}

/// Parse a due-date string relative to `now`.
pub fn parse_due_date_from(input: &str, now: DateTime<Utc>) -> CrmResult<DateTime<Utc>> {
    let input = input.trim();

    if let Some(caps) = relative_re().captures(input) {
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| CrmError::InvalidDate(input.to_string()))?;
        let unit = caps[2].to_ascii_lowercase();
        let offset = if unit.starts_with("day") {
            Duration::days(amount)
        } else if unit.starts_with("week") {
            Duration::weeks(amount)
        } else {
            Duration::hours(amount)
        };
        return Ok(now + offset);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| CrmError::InvalidDate(input.to_string()))?;
        return Ok(midnight.and_utc());
    }

    Err(CrmError::InvalidDate(input.to_string()))
}

/// Parse a due-date string relative to the current time.
pub fn parse_due_date(input: &str) -> CrmResult<DateTime<Utc>> {
    parse_due_date_from(input, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_days() {
        let parsed = parse_due_date("+3 days").unwrap();
        let expected = Utc::now() + Duration::days(3);
        assert!((parsed - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_relative_weeks() {
        let parsed = parse_due_date("+2 weeks").unwrap();
        let expected = Utc::now() + Duration::days(14);
        assert!((parsed - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_relative_hours_no_space_case_insensitive() {
        let now = Utc::now();
        let parsed = parse_due_date_from("+12HOURS", now).unwrap();
        assert_eq!(parsed, now + Duration::hours(12));
    }

    #[test]
    fn test_singular_units() {
        let now = Utc::now();
        assert_eq!(
            parse_due_date_from("+1 day", now).unwrap(),
            now + Duration::days(1)
        );
        assert_eq!(
            parse_due_date_from("+1 week", now).unwrap(),
            now + Duration::weeks(1)
        );
    }

    #[test]
    fn test_absolute_date() {
        let parsed = parse_due_date("2030-01-01").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_absolute_rfc3339() {
        let parsed = parse_due_date("2030-06-15T09:30:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2030-06-15T09:30:00+00:00");
    }

    #[test]
    fn test_unparseable_is_error() {
        assert!(matches!(
            parse_due_date("next Tuesday"),
            Err(CrmError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_due_date("+3 months"),
            Err(CrmError::InvalidDate(_))
        ));
    }
}
