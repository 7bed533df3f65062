//! Cron-like recurrence evaluation.
//!
//! Schedules carry five fields (minute, hour, day-of-month, month,
//! day-of-week), each either the wildcard `*` or one explicit integer.
//! [`next_run`] computes the first minute-aligned instant strictly after a
//! reference timestamp that satisfies every field, or adds a fixed period
//! when one is configured.
//!
//! Day-of-month and day-of-week follow classic cron semantics: when both are
//! restricted a day matches if *either* matches; otherwise the restricted one
//! (if any) must match.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use jotter_core::cron::{next_run, CronSpec};
//!
//! let spec: CronSpec = "0 * * * *".parse().unwrap();
//! let from = Utc.with_ymd_and_hms(2026, 10, 18, 10, 30, 0).unwrap();
//! let next = next_run(&spec, from, None).unwrap();
//! assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 18, 11, 0, 0).unwrap());
//! ```

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::defaults::CRON_SEARCH_YEARS;
use crate::error::{Error, Result};

/// A single cron field: wildcard or one explicit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CronField {
    Any,
    Value(u32),
}

impl CronField {
    /// Parse a field and check it against an inclusive range.
    pub fn parse(raw: &str, name: &str, range: RangeInclusive<u32>) -> Result<Self> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Self::Any);
        }
        let value: u32 = raw.parse().map_err(|_| {
            Error::InvalidInput(format!("{name} must be '*' or an integer, got '{raw}'"))
        })?;
        if !range.contains(&value) {
            return Err(Error::InvalidInput(format!(
                "{name} must be within {}..={}, got {value}",
                range.start(),
                range.end()
            )));
        }
        Ok(Self::Value(value))
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Value(v) => *v == value,
        }
    }

    fn candidates(&self, full: RangeInclusive<u32>) -> RangeInclusive<u32> {
        match self {
            Self::Any => full,
            Self::Value(v) => *v..=*v,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Five-field recurrence specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CronSpec {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
}

impl CronSpec {
    /// Build a spec from its five textual fields, validating each range.
    pub fn from_fields(
        minute: &str,
        hour: &str,
        day_of_month: &str,
        month: &str,
        day_of_week: &str,
    ) -> Result<Self> {
        Ok(Self {
            minute: CronField::parse(minute, "minute", 0..=59)?,
            hour: CronField::parse(hour, "hour", 0..=23)?,
            day_of_month: CronField::parse(day_of_month, "day_of_month", 1..=31)?,
            month: CronField::parse(month, "month", 1..=12)?,
            day_of_week: CronField::parse(day_of_week, "day_of_week", 0..=7)?,
        })
    }

    /// Spec matching every minute.
    pub fn every_minute() -> Self {
        Self {
            minute: CronField::Any,
            hour: CronField::Any,
            day_of_month: CronField::Any,
            month: CronField::Any,
            day_of_week: CronField::Any,
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.month.matches(date.month()) {
            return false;
        }
        let dom_ok = self.day_of_month.matches(date.day());
        let weekday = date.weekday().num_days_from_sunday();
        let dow_ok = match self.day_of_week {
            CronField::Any => true,
            // 0 and 7 both mean Sunday
            CronField::Value(v) => v % 7 == weekday,
        };
        if self.day_of_month.is_restricted() && self.day_of_week.is_restricted() {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        }
    }

    /// Earliest (hour, minute) on a matching day, optionally not before `floor`.
    fn first_time_from(&self, floor: Option<(u32, u32)>) -> Option<(u32, u32)> {
        for hour in self.hour.candidates(0..=23) {
            for minute in self.minute.candidates(0..=59) {
                match floor {
                    Some(bound) if (hour, minute) < bound => continue,
                    _ => return Some((hour, minute)),
                }
            }
        }
        None
    }
}

impl FromStr for CronSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        match fields.as_slice() {
            [minute, hour, dom, month, dow] => Self::from_fields(minute, hour, dom, month, dow),
            _ => Err(Error::InvalidInput(format!(
                "cron expression needs 5 fields, got {} in '{s}'",
                fields.len()
            ))),
        }
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

/// Compute the next run strictly after `from`.
///
/// With `period_seconds` the cron fields are ignored and the result is
/// `from + period_seconds`; the period must be positive.
pub fn next_run(
    spec: &CronSpec,
    from: DateTime<Utc>,
    period_seconds: Option<i64>,
) -> Result<DateTime<Utc>> {
    if let Some(period) = period_seconds {
        if period <= 0 {
            return Err(Error::InvalidInput(format!(
                "period_seconds must be positive, got {period}"
            )));
        }
        return from
            .checked_add_signed(Duration::seconds(period))
            .ok_or_else(|| Error::InvalidInput("period_seconds overflows timestamp".into()));
    }

    let floored = from
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .ok_or_else(|| Error::Internal("cannot truncate timestamp to minute".into()))?;
    let start = floored + Duration::minutes(1);
    let start_date = start.date_naive();
    let start_time = (start.hour(), start.minute());

    let max_days = (CRON_SEARCH_YEARS * 366) as u64;
    for offset in 0..=max_days {
        let Some(date) = start_date.checked_add_days(Days::new(offset)) else {
            break;
        };
        if !spec.day_matches(date) {
            continue;
        }
        let floor = (offset == 0).then_some(start_time);
        if let Some((hour, minute)) = spec.first_time_from(floor) {
            let naive = date
                .and_hms_opt(hour, minute, 0)
                .ok_or_else(|| Error::Internal(format!("invalid time {hour}:{minute}")))?;
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(Error::InvalidInput(format!(
        "cron expression '{spec}' never matches within {CRON_SEARCH_YEARS} years"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn spec(s: &str) -> CronSpec {
        s.parse().unwrap()
    }

    #[test]
    fn test_top_of_hour() {
        let next = next_run(&spec("0 * * * *"), at(2026, 10, 18, 10, 30, 0), None).unwrap();
        assert_eq!(next, at(2026, 10, 18, 11, 0, 0));
    }

    #[test]
    fn test_fixed_hour_rolls_to_next_day() {
        let next = next_run(&spec("0 5 * * *"), at(2026, 10, 18, 10, 30, 0), None).unwrap();
        assert_eq!(next, at(2026, 10, 19, 5, 0, 0));
    }

    #[test]
    fn test_never_returns_reference_itself() {
        let from = at(2026, 10, 18, 11, 0, 0);
        let next = next_run(&spec("0 * * * *"), from, None).unwrap();
        assert_eq!(next, at(2026, 10, 18, 12, 0, 0));
    }

    #[test]
    fn test_seconds_are_truncated() {
        let next = next_run(&spec("* * * * *"), at(2026, 10, 18, 10, 30, 45), None).unwrap();
        assert_eq!(next, at(2026, 10, 18, 10, 31, 0));
    }

    #[test]
    fn test_month_rollover() {
        let next = next_run(&spec("0 0 1 * *"), at(2026, 1, 31, 23, 59, 0), None).unwrap();
        assert_eq!(next, at(2026, 2, 1, 0, 0, 0));
    }

    #[test]
    fn test_year_rollover() {
        let next = next_run(&spec("30 6 * * *"), at(2026, 12, 31, 7, 0, 0), None).unwrap();
        assert_eq!(next, at(2027, 1, 1, 6, 30, 0));
    }

    #[test]
    fn test_leap_day() {
        let next = next_run(&spec("0 0 29 2 *"), at(2025, 3, 1, 0, 0, 0), None).unwrap();
        assert_eq!(next, at(2028, 2, 29, 0, 0, 0));
    }

    #[test]
    fn test_day_31_skips_short_months() {
        let next = next_run(&spec("0 12 31 * *"), at(2026, 4, 1, 0, 0, 0), None).unwrap();
        assert_eq!(next, at(2026, 5, 31, 12, 0, 0));
    }

    #[test]
    fn test_day_of_week_only() {
        // 2026-10-18 is a Sunday; next Friday is the 23rd.
        let next = next_run(&spec("0 9 * * 5"), at(2026, 10, 18, 12, 0, 0), None).unwrap();
        assert_eq!(next, at(2026, 10, 23, 9, 0, 0));
    }

    #[test]
    fn test_sunday_as_seven() {
        let next = next_run(&spec("0 8 * * 7"), at(2026, 10, 17, 12, 0, 0), None).unwrap();
        assert_eq!(next, at(2026, 10, 18, 8, 0, 0));
    }

    #[test]
    fn test_day_of_month_and_week_are_ored() {
        // The 20th (a Tuesday) comes before the next Friday.
        let next = next_run(&spec("0 9 20 * 5"), at(2026, 10, 18, 12, 0, 0), None).unwrap();
        assert_eq!(next, at(2026, 10, 20, 9, 0, 0));

        // Friday the 23rd comes before the 25th.
        let next = next_run(&spec("0 9 25 * 5"), at(2026, 10, 18, 12, 0, 0), None).unwrap();
        assert_eq!(next, at(2026, 10, 23, 9, 0, 0));
    }

    #[test]
    fn test_month_restriction_with_day_of_week() {
        // First Monday in March 2027 is the 1st.
        let next = next_run(&spec("0 0 * 3 1"), at(2026, 10, 18, 0, 0, 0), None).unwrap();
        assert_eq!(next, at(2027, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_period_override_ignores_fields() {
        let from = at(2026, 10, 18, 10, 30, 12);
        let next = next_run(&spec("0 5 1 1 *"), from, Some(300)).unwrap();
        assert_eq!(next, from + Duration::seconds(300));

        let next = next_run(&CronSpec::every_minute(), from, Some(30)).unwrap();
        assert_eq!(next, at(2026, 10, 18, 10, 30, 42));
    }

    #[test]
    fn test_non_positive_period_rejected() {
        let from = at(2026, 10, 18, 10, 30, 0);
        assert!(next_run(&CronSpec::every_minute(), from, Some(0)).is_err());
        assert!(next_run(&CronSpec::every_minute(), from, Some(-5)).is_err());
    }

    #[test]
    fn test_unsatisfiable_spec_errors() {
        let err = next_run(&spec("0 0 30 2 *"), at(2026, 1, 1, 0, 0, 0), None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_result_is_minimal_and_strictly_greater() {
        let from = at(2026, 2, 27, 23, 58, 59);
        for expr in ["* * * * *", "59 23 * * *", "0 0 * * *", "15 * 28 2 *"] {
            let s = spec(expr);
            let next = next_run(&s, from, None).unwrap();
            assert!(next > from, "{expr}: {next} <= {from}");
            // Nothing between from and next matches.
            let mut cursor = from
                .with_second(0)
                .unwrap()
                .checked_add_signed(Duration::minutes(1))
                .unwrap();
            while cursor < next {
                assert!(
                    !(s.day_matches(cursor.date_naive())
                        && s.hour.matches(cursor.hour())
                        && s.minute.matches(cursor.minute())),
                    "{expr}: {cursor} matches before {next}"
                );
                cursor += Duration::minutes(1);
            }
        }
    }

    #[test]
    fn test_parse_rejects_bad_fields() {
        assert!("0 * * *".parse::<CronSpec>().is_err());
        assert!("60 * * * *".parse::<CronSpec>().is_err());
        assert!("0 24 * * *".parse::<CronSpec>().is_err());
        assert!("0 0 0 * *".parse::<CronSpec>().is_err());
        assert!("0 0 * 13 *".parse::<CronSpec>().is_err());
        assert!("0 0 * * 8".parse::<CronSpec>().is_err());
        assert!("*/5 * * * *".parse::<CronSpec>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let s = spec("5 4 * 12 0");
        assert_eq!(s.to_string(), "5 4 * 12 0");
        assert_eq!(CronField::Any.to_string(), "*");
    }
}
