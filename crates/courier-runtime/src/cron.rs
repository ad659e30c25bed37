//! Five-field cron expressions for recurring scheduled sends.
//!
//! `minute hour day-of-month month day-of-week`, with `*`, lists, ranges,
//! and `/step`. Day-of-week runs Sunday=0 (7 also accepted as Sunday). When
//! both day fields are restricted the date matches if either does, per the
//! classic cron rule. All times are UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Errors from parsing a cron expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronParseError {
    /// Wrong number of whitespace-separated fields.
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),
    /// A field failed to parse.
    #[error("invalid {field} field {value:?}")]
    Field {
        /// Field name.
        field: &'static str,
        /// Offending text.
        value: String,
    },
}

/// One parsed field as a bitmask of allowed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    mask: u64,
    /// Whether the field was written as a bare `*` (no list/range/step).
    is_wildcard: bool,
}

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        self.mask & (1 << value) != 0
    }
}

/// A parsed cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

fn parse_field(
    text: &str,
    min: u32,
    max: u32,
    field: &'static str,
) -> Result<FieldSet, CronParseError> {
    let err = || CronParseError::Field {
        field,
        value: text.to_string(),
    };

    if text == "*" {
        let mut mask = 0u64;
        for v in min..=max {
            mask |= 1 << v;
        }
        return Ok(FieldSet { mask, is_wildcard: true });
    }

    let mut mask = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| err())?;
                if step == 0 {
                    return Err(err());
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (lo.parse().map_err(|_| err())?, hi.parse().map_err(|_| err())?)
        } else {
            let v: u32 = range.parse().map_err(|_| err())?;
            (v, if part.contains('/') { max } else { v })
        };

        if lo < min || hi > max || lo > hi {
            return Err(err());
        }
        let mut v = lo;
        while v <= hi {
            mask |= 1 << v;
            v += step;
        }
    }
    Ok(FieldSet { mask, is_wildcard: false })
}

impl CronSchedule {
    /// Parse a five-field expression.
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], 0, 7, "day-of-week")?;
        // 7 is an alias for Sunday.
        if days_of_week.contains(7) {
            days_of_week.mask |= 1;
        }

        Ok(Self {
            minutes: parse_field(fields[0], 0, 59, "minute")?,
            hours: parse_field(fields[1], 0, 23, "hour")?,
            days_of_month: parse_field(fields[2], 1, 31, "day-of-month")?,
            months: parse_field(fields[3], 1, 12, "month")?,
            days_of_week,
        })
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        if !self.months.contains(date.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        match (self.days_of_month.is_wildcard, self.days_of_week.is_wildcard) {
            (false, false) => dom || dow,
            (false, true) => dom,
            (true, false) => dow,
            (true, true) => true,
        }
    }

    /// Next occurrence strictly after `after`.
    ///
    /// Returns `None` when no occurrence exists within four years, which
    /// only happens for impossible date combinations (e.g. Feb 30).
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut date = after.date_naive();
        let mut time_floor = Some((after.hour(), after.minute()));
        let limit = date + Duration::days(366 * 4);

        while date <= limit {
            if self.date_matches(date) {
                for hour in 0..24u32 {
                    if !self.hours.contains(hour) {
                        continue;
                    }
                    for minute in 0..60u32 {
                        if !self.minutes.contains(minute) {
                            continue;
                        }
                        // Strictly after the reference point on its own day.
                        if let Some((fh, fm)) = time_floor {
                            if (hour, minute) <= (fh, fm) {
                                continue;
                            }
                        }
                        let naive = date.and_hms_opt(hour, minute, 0)?;
                        return Some(Utc.from_utc_datetime(&naive));
                    }
                }
            }
            date += Duration::days(1);
            time_floor = None;
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn every_five_minutes() {
        let cron = CronSchedule::parse("*/5 * * * *").unwrap();
        assert_eq!(
            cron.next_after(at("2026-08-24T10:02:30Z")),
            Some(at("2026-08-24T10:05:00Z"))
        );
        // Strictly after: an exact hit moves to the next slot.
        assert_eq!(
            cron.next_after(at("2026-08-24T10:05:00Z")),
            Some(at("2026-08-24T10:10:00Z"))
        );
    }

    #[test]
    fn daily_at_nine() {
        let cron = CronSchedule::parse("0 9 * * *").unwrap();
        assert_eq!(
            cron.next_after(at("2026-08-24T09:30:00Z")),
            Some(at("2026-08-25T09:00:00Z"))
        );
        assert_eq!(
            cron.next_after(at("2026-08-24T08:00:00Z")),
            Some(at("2026-08-24T09:00:00Z"))
        );
    }

    #[test]
    fn weekday_field() {
        // Mondays at 08:00. 2026-08-24 is a Monday.
        let cron = CronSchedule::parse("0 8 * * 1").unwrap();
        assert_eq!(
            cron.next_after(at("2026-08-24T09:00:00Z")),
            Some(at("2026-08-31T08:00:00Z"))
        );
    }

    #[test]
    fn seven_is_sunday() {
        let seven = CronSchedule::parse("0 0 * * 7").unwrap();
        let zero = CronSchedule::parse("0 0 * * 0").unwrap();
        let t = at("2026-08-24T00:00:00Z");
        assert_eq!(seven.next_after(t), zero.next_after(t));
    }

    #[test]
    fn restricted_dom_and_dow_match_either() {
        // The 15th, or any Monday.
        let cron = CronSchedule::parse("0 0 15 * 1").unwrap();
        assert_eq!(
            cron.next_after(at("2026-08-28T00:00:00Z")),
            Some(at("2026-08-31T00:00:00Z")) // Monday before the next 15th
        );
        assert_eq!(
            cron.next_after(at("2026-09-14T12:00:00Z")),
            Some(at("2026-09-15T00:00:00Z"))
        );
    }

    #[test]
    fn lists_and_ranges() {
        let cron = CronSchedule::parse("0,30 9-17 * * *").unwrap();
        assert_eq!(
            cron.next_after(at("2026-08-24T17:31:00Z")),
            Some(at("2026-08-25T09:00:00Z"))
        );
        assert_eq!(
            cron.next_after(at("2026-08-24T09:05:00Z")),
            Some(at("2026-08-24T09:30:00Z"))
        );
    }

    #[test]
    fn impossible_date_yields_none() {
        let cron = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert_eq!(cron.next_after(at("2026-01-01T00:00:00Z")), None);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(
            CronSchedule::parse("* * * *"),
            Err(CronParseError::FieldCount(4))
        );
        assert!(matches!(
            CronSchedule::parse("61 * * * *"),
            Err(CronParseError::Field { field: "minute", .. })
        ));
        assert!(matches!(
            CronSchedule::parse("* * * * 9"),
            Err(CronParseError::Field { field: "day-of-week", .. })
        ));
        assert!(matches!(
            CronSchedule::parse("*/0 * * * *"),
            Err(CronParseError::Field { field: "minute", .. })
        ));
    }
}
