//! Repeat rules and next-occurrence calculation.
//!
//! Two rule forms are understood:
//!
//! * `d <n>` repeats every `n` days, `1 <= n <= 400`;
//! * `y` repeats every calendar year on the start date's month and day.
//!
//! Nothing here performs I/O or logs; callers decide how to report errors.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate};

use crate::datetime::{format_compact_date, is_strictly_after, parse_compact_date};

pub const MAX_DAILY_INTERVAL: u32 = 400;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecurrenceError {
    #[error("repeat rule is empty")]
    EmptyRule,

    #[error("invalid start date {value:?}: expected YYYYMMDD")]
    InvalidStartDate { value: String },

    #[error("malformed repeat rule {rule:?}")]
    MalformedRule { rule: String },

    #[error("invalid daily interval {value:?}: expected `d <1-400>`")]
    InvalidDailyInterval { value: String },

    #[error("unsupported repeat rule: {token}")]
    UnsupportedRule { token: String },

    #[error("no occurrence after {start} fits in the supported date range")]
    OutOfRange { start: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatRule {
    Daily(NonZeroU32),
    Yearly,
}

impl FromStr for RepeatRule {
    type Err = RecurrenceError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        if rule.is_empty() {
            return Err(RecurrenceError::EmptyRule);
        }

        let tokens: Vec<&str> = rule.split_whitespace().collect();
        let Some((&head, rest)) = tokens.split_first() else {
            return Err(RecurrenceError::MalformedRule {
                rule: rule.to_string(),
            });
        };

        match head {
            "d" => {
                let [value] = rest else {
                    return Err(RecurrenceError::InvalidDailyInterval {
                        value: rule.to_string(),
                    });
                };
                parse_daily_interval(value).map(Self::Daily)
            }
            "y" => Ok(Self::Yearly),
            other => Err(RecurrenceError::UnsupportedRule {
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily(days) => write!(f, "d {days}"),
            Self::Yearly => f.write_str("y"),
        }
    }
}

impl RepeatRule {
    /// First occurrence strictly after `now`, counting whole steps from
    /// `start`. At least one step is always taken, so `start` itself is
    /// never returned.
    ///
    /// Yearly steps are anchored on `start`: a Feb 29 start lands on Feb 28
    /// in common years and on Feb 29 again in leap years.
    pub fn next_after(&self, start: NaiveDate, now: NaiveDate) -> Result<NaiveDate, RecurrenceError> {
        let out_of_range = || RecurrenceError::OutOfRange {
            start: format_compact_date(start),
        };

        let mut steps: u32 = 0;
        loop {
            steps = steps.checked_add(1).ok_or_else(out_of_range)?;
            let candidate = self.advance(start, steps).ok_or_else(out_of_range)?;
            if is_strictly_after(&candidate, &now) {
                return Ok(candidate);
            }
        }
    }

    fn advance(&self, start: NaiveDate, steps: u32) -> Option<NaiveDate> {
        match self {
            Self::Daily(days) => {
                let total = u64::from(days.get()) * u64::from(steps);
                start.checked_add_days(Days::new(total))
            }
            Self::Yearly => start.checked_add_months(Months::new(steps.checked_mul(12)?)),
        }
    }
}

/// Next occurrence of `rule` after `now`, starting from the `YYYYMMDD`
/// date `start`.
///
/// Checks run in a fixed order: empty rule, start date, rule shape.
pub fn next_date(now: NaiveDate, start: &str, rule: &str) -> Result<String, RecurrenceError> {
    if rule.is_empty() {
        return Err(RecurrenceError::EmptyRule);
    }

    let start = parse_compact_date(start)
        .map_err(|err| RecurrenceError::InvalidStartDate { value: err.value })?;
    let rule: RepeatRule = rule.parse()?;

    rule.next_after(start, now).map(format_compact_date)
}

// Digits only: "+5" and "-5" are rejected, "007" is read as 7.
fn parse_daily_interval(value: &str) -> Result<NonZeroU32, RecurrenceError> {
    let invalid = || RecurrenceError::InvalidDailyInterval {
        value: value.to_string(),
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let days: u32 = value.parse().map_err(|_| invalid())?;
    if days > MAX_DAILY_INTERVAL {
        return Err(invalid());
    }
    NonZeroU32::new(days).ok_or_else(invalid)
}
