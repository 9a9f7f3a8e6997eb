//! Parsers for the DA (`YYYYMMDD`) and TM (`HHMMSS.FFFFFF`) value representations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Invalid DA '{0}'")]
    InvalidDate(String),

    #[error("Invalid TM '{0}'")]
    InvalidTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue {
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

/// A TM value. Components missing from the source text are `None`, not zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeValue {
    pub hours: u32,
    pub minutes: Option<u32>,
    pub seconds: Option<u32>,
    /// Fraction of a second in microseconds.
    pub fractional_seconds: Option<u32>,
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(month: u32, year: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn is_valid_date(date: &DateValue) -> bool {
    (1..=12).contains(&date.month) && date.day > 0 && date.day <= days_in_month(date.month, date.year)
}

fn parse_digits(text: &str, range: std::ops::Range<usize>) -> Option<u32> {
    let digits = text.get(range)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parse a DA value.
///
/// Text that is not 8 characters long yields `Ok(None)`, or an error when
/// `validate` is set. With `validate`, impossible calendar dates are
/// rejected as well.
pub fn parse_da(date: &str, validate: bool) -> Result<Option<DateValue>, FormatError> {
    let invalid = || FormatError::InvalidDate(date.to_owned());

    let parsed = if date.len() == 8 {
        match (parse_digits(date, 0..4), parse_digits(date, 4..6), parse_digits(date, 6..8)) {
            (Some(year), Some(month), Some(day)) => Some(DateValue { year, month, day }),
            _ => None,
        }
    } else {
        None
    };

    match parsed {
        Some(value) if validate && !is_valid_date(&value) => Err(invalid()),
        Some(value) => Ok(Some(value)),
        None if validate => Err(invalid()),
        None => Ok(None),
    }
}

/// Parse a TM value. Only the hours are mandatory.
///
/// With `validate`, hours must lie in 0..=23 and minutes and seconds in
/// 0..=59. A zero minute or second is accepted without checking.
pub fn parse_tm(time: &str, validate: bool) -> Result<Option<TimeValue>, FormatError> {
    let invalid = || FormatError::InvalidTime(time.to_owned());

    if time.len() < 2 {
        return if validate { Err(invalid()) } else { Ok(None) };
    }

    let len = time.len();
    let hours = parse_digits(time, 0..2);
    let minutes = (len >= 4).then(|| parse_digits(time, 2..4));
    let seconds = (len >= 6).then(|| parse_digits(time, 4..6));
    let fractional_seconds = (len >= 8).then(|| {
        let end = len.min(13);
        parse_digits(time, 7..end).map(|fraction| fraction * 10_u32.pow((6 - (end - 7)) as u32))
    });

    let (Some(hours), Some(minutes), Some(seconds), Some(fractional_seconds)) = (
        hours,
        minutes.map_or(Some(None), |m| m.map(Some)),
        seconds.map_or(Some(None), |s| s.map(Some)),
        fractional_seconds.map_or(Some(None), |f| f.map(Some)),
    ) else {
        return if validate { Err(invalid()) } else { Ok(None) };
    };

    if validate {
        let out_of_range = |value: Option<u32>, max: u32| value.is_some_and(|v| v != 0 && v > max);
        if hours > 23
            || out_of_range(minutes, 59)
            || out_of_range(seconds, 59)
            || out_of_range(fractional_seconds, 999_999)
        {
            return Err(invalid());
        }
    }

    Ok(Some(TimeValue {
        hours,
        minutes,
        seconds,
        fractional_seconds,
    }))
}
