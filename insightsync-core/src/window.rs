//! Query window resolution.
//!
//! A window is either an explicit `since`/`until` override pair or the
//! default lookback ending yesterday. Override dates only get a shape check
//! (`YYYY-MM-DD` by character position); they are passed through verbatim.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default number of days to look back when no override is supplied.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("expected date in YYYY-MM-DD format, got: {value}")]
    DateFormat { value: String },

    #[error("lookback of {lookback_days} days from {today} is outside the supported date range")]
    LookbackOutOfRange { lookback_days: u32, today: NaiveDate },
}

/// Inclusive `[since, until]` date range, carried as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    since: String,
    until: String,
}

impl Window {
    /// Build a window from two calendar dates.
    pub fn from_dates(since: NaiveDate, until: NaiveDate) -> Self {
        Self {
            since: since.format(DATE_FORMAT).to_string(),
            until: until.format(DATE_FORMAT).to_string(),
        }
    }

    pub fn since(&self) -> &str {
        &self.since
    }

    pub fn until(&self) -> &str {
        &self.until
    }

    /// JSON `time_range` value expected by the insights endpoint.
    pub fn time_range_json(&self) -> String {
        serde_json::json!({ "since": self.since, "until": self.until }).to_string()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.since, self.until)
    }
}

/// Optional explicit window bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowOverrides {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl WindowOverrides {
    pub fn new(since: impl Into<String>, until: impl Into<String>) -> Self {
        Self {
            since: Some(since.into()),
            until: Some(until.into()),
        }
    }

    fn pair(&self) -> Option<(&str, &str)> {
        let since = self.since.as_deref().filter(|s| !s.is_empty())?;
        let until = self.until.as_deref().filter(|s| !s.is_empty())?;
        Some((since, until))
    }

    fn is_partial(&self) -> bool {
        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        has(&self.since) != has(&self.until)
    }
}

/// Shape check for an override date: exact length 10, hyphens at 4 and 7.
///
/// Deliberately lax: `9999-99-99` passes.
pub fn check_date_shape(value: &str) -> Result<&str, ValidationError> {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(ValidationError::DateFormat {
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Resolve the query window relative to `today`.
pub fn resolve_window(
    overrides: &WindowOverrides,
    lookback_days: u32,
    today: NaiveDate,
) -> Result<Window, ValidationError> {
    if let Some((since, until)) = overrides.pair() {
        return Ok(Window {
            since: check_date_shape(since)?.to_string(),
            until: check_date_shape(until)?.to_string(),
        });
    }

    if overrides.is_partial() {
        tracing::warn!(
            since = ?overrides.since,
            until = ?overrides.until,
            "only one window override supplied, falling back to lookback window"
        );
    }

    let out_of_range = || ValidationError::LookbackOutOfRange {
        lookback_days,
        today,
    };
    let since = today
        .checked_sub_signed(Duration::days(i64::from(lookback_days)))
        .ok_or_else(out_of_range)?;
    let until = today
        .checked_sub_signed(Duration::days(1))
        .ok_or_else(out_of_range)?;
    Ok(Window::from_dates(since, until))
}

/// [`resolve_window`] against the local calendar date.
pub fn resolve_window_now(
    overrides: &WindowOverrides,
    lookback_days: u32,
) -> Result<Window, ValidationError> {
    resolve_window(overrides, lookback_days, chrono::Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn override_pair_returned_verbatim() {
        let w = resolve_window(
            &WindowOverrides::new("2024-01-01", "2024-01-31"),
            14,
            day(2024, 6, 1),
        )
        .unwrap();
        assert_eq!(w.since(), "2024-01-01");
        assert_eq!(w.until(), "2024-01-31");
    }

    #[test]
    fn default_window_ends_yesterday() {
        let w = resolve_window(&WindowOverrides::default(), 14, day(2024, 3, 15)).unwrap();
        assert_eq!(w.since(), "2024-03-01");
        assert_eq!(w.until(), "2024-03-14");
    }

    #[test]
    fn default_window_crosses_year_boundary() {
        let w = resolve_window(&WindowOverrides::default(), 7, day(2024, 1, 3)).unwrap();
        assert_eq!(w.since(), "2023-12-27");
        assert_eq!(w.until(), "2024-01-02");
    }

    #[test]
    fn slash_separated_override_rejected() {
        let err = resolve_window(
            &WindowOverrides::new("2024/01/01", "2024-01-31"),
            14,
            day(2024, 6, 1),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DateFormat {
                value: "2024/01/01".into()
            }
        );
    }

    #[test]
    fn wrong_length_override_rejected() {
        assert!(check_date_shape("2024-1-01").is_err());
        assert!(check_date_shape("2024-01-011").is_err());
        assert!(check_date_shape("").is_err());
    }

    #[test]
    fn shape_check_is_lax() {
        assert_eq!(check_date_shape("9999-99-99").unwrap(), "9999-99-99");
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        assert!(check_date_shape("2024-01-é1").is_err());
        assert!(check_date_shape("ééééé").is_err());
    }

    #[test]
    fn single_override_falls_back_to_lookback() {
        let overrides = WindowOverrides {
            since: Some("2024-01-01".into()),
            until: None,
        };
        let w = resolve_window(&overrides, 2, day(2024, 6, 10)).unwrap();
        assert_eq!(w.since(), "2024-06-08");
        assert_eq!(w.until(), "2024-06-09");
    }

    #[test]
    fn empty_overrides_count_as_absent() {
        let w = resolve_window(&WindowOverrides::new("", ""), 1, day(2024, 6, 10)).unwrap();
        assert_eq!(w.since(), "2024-06-09");
        assert_eq!(w.until(), "2024-06-09");
    }

    #[test]
    fn huge_lookback_is_an_error() {
        let err = resolve_window(&WindowOverrides::default(), 1_000_000_000, day(2024, 6, 10))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::LookbackOutOfRange {
                lookback_days: 1_000_000_000,
                today: day(2024, 6, 10),
            }
        );
        assert!(resolve_window(&WindowOverrides::default(), u32::MAX, day(2024, 6, 10)).is_err());
    }

    #[test]
    fn time_range_json_has_both_bounds() {
        let w = Window::from_dates(day(2024, 5, 1), day(2024, 5, 7));
        let v: serde_json::Value = serde_json::from_str(&w.time_range_json()).unwrap();
        assert_eq!(v["since"], "2024-05-01");
        assert_eq!(v["until"], "2024-05-07");
        assert_eq!(w.to_string(), "2024-05-01 to 2024-05-07");
    }
}
