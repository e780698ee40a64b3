//! Resume point computation.
//!
//! Two directions:
//! - [`build_fetch_params`] turns a stored resume value into connector
//!   parameters for the next fetch
//! - [`extract_next_resume_point`] derives the next resume value from a
//!   freshly fetched batch
//!
//! Timestamp resume values are stored as epoch milliseconds and re-encoded
//! per [`TimestampFormat`] on the way out. Neither direction fails: values
//! that cannot be interpreted are skipped.

use crate::cursor::{CursorConfig, CursorStrategy, TimestampFormat};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use conduit_connector::Params;
use conduit_filter::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A stored resume value and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// Resume value. `null` means start from the beginning.
    pub value: Value,
    /// Strategy that produced the value.
    pub strategy: CursorStrategy,
}

impl ResumePoint {
    /// Creates a resume point.
    pub fn new(value: Value, strategy: CursorStrategy) -> Self {
        Self { value, strategy }
    }

    /// Returns true if there is nothing to resume from.
    pub fn is_empty(&self) -> bool {
        self.value.is_null()
    }
}

/// Interprets a JSON value as a UTC timestamp.
///
/// Accepts epoch-millisecond numbers, numeric strings (as milliseconds),
/// RFC 3339 strings, naive `YYYY-MM-DDTHH:MM:SS[.fff]` strings (as UTC) and
/// plain dates.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                None => {
                    let f = n.as_f64().filter(|f| f.is_finite())?;
                    f.floor() as i64
                }
            };
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(millis) = s.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Interprets a record value as a UTC timestamp in `format`.
///
/// Under [`TimestampFormat::EpochS`] numbers and numeric strings are
/// seconds; every other format reads them as milliseconds. Date strings are
/// accepted under any format.
pub fn decode_timestamp(value: &Value, format: TimestampFormat) -> Option<DateTime<Utc>> {
    if format != TimestampFormat::EpochS {
        return parse_timestamp(value);
    }
    let seconds_to_millis = |secs: i64| secs.checked_mul(1000);
    let millis = match value {
        Value::Number(n) => match n.as_i64() {
            Some(secs) => seconds_to_millis(secs)?,
            None => {
                let f = n.as_f64().filter(|f| f.is_finite())?;
                let millis = (f * 1000.0).floor();
                if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
                    return None;
                }
                millis as i64
            }
        },
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(secs) => seconds_to_millis(secs)?,
            Err(_) => return parse_timestamp(value),
        },
        _ => return None,
    };
    Utc.timestamp_millis_opt(millis).single()
}

/// Encodes a timestamp for a connector parameter.
pub fn encode_timestamp(ts: DateTime<Utc>, format: TimestampFormat) -> Value {
    match format {
        TimestampFormat::Iso => Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        TimestampFormat::EpochMs => Value::from(ts.timestamp_millis()),
        TimestampFormat::EpochS => Value::from(ts.timestamp_millis().div_euclid(1000)),
        TimestampFormat::Date => Value::String(
            ts.to_rfc3339_opts(SecondsFormat::Millis, true)
                .chars()
                .take(10)
                .collect(),
        ),
    }
}

/// Builds the parameters for the next fetch.
///
/// Returns `params` unchanged when there is no resume value, no cursor
/// configuration, or the strategy is `find_all`. Otherwise the resume value
/// is injected under the configured action parameter.
pub fn build_fetch_params(
    params: &Params,
    resume: Option<&Value>,
    strategy: CursorStrategy,
    cursor: Option<&CursorConfig>,
) -> Params {
    let (Some(value), Some(cursor)) = (resume.filter(|v| !v.is_null()), cursor) else {
        return params.clone();
    };

    let injected = match strategy {
        CursorStrategy::FindAll => return params.clone(),
        CursorStrategy::FindByCursor | CursorStrategy::FindById => value.clone(),
        CursorStrategy::FindByTimestamp => match parse_timestamp(value) {
            Some(ts) => encode_timestamp(ts, cursor.format),
            None => {
                tracing::warn!(
                    kind = "checkpoint_corrupt",
                    param = cursor.action_param(),
                    value = %value,
                    "stored resume value is not a timestamp; fetching from the beginning"
                );
                return params.clone();
            }
        },
    };

    params.clone().with(cursor.action_param(), injected)
}

/// Computes the resume value implied by a batch of records.
///
/// `current_cursor` is the connector-reported cursor, used by
/// `find_by_cursor`. Returns `null` when the batch yields nothing usable.
pub fn extract_next_resume_point(
    records: &[Value],
    strategy: CursorStrategy,
    cursor: Option<&CursorConfig>,
    current_cursor: Option<&str>,
) -> Value {
    match strategy {
        CursorStrategy::FindAll => Value::Null,
        CursorStrategy::FindByCursor => current_cursor
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        CursorStrategy::FindByTimestamp => {
            let Some(cursor) = cursor else {
                return Value::Null;
            };
            records
                .iter()
                .filter_map(|record| lookup_path(record, &cursor.field))
                .filter_map(|value| decode_timestamp(value, cursor.format))
                .max()
                .map(|ts| Value::from(ts.timestamp_millis()))
                .unwrap_or(Value::Null)
        }
        CursorStrategy::FindById => {
            let Some(cursor) = cursor else {
                return Value::Null;
            };
            records
                .iter()
                .filter_map(|record| lookup_path(record, &cursor.field))
                .filter(|v| v.is_number() || v.is_string())
                .fold(None::<&Value>, |max, candidate| match max {
                    None => Some(candidate),
                    Some(current) => match compare_ids(candidate, current) {
                        Some(Ordering::Greater) => Some(candidate),
                        _ => Some(current),
                    },
                })
                .cloned()
                .unwrap_or(Value::Null)
        }
    }
}

// Numbers compare numerically, strings lexicographically; mixed types are unordered.
fn compare_ids(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Combines a stored resume value with a newly extracted one.
///
/// `null` candidates never replace a stored value, and ordered strategies
/// never move backward.
pub fn advance(previous: &Value, candidate: Value, strategy: CursorStrategy) -> Value {
    if candidate.is_null() {
        return previous.clone();
    }
    if previous.is_null() {
        return candidate;
    }

    let newer = match strategy {
        CursorStrategy::FindAll => return Value::Null,
        CursorStrategy::FindByCursor => true,
        CursorStrategy::FindByTimestamp => match (parse_timestamp(&candidate), parse_timestamp(previous)) {
            (Some(c), Some(p)) => c > p,
            (Some(_), None) => true,
            (None, _) => false,
        },
        CursorStrategy::FindById => compare_ids(&candidate, previous) == Some(Ordering::Greater),
    };

    if newer {
        candidate
    } else {
        previous.clone()
    }
}
