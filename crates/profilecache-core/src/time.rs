use time::OffsetDateTime;
use time::macros::format_description;

use crate::error::{CoreError, Result};

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_unix_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).map_err(|e| {
        CoreError::invalid_timestamp(format!("Invalid unix millis {millis}: {e}"))
    })
}

/// Formats unix milliseconds as a UTC ISO-8601 string with millisecond
/// precision and a `Z` suffix, e.g. `2015-10-03T22:44:17.910Z`.
pub fn format_iso8601_millis(millis: i64) -> Result<String> {
    let datetime = from_unix_millis(millis)?;
    datetime
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .map_err(|e| CoreError::invalid_timestamp(format!("Cannot format {millis}: {e}")))
}
