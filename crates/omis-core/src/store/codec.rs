use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::clock::truncate_to_seconds;
use crate::error::CoreError;
use crate::status::RequestStatus;

pub(crate) fn format_timestamp(value: OffsetDateTime) -> Result<String, CoreError> {
    truncate_to_seconds(value)
        .format(&Rfc3339)
        .map_err(CoreError::persistence)
}

/// Accepts RFC 3339 and the offset-less `YYYY-MM-DDTHH:MM:SS` form, read as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Result<OffsetDateTime, rusqlite::Error> {
    let value = value.trim();
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(truncate_to_seconds(parsed));
    }

    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .map(|parsed| parsed.assume_utc())
    .map_err(to_from_sql_error)
}

pub(crate) fn parse_status(value: &str) -> Result<RequestStatus, rusqlite::Error> {
    value.parse::<RequestStatus>().map_err(to_from_sql_error)
}

pub(crate) fn to_from_sql_error<E>(err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_status, parse_timestamp};
    use crate::status::RequestStatus;
    use time::macros::datetime;

    #[test]
    fn format_timestamp_uses_utc_seconds() {
        let formatted =
            format_timestamp(datetime!(2025-09-27 13:15:00.5 +03:00)).expect("format timestamp");
        assert_eq!(formatted, "2025-09-27T10:15:00Z");
    }

    #[test]
    fn parse_timestamp_accepts_offsetless_legacy_values() {
        let parsed = parse_timestamp("2025-09-27T10:15:00").expect("parse legacy timestamp");
        assert_eq!(parsed, datetime!(2025-09-27 10:15:00 UTC));
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn parse_status_maps_unknown_values_to_sql_errors() {
        assert_eq!(
            parse_status("on site").expect("known status"),
            RequestStatus::OnSite
        );
        assert!(matches!(
            parse_status("lost"),
            Err(rusqlite::Error::FromSqlConversionFailure(..))
        ));
    }
}
