use time::{OffsetDateTime, UtcOffset};

/// Source of "now" for every timestamp the store writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// UTC, whole seconds.
pub fn truncate_to_seconds(value: OffsetDateTime) -> OffsetDateTime {
    let value = value.to_offset(UtcOffset::UTC);
    value.replace_nanosecond(0).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::truncate_to_seconds;
    use time::macros::datetime;

    #[test]
    fn truncate_drops_subsecond_precision_and_normalizes_offset() {
        let value = datetime!(2025-09-27 13:15:42.987 +03:00);
        let truncated = truncate_to_seconds(value);
        assert_eq!(truncated, datetime!(2025-09-27 10:15:42 UTC));
        assert_eq!(truncated.nanosecond(), 0);
    }
}
