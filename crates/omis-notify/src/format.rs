use omis_core::RequestRecord;
use time::macros::format_description;
use time::UtcOffset;

/// Reminder text for a request whose status has not changed for too long.
pub fn format_delay_message(record: &RequestRecord) -> String {
    let last_update = record
        .status_updated_at
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year].[month].[day] [hour]:[minute]"
        ))
        .unwrap_or_else(|_| record.status_updated_at.to_string());

    format!(
        "⚠ Request №{} (position {}) has no updates for too long.\nCurrent status: {}.\nLast update: {}.",
        record.request_number, record.position_number, record.status, last_update
    )
}
