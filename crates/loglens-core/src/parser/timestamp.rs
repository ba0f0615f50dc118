use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use super::error::LineError;

// CLF bracketed timestamp: `22/Aug/2024:10:30:45 +0000`.
static CLF_TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!(
    "[day]/[month repr:short]/[year]:[hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
);

/// Parses a CLF timestamp field and normalises it to UTC.
pub(crate) fn parse_clf_timestamp(value: &str) -> Result<OffsetDateTime, LineError> {
    OffsetDateTime::parse(value, CLF_TIMESTAMP)
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .map_err(|_| LineError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Formats an instant back into the CLF bracketed form (always `+0000`
/// since records are UTC-normalised at parse time).
pub(crate) fn format_clf_timestamp(ts: OffsetDateTime) -> String {
    ts.to_offset(UtcOffset::UTC)
        .format(CLF_TIMESTAMP)
        .unwrap_or_else(|_| "01/Jan/1970:00:00:00 +0000".to_string())
}
