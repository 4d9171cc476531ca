use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Normalizes an operator-entered scheduled time to epoch seconds.
///
/// Accepts RFC 3339 timestamps, and the `YYYY-MM-DDTHH:MM[:SS]` form produced
/// by datetime pickers (a space separator also works), which carries no offset
/// and is interpreted in `offset`.
///
/// Returns `None` when the value matches none of these forms.
#[must_use]
pub fn to_unix_timestamp(scheduled_time: &str, offset: UtcOffset) -> Option<i64> {
    let raw = scheduled_time.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed.unix_timestamp());
    }

    let local = raw.replacen(' ', "T", 1);
    let with_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let without_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]");

    PrimitiveDateTime::parse(&local, with_seconds)
        .or_else(|_| PrimitiveDateTime::parse(&local, without_seconds))
        .ok()
        .map(|naive| naive.assume_offset(offset).unix_timestamp())
}
