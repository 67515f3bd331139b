// dbvault/src/policy/naming.rs
use chrono::{DateTime, TimeZone};

use super::Periodicity;

pub const KEY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d__%H-%M-%S";

/// Bucket holding one periodicity class: `<base>.<periodicity>`.
pub fn namespace(bucket_base: &str, periodicity: Periodicity) -> String {
    format!("{}.{}", bucket_base, periodicity)
}

/// Object key for a backup taken at `taken_at`, rendered in its own zone.
pub fn object_key<Tz: TimeZone>(periodicity: Periodicity, taken_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}-db-{}.sql.gz.enc",
        periodicity,
        taken_at.format(KEY_TIMESTAMP_FORMAT)
    )
}
