// dbvault/src/policy/retention.rs
//! Scheduling gate, pruning selection and restore selection.
//!
//! All three order records the same way: newer `last_modified` first, and on
//! equal timestamps the lexicographically greater key counts as newer.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use crate::storage::BackupRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Due,
    NotDue {
        last_backup: DateTime<Utc>,
        next_due: DateTime<Utc>,
    },
}

fn recency(a: &BackupRecord, b: &BackupRecord) -> Ordering {
    a.last_modified
        .cmp(&b.last_modified)
        .then_with(|| a.key.cmp(&b.key))
}

/// The most recent record, if any.
pub fn latest(records: &[BackupRecord]) -> Option<&BackupRecord> {
    records.iter().max_by(|a, b| recency(a, b))
}

/// A new backup is due unless the newest one is younger than `min_interval`.
pub fn check_schedule(
    now: DateTime<Utc>,
    records: &[BackupRecord],
    min_interval: Duration,
) -> Eligibility {
    let Some(last) = latest(records) else {
        return Eligibility::Due;
    };
    if now - last.last_modified < min_interval {
        Eligibility::NotDue {
            last_backup: last.last_modified,
            next_due: last.last_modified + min_interval,
        }
    } else {
        Eligibility::Due
    }
}

/// Records beyond the `keep` newest, oldest last.
pub fn select_for_pruning(records: &[BackupRecord], keep: usize) -> Vec<BackupRecord> {
    let mut ordered: Vec<&BackupRecord> = records.iter().collect();
    ordered.sort_by(|a, b| recency(b, a));
    ordered.into_iter().skip(keep).cloned().collect()
}
