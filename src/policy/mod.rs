// dbvault/src/policy/mod.rs
//! Periodicity classes and the retention table that drives them.

pub mod naming;
pub mod retention;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use serde::Deserialize;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Periodicity {
    pub const ALL: [Periodicity; 4] = [
        Periodicity::Daily,
        Periodicity::Weekly,
        Periodicity::Monthly,
        Periodicity::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Periodicity::Daily => "daily",
            Periodicity::Weekly => "weekly",
            Periodicity::Monthly => "monthly",
            Periodicity::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Periodicity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Periodicity::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "unknown periodicity '{}', expected one of daily, weekly, monthly, yearly",
                    s
                ))
            })
    }
}

/// Rules for one periodicity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClassPolicy {
    /// Minimum age of the newest backup before another one is taken.
    pub min_interval_secs: i64,
    /// How many of the newest backups survive pruning.
    pub keep: usize,
}

impl ClassPolicy {
    pub fn min_interval(&self) -> Duration {
        Duration::seconds(self.min_interval_secs)
    }
}

/// The periodicity table. Retention is count based: the `keep` newest
/// backups of a class survive regardless of how old they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    classes: BTreeMap<Periodicity, ClassPolicy>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        let hour = 60 * 60;
        let day = 24 * hour;
        let classes = [
            (Periodicity::Daily, 23 * hour),
            (Periodicity::Weekly, 6 * day),
            (Periodicity::Monthly, 21 * day),
            (Periodicity::Yearly, 360 * day),
        ]
        .into_iter()
        .map(|(p, secs)| {
            (
                p,
                ClassPolicy {
                    min_interval_secs: secs,
                    keep: 4,
                },
            )
        })
        .collect();
        RetentionPolicy { classes }
    }
}

impl RetentionPolicy {
    pub fn class(&self, periodicity: Periodicity) -> ClassPolicy {
        self.classes[&periodicity]
    }

    /// Default table with the classes present in `json` replaced.
    pub fn from_json(json: &str) -> Result<Self> {
        let overrides: BTreeMap<Periodicity, ClassPolicy> = serde_json::from_str(json)
            .map_err(|e| AppError::Config(format!("invalid retention policy: {}", e)))?;

        let mut policy = RetentionPolicy::default();
        for (periodicity, class) in overrides {
            if class.min_interval_secs < 0 {
                return Err(AppError::Config(format!(
                    "retention policy for {} has a negative min_interval_secs",
                    periodicity
                )));
            }
            if class.keep == 0 {
                return Err(AppError::Config(format!(
                    "retention policy for {} must keep at least one backup",
                    periodicity
                )));
            }
            policy.classes.insert(periodicity, class);
        }
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "failed to read retention policy file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_intervals_and_counts() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.class(Periodicity::Daily).min_interval(), Duration::hours(23));
        assert_eq!(policy.class(Periodicity::Weekly).min_interval(), Duration::days(6));
        assert_eq!(policy.class(Periodicity::Monthly).min_interval(), Duration::weeks(3));
        assert_eq!(policy.class(Periodicity::Yearly).min_interval(), Duration::days(360));
        for p in Periodicity::ALL {
            assert_eq!(policy.class(p).keep, 4);
        }
    }

    #[test]
    fn periodicity_parses_case_insensitively() -> anyhow::Result<()> {
        assert_eq!("weekly".parse::<Periodicity>()?, Periodicity::Weekly);
        assert_eq!(" Yearly ".parse::<Periodicity>()?, Periodicity::Yearly);
        assert!("hourly".parse::<Periodicity>().is_err());
        Ok(())
    }

    #[test]
    fn json_overrides_only_named_classes() -> anyhow::Result<()> {
        let policy = RetentionPolicy::from_json(
            r#"{"daily": {"min_interval_secs": 3600, "keep": 7}}"#,
        )?;
        assert_eq!(policy.class(Periodicity::Daily).keep, 7);
        assert_eq!(policy.class(Periodicity::Daily).min_interval(), Duration::hours(1));
        assert_eq!(policy.class(Periodicity::Weekly), RetentionPolicy::default().class(Periodicity::Weekly));
        Ok(())
    }

    #[test]
    fn json_rejects_zero_keep_and_unknown_classes() {
        assert!(RetentionPolicy::from_json(r#"{"weekly": {"min_interval_secs": 1, "keep": 0}}"#).is_err());
        assert!(RetentionPolicy::from_json(r#"{"hourly": {"min_interval_secs": 1, "keep": 2}}"#).is_err());
    }
}
