//! Instance status taxonomy used for quota accounting.
//!
//! Every recognized status belongs to exactly one bucket:
//!
//! - **stable** (`running`, `stopped`, `error`): counted in used quota
//! - **transitional** (`creating`, `resetting`): counted in pending quota
//! - **terminal** (`deleting`, `deleted`, `failed`): counted in neither
//!
//! Unrecognized strings belong to no bucket.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Error,
    Creating,
    Resetting,
    Deleting,
    Deleted,
    Failed,
}

pub const STABLE_STATUSES: &[InstanceStatus] = &[
    InstanceStatus::Running,
    InstanceStatus::Stopped,
    InstanceStatus::Error,
];

pub const TRANSITIONAL_STATUSES: &[InstanceStatus] =
    &[InstanceStatus::Creating, InstanceStatus::Resetting];

pub const TERMINAL_STATUSES: &[InstanceStatus] = &[
    InstanceStatus::Deleting,
    InstanceStatus::Deleted,
    InstanceStatus::Failed,
];

/// Rows in these states are already on their way out and are never
/// re-examined by reconciliation. `failed` is terminal for quota purposes
/// but still has a live record, so it is not part of this set.
pub const DELETION_STATUSES: &[InstanceStatus] =
    &[InstanceStatus::Deleted, InstanceStatus::Deleting];

impl InstanceStatus {
    pub const ALL: &'static [InstanceStatus] = &[
        InstanceStatus::Running,
        InstanceStatus::Stopped,
        InstanceStatus::Error,
        InstanceStatus::Creating,
        InstanceStatus::Resetting,
        InstanceStatus::Deleting,
        InstanceStatus::Deleted,
        InstanceStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Error => "error",
            InstanceStatus::Creating => "creating",
            InstanceStatus::Resetting => "resetting",
            InstanceStatus::Deleting => "deleting",
            InstanceStatus::Deleted => "deleted",
            InstanceStatus::Failed => "failed",
        }
    }

    /// Exact, case-sensitive match against the recognized set.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    pub fn bucket(&self) -> QuotaBucket {
        match self {
            InstanceStatus::Running | InstanceStatus::Stopped | InstanceStatus::Error => {
                QuotaBucket::Stable
            }
            InstanceStatus::Creating | InstanceStatus::Resetting => QuotaBucket::Transitional,
            InstanceStatus::Deleting | InstanceStatus::Deleted | InstanceStatus::Failed => {
                QuotaBucket::Terminal
            }
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBucket {
    Stable,
    Transitional,
    Terminal,
}

fn member_of(set: &[InstanceStatus], status: &str) -> bool {
    set.iter().any(|s| s.as_str() == status)
}

pub fn is_stable(status: &str) -> bool {
    member_of(STABLE_STATUSES, status)
}

pub fn is_transitional(status: &str) -> bool {
    member_of(TRANSITIONAL_STATUSES, status)
}

pub fn is_terminal(status: &str) -> bool {
    member_of(TERMINAL_STATUSES, status)
}

pub fn is_deletion(status: &str) -> bool {
    member_of(DELETION_STATUSES, status)
}

pub fn classify(status: &str) -> Option<QuotaBucket> {
    InstanceStatus::parse(status).map(|s| s.bucket())
}

/// Per-bucket instance counts for one provider or user.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct QuotaUsage {
    pub used: i64,
    pub pending: i64,
    pub released: i64,
    pub unclassified: i64,
}

impl QuotaUsage {
    pub fn add(&mut self, status: &str, count: i64) {
        match classify(status) {
            Some(QuotaBucket::Stable) => self.used += count,
            Some(QuotaBucket::Transitional) => self.pending += count,
            Some(QuotaBucket::Terminal) => self.released += count,
            None => self.unclassified += count,
        }
    }

    pub fn from_counts<'a>(counts: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        let mut usage = Self::default();
        for (status, count) in counts {
            usage.add(status, count);
        }
        usage
    }

    /// Instances that hold or are about to hold capacity.
    pub fn reserved(&self) -> i64 {
        self.used + self.pending
    }
}
