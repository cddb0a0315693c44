/*
    report.rs - What a sync pass did

    Reports are plain data returned to callers (the CLI prints them, the
    service keeps the last outcome for a "sync failed" indicator).
*/

use crate::core_store::model::{ReplicaId, Timestamp};
use serde::Serialize;
use std::fmt;

/// Result of reconciling one collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,

    /// Records read from the local copy
    pub local_count: usize,

    /// Records read from the shared copy
    pub shared_count: usize,

    /// Records in the reconciled sequence
    pub merged_count: usize,

    /// Records filtered out because their identity is tombstoned
    pub removed_by_tombstone: usize,

    /// Records without a usable identity
    pub dropped_without_identity: usize,

    /// Repeated identities within one side (an identity present on both
    /// sides is an overlap, not a duplicate)
    pub duplicates_dropped: usize,

    /// Whether the reconciled sequence differs from what each side held
    pub local_changed: bool,
    pub shared_changed: bool,
}

/// Result of one full pass over every collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub replica_id: ReplicaId,
    pub started_at: Timestamp,
    pub duration_ms: u64,

    /// Size of the merged tombstone set
    pub tombstones: usize,
    pub tombstones_changed: bool,

    pub collections: Vec<CollectionReport>,
}

impl SyncReport {
    /// True when the pass found both sides already converged
    pub fn is_noop(&self) -> bool {
        !self.tombstones_changed
            && self.collections.iter().all(|c| !c.local_changed && !c.shared_changed)
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == name)
    }
}

/// Why a pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Sync switched off for this replica
    Disabled,
    /// No shared location configured
    NoSharedLocation,
    /// Shared location configured but not reachable right now
    SharedLocationUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "sync disabled"),
            SkipReason::NoSharedLocation => write!(f, "no shared location configured"),
            SkipReason::SharedLocationUnavailable => write!(f, "shared location unavailable"),
        }
    }
}

/// Pass-level result surfaced to collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped { reason: SkipReason },
    Failed { error: String },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(changed: bool) -> SyncReport {
        SyncReport {
            replica_id: ReplicaId::new("r1".to_string()),
            started_at: Timestamp::from_millis(0),
            duration_ms: 1,
            tombstones: 0,
            tombstones_changed: false,
            collections: vec![CollectionReport {
                collection: "history".to_string(),
                local_changed: changed,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_is_noop() {
        assert!(report(false).is_noop());
        assert!(!report(true).is_noop());
    }

    #[test]
    fn test_outcome_accessors() {
        let done = SyncOutcome::Completed(report(false));
        assert!(done.is_completed());
        assert!(done.report().unwrap().collection("history").is_some());

        let failed = SyncOutcome::Failed { error: "disk full".to_string() };
        assert!(failed.is_failed());
        assert!(failed.report().is_none());
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::Disabled.to_string(), "sync disabled");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let skipped = SyncOutcome::Skipped { reason: SkipReason::NoSharedLocation };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "no_shared_location");
    }
}
