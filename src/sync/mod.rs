//! Core sync engine: field mapping, three-way merge, conflict resolution,
//! job queue, and the orchestrator that ties them together.
//!
//! This module also owns the closed string vocabularies shared by the
//! database rows, the HTTP surface, and the engine itself. Every enum here
//! round-trips through `as_str`/`parse` so a value read back from storage
//! is either canonical or rejected, never silently coerced.

use std::fmt;

pub mod mapper;
pub mod merge;
pub mod orchestrator;
pub mod queue;
pub mod resolver;
pub mod webhook;

/// Direction of a synchronization pass between Jira and the BRD store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    JiraToBrd,
    BrdToJira,
    Bidirectional,
}

impl SyncDirection {
    /// Return the canonical string representation for this direction.
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncDirection::JiraToBrd => "jira_to_brd",
            SyncDirection::BrdToJira => "brd_to_jira",
            SyncDirection::Bidirectional => "bidirectional",
        }
    }

    /// Parse a canonical direction string, if it is one.
    pub fn parse(value: &str) -> Option<Self> {
        ALL_SYNC_DIRECTIONS
            .iter()
            .copied()
            .find(|d| d.as_str() == value)
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of directions.
pub const ALL_SYNC_DIRECTIONS: &[SyncDirection] = &[
    SyncDirection::JiraToBrd,
    SyncDirection::BrdToJira,
    SyncDirection::Bidirectional,
];

/// What a sync job is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    BulkImport,
    BulkExport,
    MappingSync,
    WebhookSync,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::BulkImport => "bulk_import",
            OperationKind::BulkExport => "bulk_export",
            OperationKind::MappingSync => "mapping_sync",
            OperationKind::WebhookSync => "webhook_sync",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_OPERATION_KINDS
            .iter()
            .copied()
            .find(|o| o.as_str() == value)
    }

    /// Bulk operations report per-item progress; single-record operations
    /// always carry a total of one.
    pub const fn is_bulk(self) -> bool {
        matches!(self, OperationKind::BulkImport | OperationKind::BulkExport)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of operations.
pub const ALL_OPERATION_KINDS: &[OperationKind] = &[
    OperationKind::Create,
    OperationKind::Update,
    OperationKind::BulkImport,
    OperationKind::BulkExport,
    OperationKind::MappingSync,
    OperationKind::WebhookSync,
];

/// Lifecycle state of a sync job.
///
/// Transitions are forward-only: the single backward edge is
/// `retrying -> in_progress` when a retry is picked up. Terminal states
/// never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_JOB_STATUSES
            .iter()
            .copied()
            .find(|s| s.as_str() == value)
    }

    /// Terminal states are immutable.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub const fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::InProgress)
            | (JobStatus::Pending, JobStatus::Cancelled)
            | (JobStatus::InProgress, JobStatus::Completed)
            | (JobStatus::InProgress, JobStatus::Failed)
            | (JobStatus::InProgress, JobStatus::Retrying)
            | (JobStatus::InProgress, JobStatus::Cancelled)
            | (JobStatus::Retrying, JobStatus::InProgress)
            | (JobStatus::Retrying, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of job statuses.
pub const ALL_JOB_STATUSES: &[JobStatus] = &[
    JobStatus::Pending,
    JobStatus::InProgress,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Retrying,
    JobStatus::Cancelled,
];

/// Why two sides of a mapping disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    FieldChange,
    StatusMismatch,
    Deletion,
    ConcurrentModification,
}

impl ConflictKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConflictKind::FieldChange => "field_change",
            ConflictKind::StatusMismatch => "status_mismatch",
            ConflictKind::Deletion => "deletion",
            ConflictKind::ConcurrentModification => "concurrent_modification",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_CONFLICT_KINDS
            .iter()
            .copied()
            .find(|k| k.as_str() == value)
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of conflict kinds.
pub const ALL_CONFLICT_KINDS: &[ConflictKind] = &[
    ConflictKind::FieldChange,
    ConflictKind::StatusMismatch,
    ConflictKind::Deletion,
    ConflictKind::ConcurrentModification,
];

/// Review state of a detected conflict. `pending` is the only state that
/// accepts a resolution; `resolved` and `ignored` are write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictStatus {
    Pending,
    Resolved,
    Ignored,
}

impl ConflictStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Ignored => "ignored",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_CONFLICT_STATUSES
            .iter()
            .copied()
            .find(|s| s.as_str() == value)
    }

    pub const fn is_settled(self) -> bool {
        matches!(self, ConflictStatus::Resolved | ConflictStatus::Ignored)
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of conflict statuses.
pub const ALL_CONFLICT_STATUSES: &[ConflictStatus] = &[
    ConflictStatus::Pending,
    ConflictStatus::Resolved,
    ConflictStatus::Ignored,
];

/// How a conflict (or an automatic merge) picks the surviving value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    KeepLocal,
    KeepRemote,
    Merge,
    Manual,
}

impl ResolutionStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::KeepLocal => "keep_local",
            ResolutionStrategy::KeepRemote => "keep_remote",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_RESOLUTION_STRATEGIES
            .iter()
            .copied()
            .find(|s| s.as_str() == value)
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of resolution strategies.
pub const ALL_RESOLUTION_STRATEGIES: &[ResolutionStrategy] = &[
    ResolutionStrategy::KeepLocal,
    ResolutionStrategy::KeepRemote,
    ResolutionStrategy::Merge,
    ResolutionStrategy::Manual,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabularies_round_trip() {
        for d in ALL_SYNC_DIRECTIONS {
            assert_eq!(SyncDirection::parse(d.as_str()), Some(*d));
        }
        for o in ALL_OPERATION_KINDS {
            assert_eq!(OperationKind::parse(o.as_str()), Some(*o));
        }
        for s in ALL_JOB_STATUSES {
            assert_eq!(JobStatus::parse(s.as_str()), Some(*s));
        }
        for k in ALL_CONFLICT_KINDS {
            assert_eq!(ConflictKind::parse(k.as_str()), Some(*k));
        }
        for s in ALL_CONFLICT_STATUSES {
            assert_eq!(ConflictStatus::parse(s.as_str()), Some(*s));
        }
        for s in ALL_RESOLUTION_STRATEGIES {
            assert_eq!(ResolutionStrategy::parse(s.as_str()), Some(*s));
        }
    }

    #[test]
    fn unknown_strings_are_rejected() {
        assert_eq!(SyncDirection::parse("sideways"), None);
        assert_eq!(OperationKind::parse("Create"), None);
        assert_eq!(JobStatus::parse("queued"), None);
        assert_eq!(ResolutionStrategy::parse("KEEP_LOCAL"), None);
    }

    #[test]
    fn terminal_statuses_accept_no_transition() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in ALL_JOB_STATUSES {
                assert!(!terminal.can_transition_to(*next));
            }
        }
    }

    #[test]
    fn retrying_resumes_only_into_in_progress_or_cancelled() {
        assert!(JobStatus::Retrying.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::Retrying.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Retrying.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Retrying.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Retrying.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn pending_cannot_complete_directly() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
    }
}
