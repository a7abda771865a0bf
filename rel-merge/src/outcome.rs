//! Merge kinds and outcomes

use std::fmt;

/// Why a merge is being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeKind {
    /// Let the engine classify the situation
    Auto,
    /// The record changed on both sides
    ConflictingUpdate,
    /// The record was deleted at the store while the client held it
    HiddenDelete,
    /// The client deletes a record that has since changed
    DirtyDelete,
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeKind::Auto => "auto",
            MergeKind::ConflictingUpdate => "conflicting-update",
            MergeKind::HiddenDelete => "hidden-delete",
            MergeKind::DirtyDelete => "dirty-delete",
        };
        f.write_str(s)
    }
}

/// What the caller must do with a merge result.
///
/// `Delete`, `Create` and `Update` all count as resolved. A bare `Resolved`
/// needs no further storage action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeOutcome {
    Unresolved,
    Resolved,
    Delete,
    Create,
    Update,
}

impl MergeOutcome {
    pub fn is_resolved(self) -> bool {
        !matches!(self, MergeOutcome::Unresolved)
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeOutcome::Unresolved => "unresolved",
            MergeOutcome::Resolved => "resolved",
            MergeOutcome::Delete => "delete",
            MergeOutcome::Create => "create",
            MergeOutcome::Update => "update",
        };
        f.write_str(s)
    }
}

/// Result of merging one record: an outcome plus the value to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResolution<E> {
    pub outcome: MergeOutcome,
    pub value: Option<E>,
}

impl<E> MergeResolution<E> {
    pub fn new(outcome: MergeOutcome, value: Option<E>) -> Self {
        Self { outcome, value }
    }

    pub fn unresolved() -> Self {
        Self::new(MergeOutcome::Unresolved, None)
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_resolved()
    }
}
