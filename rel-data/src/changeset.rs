//! Change sets
//!
//! A change set is the unit a client uploads after working offline: one
//! [`ChangeItem`] per touched record, carrying the before-image (what the
//! client last saw) and the after-image (what it wants to write).

use crate::model::Asset;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Server to client baseline only
    Initialize,
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeAction::Initialize => "initialize",
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Why a change item was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{action} item has invalid {member}: {reason}")]
pub struct InvalidChangeItem {
    pub action: ChangeAction,
    /// `action`, `bfim` or `afim`
    pub member: &'static str,
    pub reason: &'static str,
}

/// One record's transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeItem<E> {
    pub action: ChangeAction,
    /// Before-image
    pub bfim: Option<E>,
    /// After-image
    pub afim: Option<E>,
}

impl<E> ChangeItem<E> {
    pub fn initialize(current: E) -> Self {
        Self { action: ChangeAction::Initialize, bfim: None, afim: Some(current) }
    }

    pub fn create(afim: E) -> Self {
        Self { action: ChangeAction::Create, bfim: None, afim: Some(afim) }
    }

    pub fn update(bfim: E, afim: E) -> Self {
        Self { action: ChangeAction::Update, bfim: Some(bfim), afim: Some(afim) }
    }

    pub fn delete(bfim: E) -> Self {
        Self { action: ChangeAction::Delete, bfim: Some(bfim), afim: None }
    }

    /// Check that the images present match the action.
    pub fn validate(&self) -> Result<(), InvalidChangeItem> {
        let invalid = |member, reason| InvalidChangeItem { action: self.action, member, reason };
        let (has_bfim, has_afim) = (self.bfim.is_some(), self.afim.is_some());
        match self.action {
            ChangeAction::Initialize => Err(invalid("action", "is only valid for downloads")),
            ChangeAction::Create if has_bfim => Err(invalid("bfim", "must be absent")),
            ChangeAction::Update | ChangeAction::Delete if !has_bfim => Err(invalid("bfim", "is required")),
            ChangeAction::Create | ChangeAction::Update if !has_afim => Err(invalid("afim", "is required")),
            ChangeAction::Delete if has_afim => Err(invalid("afim", "must be absent")),
            _ => Ok(()),
        }
    }
}

/// A batch of changes; empty means "nothing to do" or "fully accepted".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub assets: Vec<ChangeItem<Asset>>,
}

impl ChangeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items_count() == 0
    }

    pub fn total_items_count(&self) -> usize {
        self.assets.len()
    }
}
