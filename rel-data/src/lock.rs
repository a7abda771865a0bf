//! Partition locks
//!
//! A partition is locked by writing the holder's name into its lock record.
//! Transitions are compare-and-swap on that field; they become durable only
//! when the surrounding unit of work commits, and the commit fails if the
//! record changed since it was read.

use crate::error::{DataError, Result};
use crate::model::Job;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The acting principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Identity {
    #[default]
    Anonymous,
    User(String),
}

impl Identity {
    pub fn user(name: impl Into<String>) -> Self {
        Identity::User(name.into())
    }

    /// Authenticated name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::User(name) => Some(name),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.name().is_some()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("anonymous"))
    }
}

/// Lock state as seen by one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// Nobody holds the lock
    Open,
    /// Someone else holds the lock
    Closed,
    /// The acting identity holds the lock
    Exclusive,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockStatus::Open => "open",
            LockStatus::Closed => "closed",
            LockStatus::Exclusive => "exclusive",
        };
        f.write_str(s)
    }
}

/// Mutual exclusion over one partition.
pub trait PartitionLock {
    fn status(&self, who: &Identity) -> LockStatus;

    /// Acquire for `who`. Returns `Exclusive` on success and `Closed` when
    /// another identity holds the lock.
    fn close(&mut self, who: &Identity) -> Result<LockStatus>;

    /// Release for `who`. Returns `Open` on success and `Closed` when
    /// another identity holds the lock.
    fn open(&mut self, who: &Identity) -> Result<LockStatus>;
}

impl PartitionLock for Job {
    fn status(&self, who: &Identity) -> LockStatus {
        match (self.locked_by.as_deref(), who.name()) {
            (None, _) => LockStatus::Open,
            (Some(holder), Some(name)) if holder == name => LockStatus::Exclusive,
            (Some(_), _) => LockStatus::Closed,
        }
    }

    fn close(&mut self, who: &Identity) -> Result<LockStatus> {
        let name = who.name().ok_or(DataError::Unauthorized)?;
        match self.locked_by.as_deref() {
            None => {
                self.locked_by = Some(name.to_string());
                self.locked_on = Some(Utc::now());
                Ok(LockStatus::Exclusive)
            }
            Some(holder) if holder == name => Ok(LockStatus::Exclusive),
            Some(_) => Ok(LockStatus::Closed),
        }
    }

    fn open(&mut self, who: &Identity) -> Result<LockStatus> {
        let name = who.name().ok_or(DataError::Unauthorized)?;
        match self.locked_by.as_deref() {
            None => Ok(LockStatus::Open),
            Some(holder) if holder == name => {
                self.locked_by = None;
                self.locked_on = None;
                Ok(LockStatus::Open)
            }
            Some(_) => Ok(LockStatus::Closed),
        }
    }
}
