//! Store abstraction and the unit of work built on it
//!
//! A [`Store`] persists assets and jobs and applies a [`WriteBatch`]
//! atomically: every update, delete and guard in the batch is checked against
//! the stored concurrency token, and one stale token fails the whole batch.

use crate::error::Result;
use crate::model::{Asset, Entity, Job, ValidationError};
use crate::repository::{DataContext, Repository};
use crate::tracking::EntitySet;
use std::sync::Arc;
use tracing::debug;

/// Read access to one table
pub trait Table<E: Entity> {
    fn fetch(&self, key: &E::Key) -> Result<Option<E>>;

    fn fetch_all(&self) -> Result<Vec<E>>;

    /// Read `keys` in one consistent snapshot; missing keys are skipped.
    fn fetch_many(&self, keys: &[E::Key]) -> Result<Vec<E>>;
}

/// Backing store for a [`UnitOfWork`]
pub trait Store: Table<Asset> + Table<Job> + Send + Sync {
    /// Apply `batch` in one transaction.
    fn commit(&self, batch: &WriteBatch) -> Result<Committed>;
}

/// A staged write
#[derive(Debug, Clone, PartialEq)]
pub enum Write<E> {
    Insert(E),
    /// Token-checked update
    Update(E),
    /// Token-checked delete
    Delete(E),
    /// Token check only
    Guard(E),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub assets: Vec<Write<Asset>>,
    pub jobs: Vec<Write<Job>>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assets.len() + self.jobs.len()
    }
}

/// Stored versions (with keys and fresh tokens) of inserted and updated rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Committed {
    pub assets: Vec<Asset>,
    pub jobs: Vec<Job>,
}

/// Change-tracking [`DataContext`] over a shared store.
///
/// Several units of work may share one store; each stages its own writes.
pub struct UnitOfWork<S: Store> {
    store: Arc<S>,
    assets: EntitySet<Asset, S>,
    jobs: EntitySet<Job, S>,
}

impl<S: Store> UnitOfWork<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            assets: EntitySet::new(store.clone()),
            jobs: EntitySet::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn has_changes(&self) -> bool {
        self.assets.has_changes() || self.jobs.has_changes()
    }
}

impl<S: Store> DataContext for UnitOfWork<S> {
    fn assets(&mut self) -> &mut dyn Repository<Asset> {
        &mut self.assets
    }

    fn jobs(&mut self) -> &mut dyn Repository<Job> {
        &mut self.jobs
    }

    fn accept_changes(&mut self) -> Result<()> {
        let batch = WriteBatch { assets: self.assets.pending(), jobs: self.jobs.pending() };
        if batch.is_empty() {
            return Ok(());
        }
        debug!("Committing {} staged writes", batch.len());
        let committed = self.store.commit(&batch)?;
        self.assets.accepted(committed.assets);
        self.jobs.accepted(committed.jobs);
        Ok(())
    }

    fn reject_changes(&mut self) {
        self.assets.reject();
        self.jobs.reject();
    }

    fn validation_errors(&self) -> Vec<ValidationError> {
        let mut errors = self.assets.validation_errors();
        errors.extend(self.jobs.validation_errors());
        errors
    }

    fn guard(&mut self, partition: &Job) -> Result<()> {
        self.jobs.guard(partition.clone());
        Ok(())
    }
}
