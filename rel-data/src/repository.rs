//! Repository and data-context interfaces
//!
//! The change-set processor only talks to these traits. [`UnitOfWork`]
//! is the shipped implementation over a [`Store`].
//!
//! [`UnitOfWork`]: crate::store::UnitOfWork
//! [`Store`]: crate::store::Store

use crate::error::Result;
use crate::model::{Asset, Entity, Job, ValidationError};
use tracing::warn;

/// Typed access to one entity set with locally staged writes.
pub trait Repository<E: Entity> {
    /// Stage an insert
    fn create(&mut self, entity: E) -> Result<E>;

    /// Stage an update, checked against the entity's own token at commit
    fn update(&mut self, entity: E) -> Result<E>;

    /// Stage a delete, checked against the entity's own token at commit
    fn delete(&mut self, entity: E) -> Result<E>;

    /// Local copy if tracked, otherwise read from the store
    fn get_by_id(&mut self, key: &E::Key) -> Result<Option<E>>;

    fn get_all(&mut self) -> Result<Vec<E>>;

    /// Drop every locally cached and staged entity
    fn flush(&mut self);

    fn get_id(&self, entity: &E) -> E::Key {
        entity.key()
    }

    /// Locally tracked working set, staged deletes excluded
    fn local(&self) -> Vec<E>;

    /// Read exactly `keys` from the store, replacing local copies.
    /// Keys that no longer exist are dropped.
    fn reload(&mut self, keys: &[E::Key]) -> Result<Vec<E>>;
}

/// A unit of work over assets and jobs.
pub trait DataContext {
    fn assets(&mut self) -> &mut dyn Repository<Asset>;

    fn jobs(&mut self) -> &mut dyn Repository<Job>;

    /// Commit all staged writes atomically. Fails with
    /// [`DataError::Concurrency`](crate::DataError::Concurrency) on a stale token.
    fn accept_changes(&mut self) -> Result<()>;

    /// Undo every staged write
    fn reject_changes(&mut self);

    /// Validation failures among staged creates and updates
    fn validation_errors(&self) -> Vec<ValidationError>;

    fn validate(&self) -> bool {
        let errors = self.validation_errors();
        for error in &errors {
            warn!("Validation failed: {}", error);
        }
        errors.is_empty()
    }

    /// Require `partition` to be unchanged when the next commit lands.
    fn guard(&mut self, _partition: &Job) -> Result<()> {
        Ok(())
    }
}
