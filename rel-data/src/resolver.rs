//! Conflict resolvers
//!
//! After a batch fails its concurrency check the processor re-reads the
//! store and hands each change item to a resolver, which either stages a
//! replacement write or gives up.

use crate::changeset::{ChangeAction, ChangeItem};
use crate::error::ProcessError;
use crate::model::Entity;
use crate::repository::Repository;
use rel_merge::{MergeEngine, MergeKind, MergeOutcome, MergeProvider, MergeResolution};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Strategy for reconciling one change item with the store.
pub trait ConflictResolver<E: Entity>: Send + Sync {
    fn name(&self) -> &'static str;

    /// `false` if this resolver never resolves anything; the processor then
    /// skips the resolution pass.
    fn resolves(&self) -> bool {
        true
    }

    /// Try to reconcile `change` against `index`, the freshly loaded store
    /// values keyed by id. On success the replacement write is staged in
    /// `repo` and `true` is returned.
    fn resolve(
        &self,
        repo: &mut dyn Repository<E>,
        change: &ChangeItem<E>,
        index: &mut HashMap<E::Key, E>,
    ) -> Result<bool, ProcessError>;
}

/// Refuses every conflict; the client always gets the reconciliation set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectConcurrentEdits;

impl<E: Entity> ConflictResolver<E> for RejectConcurrentEdits {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn resolves(&self) -> bool {
        false
    }

    fn resolve(
        &self,
        _repo: &mut dyn Repository<E>,
        _change: &ChangeItem<E>,
        _index: &mut HashMap<E::Key, E>,
    ) -> Result<bool, ProcessError> {
        Ok(false)
    }
}

/// Resolves conflicts with the declared merge policies of the entity type.
#[derive(Debug, Clone)]
pub struct MergeConcurrentEdits<P = MergeEngine> {
    provider: Arc<P>,
}

impl<P> MergeConcurrentEdits<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}

impl MergeConcurrentEdits<MergeEngine> {
    /// Resolver over a fresh engine using each type's own declaration.
    pub fn with_default_engine() -> Self {
        Self::new(Arc::new(MergeEngine::new()))
    }
}

impl Default for MergeConcurrentEdits<MergeEngine> {
    fn default() -> Self {
        Self::with_default_engine()
    }
}

impl<E, P> ConflictResolver<E> for MergeConcurrentEdits<P>
where
    E: Entity,
    P: MergeProvider<E> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "merge"
    }

    fn resolve(
        &self,
        repo: &mut dyn Repository<E>,
        change: &ChangeItem<E>,
        index: &mut HashMap<E::Key, E>,
    ) -> Result<bool, ProcessError> {
        match (change.action, change.bfim.as_ref()) {
            (ChangeAction::Create, _) => {
                let Some(afim) = change.afim.clone() else {
                    return Ok(false);
                };
                // creates cannot collide
                repo.create(afim)?;
                Ok(true)
            }
            (ChangeAction::Update | ChangeAction::Delete, Some(bfim)) => {
                let key = repo.get_id(bfim);
                let resolution =
                    self.provider.merge(MergeKind::Auto, Some(bfim), index.get_mut(&key), change.afim.as_ref())?;
                if !resolution.is_resolved() {
                    debug!("{} {} stays in conflict", E::NAME, key);
                    return Ok(false);
                }
                let current = index.get(&key).cloned();
                reflect(repo, change, current, resolution)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Stage the write a resolved merge calls for.
fn reflect<E: Entity>(
    repo: &mut dyn Repository<E>,
    change: &ChangeItem<E>,
    current: Option<E>,
    resolution: MergeResolution<E>,
) -> Result<(), ProcessError> {
    match (resolution.outcome, resolution.value) {
        (MergeOutcome::Delete, _) => match current {
            Some(current) => {
                repo.delete(current)?;
            }
            None => warn!("Merge asked to delete a missing {}", E::NAME),
        },
        (MergeOutcome::Create, Some(value)) => {
            repo.create(value)?;
        }
        (MergeOutcome::Update, Some(value)) => {
            repo.update(value)?;
        }
        // The stored row is what the client last saw; the re-read discarded
        // the client's staged write, so stage it again.
        (MergeOutcome::Resolved, _) if current.is_some() => match (change.afim.clone(), current) {
            (Some(afim), _) => {
                repo.update(afim)?;
            }
            (None, Some(current)) => {
                repo.delete(current)?;
            }
            (None, None) => {}
        },
        (outcome, _) => debug!("{} merge resolved as {} with nothing to stage", E::NAME, outcome),
    }
    Ok(())
}
