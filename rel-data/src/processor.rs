//! Change-set processor
//!
//! Applies a client's offline change set to a data context in one atomic
//! commit. When the commit loses an optimistic concurrency race the
//! processor re-reads the affected rows, lets the conflict resolver try to
//! reconcile every item, and retries once. If that still fails the client
//! gets a reconciliation change set describing the current store state of
//! every item it touched.
//!
//! The partition lock arbitrates: a partition closed by someone else refuses
//! the batch, a partition held by the caller is released by the commit that
//! lands the batch, and an open partition is claimed after a failed commit
//! when the caller asks for it or the batch is large.

use crate::changeset::{ChangeAction, ChangeItem, ChangeSet};
use crate::config::ChangeSetConfig;
use crate::diagnostics::{ChangeSetScope, Phase};
use crate::error::ProcessError;
use crate::lock::{Identity, LockStatus, PartitionLock};
use crate::model::{Asset, Job};
use crate::repository::DataContext;
use crate::resolver::ConflictResolver;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

pub type Result<T> = std::result::Result<T, ProcessError>;

pub struct ChangeSetProcessor<C: DataContext> {
    context: C,
    resolver: Arc<dyn ConflictResolver<Asset>>,
    identity: Identity,
    config: ChangeSetConfig,
}

impl<C: DataContext> ChangeSetProcessor<C> {
    pub fn new(context: C, resolver: Arc<dyn ConflictResolver<Asset>>, identity: Identity) -> Self {
        Self::with_config(context, resolver, identity, ChangeSetConfig::default())
    }

    pub fn with_config(
        context: C,
        resolver: Arc<dyn ConflictResolver<Asset>>,
        identity: Identity,
        config: ChangeSetConfig,
    ) -> Self {
        Self { context, resolver, identity, config }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &ChangeSetConfig {
        &self.config
    }

    /// Every asset of `partition`, as Initialize items for a client to
    /// start from.
    pub fn build_initial_change_set(&mut self, partition: i64) -> Result<ChangeSet> {
        let assets: Vec<_> = self
            .context
            .assets()
            .get_all()?
            .into_iter()
            .filter(|a| a.job_id == partition)
            .map(ChangeItem::initialize)
            .collect();
        debug!("Initial change set for partition {} has {} items", partition, assets.len());
        Ok(ChangeSet { assets })
    }

    /// Apply `change_set` to `partition`.
    ///
    /// Returns an empty change set when the batch was committed, otherwise
    /// the reconciliation change set. `claim` asks for the partition lock
    /// if the optimistic commit fails.
    pub fn process(&mut self, partition: i64, claim: bool, change_set: &ChangeSet) -> Result<ChangeSet> {
        let count = change_set.total_items_count();
        let span = info_span!("process", partition, items = count, resolver = self.resolver.name());
        let _enter = span.enter();

        check_items(change_set)?;

        let mut scope = ChangeSetScope::new(self.resolver.name(), count);
        {
            let _timer = scope.time(Phase::Replay);
            self.replay(change_set)?;
        }
        self.ensure_valid(false)?;

        let accepted = {
            let _timer = scope.time_save();
            self.apply(partition, claim, count)?
        };
        if accepted {
            scope.complete();
            info!("Accepted {} changes", count);
            return Ok(ChangeSet::empty());
        }

        let redress = scope.time_redress();
        {
            let _timer = scope.time(Phase::BuildCache);
            self.flush_and_recache()?;
        }
        let resolved = {
            let _timer = scope.time(Phase::Resolve);
            self.resolve_conflicts(change_set)?
        };

        if resolved {
            self.ensure_valid(true)?;
            let accepted = {
                let _timer = scope.time_save();
                self.apply(partition, claim, count)?
            };
            if accepted {
                drop(redress);
                scope.complete();
                info!("Accepted {} changes after resolving conflicts", count);
                return Ok(ChangeSet::empty());
            }
        }

        let reconcile = self.build_reconciliation_change_set(change_set)?;
        drop(redress);
        scope.returned();
        info!("Returned {} items for reconciliation", reconcile.total_items_count());
        Ok(reconcile)
    }

    /// Take the lock on `partition` for the acting identity.
    pub fn lock_partition(&mut self, partition: i64) -> Result<LockStatus> {
        self.transition_lock(partition, true)
    }

    /// Release the acting identity's lock on `partition`.
    pub fn unlock_partition(&mut self, partition: i64) -> Result<LockStatus> {
        self.transition_lock(partition, false)
    }

    pub fn lock_status(&mut self, partition: i64) -> Result<LockStatus> {
        let job = self.load_partition(partition)?;
        Ok(job.status(&self.identity))
    }

    fn transition_lock(&mut self, partition: i64, close: bool) -> Result<LockStatus> {
        let mut job = self.load_partition(partition)?;
        let before = job.status(&self.identity);
        let after = if close { job.close(&self.identity)? } else { job.open(&self.identity)? };
        if after != before {
            self.context.jobs().update(job)?;
            if let Err(err) = self.context.accept_changes() {
                self.context.reject_changes();
                return Err(if err.is_concurrency() { ProcessError::PessimisticLock(partition) } else { err.into() });
            }
            info!("Partition {} is now {} for {}", partition, after, self.identity);
        }
        Ok(after)
    }

    fn load_partition(&mut self, partition: i64) -> Result<Job> {
        self.context
            .jobs()
            .reload(&[partition])?
            .into_iter()
            .next()
            .ok_or(ProcessError::EntityNotFound(partition))
    }

    fn replay(&mut self, change_set: &ChangeSet) -> Result<()> {
        let repo = self.context.assets();
        for item in &change_set.assets {
            match (item.action, item.bfim.clone(), item.afim.clone()) {
                (ChangeAction::Create, _, Some(afim)) => {
                    repo.create(afim)?;
                }
                (ChangeAction::Update, _, Some(afim)) => {
                    repo.update(afim)?;
                }
                (ChangeAction::Delete, Some(bfim), _) => {
                    repo.delete(bfim)?;
                }
                (action, _, _) => {
                    return Err(ProcessError::InvalidArgument {
                        name: "change_set".to_string(),
                        reason: format!("{} cannot be replayed", action),
                    });
                }
            }
        }
        Ok(())
    }

    fn ensure_valid(&mut self, after_resolution: bool) -> Result<()> {
        if self.context.validate() {
            return Ok(());
        }
        let errors = self.context.validation_errors().iter().map(ToString::to_string).collect();
        self.context.reject_changes();
        Err(ProcessError::InvalidData { after_resolution, errors })
    }

    /// One commit attempt under the partition lock. `Ok(false)` means the
    /// commit lost a concurrency race and nothing was written.
    fn apply(&mut self, partition: i64, claim: bool, count: usize) -> Result<bool> {
        let mut job = match self.load_partition(partition) {
            Ok(job) => job,
            Err(err) => {
                self.context.reject_changes();
                return Err(err);
            }
        };

        let status = job.status(&self.identity);
        match status {
            LockStatus::Closed => {
                warn!("Partition {} is locked by {:?}", partition, job.locked_by);
                self.context.reject_changes();
                return Err(ProcessError::PessimisticLock(partition));
            }
            LockStatus::Exclusive => {
                // release rides on the batch commit
                job.open(&self.identity)?;
                self.context.jobs().update(job.clone())?;
            }
            LockStatus::Open => self.context.guard(&job)?,
        }

        match self.context.accept_changes() {
            Ok(()) => return Ok(true),
            Err(err) if err.is_concurrency() => debug!("Commit lost a concurrency race: {}", err),
            Err(err) => {
                self.context.reject_changes();
                return Err(err.into());
            }
        }
        self.context.reject_changes();

        if status == LockStatus::Open && (claim || self.config.is_of_sufficient_size(count)) {
            self.claim(partition, job)?;
        }
        Ok(false)
    }

    fn claim(&mut self, partition: i64, mut job: Job) -> Result<()> {
        if job.close(&self.identity)? != LockStatus::Exclusive {
            return Err(ProcessError::PessimisticLock(partition));
        }
        self.context.jobs().update(job)?;
        match self.context.accept_changes() {
            Ok(()) => {
                info!("Claimed partition {} for {}", partition, self.identity);
                Ok(())
            }
            Err(err) => {
                self.context.reject_changes();
                if err.is_concurrency() {
                    warn!("Lost the race to claim partition {}", partition);
                    Err(ProcessError::PessimisticLock(partition))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Forget the local working set and read every tracked id again.
    fn flush_and_recache(&mut self) -> Result<()> {
        let repo = self.context.assets();
        let keys: Vec<i64> = repo.local().iter().map(|a| repo.get_id(a)).collect();
        repo.flush();
        let fresh = repo.reload(&keys)?;
        debug!("Re-cached {} of {} assets", fresh.len(), keys.len());
        Ok(())
    }

    /// `true` only if every item was resolved.
    fn resolve_conflicts(&mut self, change_set: &ChangeSet) -> Result<bool> {
        if !self.resolver.resolves() {
            return Ok(false);
        }
        let resolver = Arc::clone(&self.resolver);
        let repo = self.context.assets();
        let mut index: HashMap<i64, Asset> = repo.local().into_iter().map(|a| (a.id, a)).collect();
        for change in &change_set.assets {
            if !resolver.resolve(&mut *repo, change, &mut index)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn build_reconciliation_change_set(&mut self, change_set: &ChangeSet) -> Result<ChangeSet> {
        self.context.reject_changes();
        let repo = self.context.assets();
        repo.flush();
        let mut assets = Vec::new();
        for change in &change_set.assets {
            let Some(bfim) = change.bfim.as_ref() else {
                // creates never conflict
                continue;
            };
            let key = repo.get_id(bfim);
            let item = match repo.get_by_id(&key)? {
                Some(current) => ChangeItem::update(bfim.clone(), current),
                None => ChangeItem::delete(bfim.clone()),
            };
            assets.push(item);
        }
        Ok(ChangeSet { assets })
    }
}

fn check_items(change_set: &ChangeSet) -> Result<()> {
    for (index, item) in change_set.assets.iter().enumerate() {
        item.validate().map_err(|err| ProcessError::InvalidArgument {
            name: format!("assets[{}]", index),
            reason: err.to_string(),
        })?;
    }
    Ok(())
}
