//! Change-set processor integration tests over the in-memory store

use rel_data::{
    Asset, ChangeAction, ChangeItem, ChangeSet, ChangeSetConfig, ChangeSetProcessor, ConflictResolver, DataContext,
    DataError, Identity, Job, LockStatus, MemoryStore, MergeConcurrentEdits, ProcessError, RejectConcurrentEdits,
    Repository, Store, UnitOfWork, ValidationError, Write, WriteBatch,
};
use rel_merge::{field_accessor, token_accessor, MergeConfig, MergeEngine, MergePolicy};
use std::collections::HashMap;
use std::sync::Arc;

/// Counts commits and can fail the next few with a concurrency error.
struct CountingContext {
    inner: UnitOfWork<MemoryStore>,
    accepts: usize,
    failures: usize,
}

impl CountingContext {
    fn new(store: &Arc<MemoryStore>) -> Self {
        Self { inner: UnitOfWork::new(store.clone()), accepts: 0, failures: 0 }
    }

    fn failing(store: &Arc<MemoryStore>, failures: usize) -> Self {
        Self { failures, ..Self::new(store) }
    }
}

impl DataContext for CountingContext {
    fn assets(&mut self) -> &mut dyn Repository<Asset> {
        self.inner.assets()
    }

    fn jobs(&mut self) -> &mut dyn Repository<Job> {
        self.inner.jobs()
    }

    fn accept_changes(&mut self) -> rel_data::Result<()> {
        self.accepts += 1;
        if self.failures > 0 {
            self.failures -= 1;
            return Err(DataError::concurrency("Asset", 0));
        }
        self.inner.accept_changes()
    }

    fn reject_changes(&mut self) {
        self.inner.reject_changes()
    }

    fn validation_errors(&self) -> Vec<ValidationError> {
        self.inner.validation_errors()
    }

    fn guard(&mut self, partition: &Job) -> rel_data::Result<()> {
        self.inner.guard(partition)
    }
}

/// Resolves every item by staging it again unchanged.
struct Restage;

impl ConflictResolver<Asset> for Restage {
    fn name(&self) -> &'static str {
        "restage"
    }

    fn resolve(
        &self,
        repo: &mut dyn Repository<Asset>,
        change: &ChangeItem<Asset>,
        _index: &mut HashMap<i64, Asset>,
    ) -> Result<bool, ProcessError> {
        match (change.action, change.bfim.clone(), change.afim.clone()) {
            (ChangeAction::Create, _, Some(afim)) => repo.create(afim)?,
            (ChangeAction::Update, _, Some(afim)) => repo.update(afim)?,
            (ChangeAction::Delete, Some(bfim), _) => repo.delete(bfim)?,
            _ => return Ok(false),
        };
        Ok(true)
    }
}

/// Resolves by staging a record that fails validation.
struct Corrupting;

impl ConflictResolver<Asset> for Corrupting {
    fn name(&self) -> &'static str {
        "corrupting"
    }

    fn resolve(
        &self,
        repo: &mut dyn Repository<Asset>,
        change: &ChangeItem<Asset>,
        _index: &mut HashMap<i64, Asset>,
    ) -> Result<bool, ProcessError> {
        if let Some(afim) = change.afim.clone() {
            repo.update(Asset { name: String::new(), ..afim })?;
        }
        Ok(true)
    }
}

fn asset(job_id: i64, name: &str) -> Asset {
    Asset {
        job_id,
        name: name.into(),
        service_area: "North".into(),
        monotonic_tolerance: Some(10.0),
        percent_tolerance: Some(100.0),
        static_tolerance: Some(100.0),
        ..Asset::default()
    }
}

/// Jobs 1 and 2; assets 1 and 2 in job 1, asset 3 in job 2.
fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .commit(&WriteBatch {
            jobs: vec![Write::Insert(Job::new("Site A")), Write::Insert(Job::new("Site B"))],
            assets: vec![
                Write::Insert(asset(1, "Pump")),
                Write::Insert(asset(1, "Valve")),
                Write::Insert(asset(2, "Meter")),
            ],
        })
        .unwrap();
    store
}

fn processor(
    context: CountingContext,
    resolver: Arc<dyn ConflictResolver<Asset>>,
    who: &str,
) -> ChangeSetProcessor<CountingContext> {
    ChangeSetProcessor::new(context, resolver, Identity::user(who))
}

/// What a client downloads for `partition`, keyed by id.
fn checkout(store: &Arc<MemoryStore>, partition: i64) -> HashMap<i64, Asset> {
    let mut p = ChangeSetProcessor::new(UnitOfWork::new(store.clone()), Arc::new(RejectConcurrentEdits), Identity::Anonymous);
    p.build_initial_change_set(partition)
        .unwrap()
        .assets
        .into_iter()
        .filter_map(|item| item.afim)
        .map(|a| (a.id, a))
        .collect()
}

/// Another client commits an edit.
fn edit(store: &Arc<MemoryStore>, id: i64, change: impl FnOnce(&mut Asset)) {
    let mut uow = UnitOfWork::new(store.clone());
    let mut asset = uow.assets().get_by_id(&id).unwrap().unwrap();
    change(&mut asset);
    uow.assets().update(asset).unwrap();
    uow.accept_changes().unwrap();
}

fn remove(store: &Arc<MemoryStore>, id: i64) {
    let mut uow = UnitOfWork::new(store.clone());
    let asset = uow.assets().get_by_id(&id).unwrap().unwrap();
    uow.assets().delete(asset).unwrap();
    uow.accept_changes().unwrap();
}

fn stored(store: &Arc<MemoryStore>, id: i64) -> Option<Asset> {
    UnitOfWork::new(store.clone()).assets().get_by_id(&id).unwrap()
}

fn lock_status(store: &Arc<MemoryStore>, partition: i64, who: &str) -> LockStatus {
    let mut p = processor(CountingContext::new(store), Arc::new(RejectConcurrentEdits), who);
    p.lock_status(partition).unwrap()
}

fn update(before: &Asset, change: impl FnOnce(&mut Asset)) -> ChangeItem<Asset> {
    let mut after = before.clone();
    change(&mut after);
    ChangeItem::update(before.clone(), after)
}

fn one(item: ChangeItem<Asset>) -> ChangeSet {
    ChangeSet { assets: vec![item] }
}

/// Merge engine whose Asset declaration also resolves hidden and dirty deletes.
fn delete_aware_engine() -> Arc<MergeEngine> {
    let config = MergeConfig::builder("Asset")
        .key(field_accessor!(Asset, id))
        .key(field_accessor!(Asset, job_id))
        .token(token_accessor!(Asset, row_version))
        .field(field_accessor!(Asset, name))
        .field(field_accessor!(Asset, service_area))
        .field(field_accessor!(Asset, static_tolerance))
        .policy(MergePolicy::HiddenDelete)
        .policy(MergePolicy::DirtyDelete)
        .build()
        .unwrap();
    let engine = MergeEngine::new();
    engine.register(config);
    Arc::new(engine)
}

#[test]
fn test_initial_change_set_covers_partition() {
    let store = seeded_store();
    let mut p = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");
    let cs = p.build_initial_change_set(1).unwrap();
    assert_eq!(cs.total_items_count(), 2);
    assert!(cs.assets.iter().all(|i| i.action == ChangeAction::Initialize && i.bfim.is_none()));
    assert!(cs.assets.iter().all(|i| i.afim.as_ref().unwrap().job_id == 1));

    assert!(p.build_initial_change_set(42).unwrap().is_empty());
}

#[test]
fn test_clean_change_set_commits_once() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut p = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");

    let cs = ChangeSet {
        assets: vec![
            update(&client[&1], |a| a.name = "Big Pump".into()),
            ChangeItem::delete(client[&2].clone()),
            ChangeItem::create(asset(1, "Filter")),
        ],
    };
    let result = p.process(1, false, &cs).unwrap();

    assert!(result.is_empty());
    assert_eq!(p.context().accepts, 1);
    assert_eq!(stored(&store, 1).unwrap().name, "Big Pump");
    assert!(stored(&store, 2).is_none());
    assert_eq!(checkout(&store, 1).len(), 2);
    assert_eq!(lock_status(&store, 1, "alice"), LockStatus::Open);
}

#[test]
fn test_empty_change_set_is_accepted() {
    let store = seeded_store();
    let mut p = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");
    assert!(p.process(1, false, &ChangeSet::empty()).unwrap().is_empty());
}

#[test]
fn test_lost_race_resolved_and_retried() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut p = processor(CountingContext::failing(&store, 1), Arc::new(Restage), "alice");

    let cs = one(update(&client[&1], |a| a.name = "Big Pump".into()));
    let result = p.process(1, false, &cs).unwrap();

    assert!(result.is_empty());
    assert_eq!(p.context().accepts, 2);
    assert_eq!(stored(&store, 1).unwrap().name, "Big Pump");
}

#[test]
fn test_reject_resolver_returns_reconciliation() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut p = processor(CountingContext::failing(&store, 1), Arc::new(RejectConcurrentEdits), "alice");

    let cs = ChangeSet {
        assets: vec![update(&client[&1], |a| a.name = "Big Pump".into()), ChangeItem::create(asset(1, "Filter"))],
    };
    let result = p.process(1, false, &cs).unwrap();

    assert_eq!(p.context().accepts, 1);
    assert_eq!(result.total_items_count(), 1);
    let item = &result.assets[0];
    assert_eq!(item.action, ChangeAction::Update);
    assert_eq!(item.bfim.as_ref(), Some(&client[&1]));
    assert_eq!(item.afim.as_ref().unwrap().name, "Pump");
    assert_eq!(stored(&store, 1).unwrap().name, "Pump");
    assert_eq!(checkout(&store, 1).len(), 2);
    assert_eq!(lock_status(&store, 1, "alice"), LockStatus::Open);
}

#[test]
fn test_reconciliation_reports_deleted_rows() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    remove(&store, 1);
    let mut p = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");

    let result = p.process(1, false, &one(update(&client[&1], |a| a.name = "Big Pump".into()))).unwrap();

    assert_eq!(result.total_items_count(), 1);
    assert_eq!(result.assets[0].action, ChangeAction::Delete);
    assert_eq!(result.assets[0].bfim.as_ref(), Some(&client[&1]));
    assert!(result.assets[0].afim.is_none());
}

#[test]
fn test_missing_partition() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut p = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");

    let err = p.process(99, false, &one(update(&client[&1], |a| a.name = "x".into()))).unwrap_err();
    assert!(matches!(err, ProcessError::EntityNotFound(99)));
    assert_eq!(p.context().accepts, 0);
}

#[test]
fn test_partition_locked_by_someone_else() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut bob = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "bob");
    assert_eq!(bob.lock_partition(1).unwrap(), LockStatus::Exclusive);

    let mut alice = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");
    let err = alice.process(1, false, &one(update(&client[&1], |a| a.name = "x".into()))).unwrap_err();

    assert!(matches!(err, ProcessError::PessimisticLock(1)));
    assert_eq!(alice.context().accepts, 0);
    assert_eq!(stored(&store, 1).unwrap().name, "Pump");
    assert_eq!(lock_status(&store, 1, "alice"), LockStatus::Closed);
}

#[test]
fn test_exclusive_holder_commits_and_releases() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut alice = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");
    alice.lock_partition(1).unwrap();

    let result = alice.process(1, false, &one(update(&client[&1], |a| a.name = "x".into()))).unwrap();

    assert!(result.is_empty());
    assert_eq!(lock_status(&store, 1, "alice"), LockStatus::Open);
    assert_eq!(stored(&store, 1).unwrap().name, "x");
}

#[test]
fn test_claim_escalates_after_conflict() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| a.name = "Bob's Pump".into());

    let mut alice = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");
    let result = alice.process(1, true, &one(update(&client[&1], |a| a.name = "Alice's Pump".into()))).unwrap();
    assert_eq!(result.total_items_count(), 1);
    assert_eq!(lock_status(&store, 1, "alice"), LockStatus::Exclusive);
    assert_eq!(lock_status(&store, 1, "bob"), LockStatus::Closed);

    // rebase on the reconciliation and try again
    let current = result.assets[0].afim.clone().unwrap();
    let retry = one(update(&current, |a| a.name = "Alice's Pump".into()));
    assert!(alice.process(1, false, &retry).unwrap().is_empty());
    assert_eq!(stored(&store, 1).unwrap().name, "Alice's Pump");
    assert_eq!(lock_status(&store, 1, "alice"), LockStatus::Open);
}

#[test]
fn test_large_batch_escalates_without_claim() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 2, |a| a.name = "Bob's Valve".into());

    let context = CountingContext::new(&store);
    let mut alice = ChangeSetProcessor::with_config(
        context,
        Arc::new(RejectConcurrentEdits),
        Identity::user("alice"),
        ChangeSetConfig::new(2),
    );
    let cs = ChangeSet {
        assets: vec![
            update(&client[&1], |a| a.name = "a".into()),
            update(&client[&2], |a| a.name = "b".into()),
        ],
    };
    let result = alice.process(1, false, &cs).unwrap();

    assert_eq!(result.total_items_count(), 2);
    assert_eq!(lock_status(&store, 1, "alice"), LockStatus::Exclusive);
}

#[test]
fn test_anonymous_claim_is_unauthorized() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| a.name = "Bob's Pump".into());

    let mut anon = ChangeSetProcessor::new(
        CountingContext::new(&store),
        Arc::new(RejectConcurrentEdits),
        Identity::Anonymous,
    );
    let err = anon.process(1, true, &one(update(&client[&1], |a| a.name = "x".into()))).unwrap_err();
    assert!(matches!(err, ProcessError::Unauthorized));
}

#[test]
fn test_merge_within_tolerance() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| {
        a.name = "Bob's Pump".into();
        a.static_tolerance = Some(110.0);
    });

    let mut alice = processor(CountingContext::new(&store), Arc::new(MergeConcurrentEdits::with_default_engine()), "alice");
    let cs = one(update(&client[&1], |a| {
        a.monotonic_tolerance = Some(20.0);
        a.percent_tolerance = Some(105.0);
        a.static_tolerance = Some(120.0);
    }));
    let result = alice.process(1, false, &cs).unwrap();

    assert!(result.is_empty());
    assert_eq!(alice.context().accepts, 2);
    let merged = stored(&store, 1).unwrap();
    assert_eq!(merged.name, "Bob's Pump");
    assert_eq!(merged.monotonic_tolerance, Some(20.0));
    assert_eq!(merged.percent_tolerance, Some(105.0));
    assert_eq!(merged.static_tolerance, Some(120.0));
}

#[test]
fn test_merge_keeps_client_rename_beside_server_edit() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| a.static_tolerance = Some(110.0));

    let mut alice = processor(CountingContext::new(&store), Arc::new(MergeConcurrentEdits::with_default_engine()), "alice");
    let cs = one(update(&client[&1], |a| {
        a.name = "Renamed".into();
        a.monotonic_tolerance = Some(20.0);
        a.percent_tolerance = Some(105.0);
        a.static_tolerance = Some(120.0);
    }));
    let result = alice.process(1, false, &cs).unwrap();

    assert!(result.is_empty());
    assert_eq!(alice.context().accepts, 2);
    let merged = stored(&store, 1).unwrap();
    assert_eq!(merged.name, "Renamed");
    assert_eq!(merged.static_tolerance, Some(120.0));
}

#[test]
fn test_racing_renames_return_reconciliation() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| {
        a.name = "Bob's Pump".into();
        a.static_tolerance = Some(110.0);
    });

    let mut alice = processor(CountingContext::new(&store), Arc::new(MergeConcurrentEdits::with_default_engine()), "alice");
    let cs = one(update(&client[&1], |a| {
        a.name = "Alice's Pump".into();
        a.monotonic_tolerance = Some(20.0);
        a.percent_tolerance = Some(105.0);
        a.static_tolerance = Some(120.0);
    }));
    let result = alice.process(1, false, &cs).unwrap();

    assert_eq!(result.total_items_count(), 1);
    assert_eq!(result.assets[0].action, ChangeAction::Update);
    assert_eq!(result.assets[0].afim.as_ref().unwrap().name, "Bob's Pump");
    assert_eq!(alice.context().accepts, 1);
    let current = stored(&store, 1).unwrap();
    assert_eq!(current.name, "Bob's Pump");
    assert_eq!(current.static_tolerance, Some(110.0));
}

#[test]
fn test_merge_outside_tolerance_returns_current() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| a.static_tolerance = Some(110.0));

    let mut alice = processor(CountingContext::new(&store), Arc::new(MergeConcurrentEdits::with_default_engine()), "alice");
    let cs = one(update(&client[&1], |a| {
        a.monotonic_tolerance = Some(20.0);
        a.static_tolerance = Some(200.0);
    }));
    let result = alice.process(1, false, &cs).unwrap();

    assert_eq!(result.total_items_count(), 1);
    assert_eq!(result.assets[0].afim.as_ref().unwrap().static_tolerance, Some(110.0));
    assert_eq!(stored(&store, 1).unwrap().static_tolerance, Some(110.0));
    assert_eq!(stored(&store, 1).unwrap().monotonic_tolerance, Some(10.0));
}

#[test]
fn test_merge_keeps_unrelated_clean_items() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| a.static_tolerance = Some(110.0));

    let mut alice = processor(CountingContext::new(&store), Arc::new(MergeConcurrentEdits::with_default_engine()), "alice");
    let cs = ChangeSet {
        assets: vec![
            update(&client[&1], |a| {
                a.monotonic_tolerance = Some(20.0);
                a.percent_tolerance = Some(95.0);
                a.static_tolerance = Some(90.0);
            }),
            update(&client[&2], |a| a.name = "Big Valve".into()),
            ChangeItem::create(asset(1, "Filter")),
        ],
    };
    assert!(alice.process(1, false, &cs).unwrap().is_empty());

    assert_eq!(stored(&store, 1).unwrap().static_tolerance, Some(90.0));
    assert_eq!(stored(&store, 2).unwrap().name, "Big Valve");
    assert_eq!(checkout(&store, 1).len(), 3);
}

#[test]
fn test_hidden_delete_resurrects_record() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    remove(&store, 1);

    let resolver = Arc::new(MergeConcurrentEdits::new(delete_aware_engine()));
    let mut alice = processor(CountingContext::new(&store), resolver, "alice");
    let result = alice.process(1, false, &one(update(&client[&1], |a| a.name = "Back".into()))).unwrap();

    assert!(result.is_empty());
    assert_eq!(stored(&store, 1).unwrap().name, "Back");
}

#[test]
fn test_hidden_delete_of_deleted_record_is_noop() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    remove(&store, 1);

    let resolver = Arc::new(MergeConcurrentEdits::new(delete_aware_engine()));
    let mut alice = processor(CountingContext::new(&store), resolver, "alice");
    let result = alice.process(1, false, &one(ChangeItem::delete(client[&1].clone()))).unwrap();

    assert!(result.is_empty());
    assert!(stored(&store, 1).is_none());
    assert_eq!(alice.context().accepts, 2);
}

#[test]
fn test_dirty_delete_removes_changed_record() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| a.name = "Bob's Pump".into());

    let resolver = Arc::new(MergeConcurrentEdits::new(delete_aware_engine()));
    let mut alice = processor(CountingContext::new(&store), resolver, "alice");
    let result = alice.process(1, false, &one(ChangeItem::delete(client[&1].clone()))).unwrap();

    assert!(result.is_empty());
    assert!(stored(&store, 1).is_none());
}

#[test]
fn test_dirty_delete_unresolved_with_shipped_policies() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    edit(&store, 1, |a| a.name = "Bob's Pump".into());

    let mut alice = processor(CountingContext::new(&store), Arc::new(MergeConcurrentEdits::with_default_engine()), "alice");
    let result = alice.process(1, false, &one(ChangeItem::delete(client[&1].clone()))).unwrap();

    assert_eq!(result.assets[0].action, ChangeAction::Update);
    assert_eq!(result.assets[0].afim.as_ref().unwrap().name, "Bob's Pump");
    assert!(stored(&store, 1).is_some());
}

#[test]
fn test_invalid_data_before_apply() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut p = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");

    let err = p.process(1, false, &one(update(&client[&1], |a| a.name = String::new()))).unwrap_err();
    assert!(matches!(err, ProcessError::InvalidData { after_resolution: false, .. }));
    assert_eq!(p.context().accepts, 0);
}

#[test]
fn test_invalid_data_after_resolution() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut p = processor(CountingContext::failing(&store, 1), Arc::new(Corrupting), "alice");

    let err = p.process(1, false, &one(update(&client[&1], |a| a.name = "ok".into()))).unwrap_err();
    match err {
        ProcessError::InvalidData { after_resolution, errors } => {
            assert!(after_resolution);
            assert_eq!(errors, vec!["Asset 1: name is required".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(p.context().accepts, 1);
    assert_eq!(stored(&store, 1).unwrap().name, "Pump");
}

#[test]
fn test_malformed_item_is_an_argument_error() {
    let store = seeded_store();
    let client = checkout(&store, 1);
    let mut p = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");

    let cs = ChangeSet {
        assets: vec![
            update(&client[&1], |a| a.name = "x".into()),
            ChangeItem::initialize(client[&2].clone()),
        ],
    };
    let err = p.process(1, false, &cs).unwrap_err();
    match err {
        ProcessError::InvalidArgument { name, .. } => assert_eq!(name, "assets[1]"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(p.context().accepts, 0);
    assert_eq!(stored(&store, 1).unwrap().name, "Pump");
}

#[test]
fn test_lock_transitions() {
    let store = seeded_store();
    let mut alice = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "alice");
    let mut bob = processor(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), "bob");

    assert_eq!(alice.lock_partition(1).unwrap(), LockStatus::Exclusive);
    assert_eq!(bob.lock_partition(1).unwrap(), LockStatus::Closed);
    assert_eq!(bob.unlock_partition(1).unwrap(), LockStatus::Closed);
    assert_eq!(alice.unlock_partition(1).unwrap(), LockStatus::Open);
    assert_eq!(bob.lock_partition(1).unwrap(), LockStatus::Exclusive);

    let mut anon =
        ChangeSetProcessor::new(CountingContext::new(&store), Arc::new(RejectConcurrentEdits), Identity::Anonymous);
    assert!(matches!(anon.lock_partition(2), Err(ProcessError::Unauthorized)));
    assert!(matches!(alice.lock_partition(7), Err(ProcessError::EntityNotFound(7))));
}
