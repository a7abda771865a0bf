//! In-memory store
//!
//! Tables live behind one mutex. A commit works on a copy of the tables and
//! swaps it in only when every write succeeded, so a failed batch leaves no
//! trace.

use crate::error::{DataError, Result};
use crate::model::{Asset, Entity, Job};
use crate::store::{Committed, Store, Table, Write, WriteBatch};
use rel_merge::{tokens_match, ConcurrencyToken};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Tables {
    assets: Rows<Asset>,
    jobs: Rows<Job>,
    /// Last issued row version, shared by all tables
    version: u64,
}

/// One table. Keys are never reused, even after the highest row is deleted.
#[derive(Debug, Clone)]
struct Rows<E> {
    rows: BTreeMap<i64, E>,
    last_key: i64,
}

impl<E> Default for Rows<E> {
    fn default() -> Self {
        Self { rows: BTreeMap::new(), last_key: 0 }
    }
}

/// Mutex-guarded maps; cheap to share between units of work.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fetch_many<E: Entity<Key = i64>>(rows: &BTreeMap<i64, E>, keys: &[i64]) -> Vec<E> {
    keys.iter().filter_map(|k| rows.get(k).cloned()).collect()
}

fn check_token<E: Entity<Key = i64>>(rows: &BTreeMap<i64, E>, entity: &E) -> Result<()> {
    match rows.get(&entity.key()) {
        Some(stored) if tokens_match(stored.row_version(), entity.row_version()) => Ok(()),
        _ => Err(DataError::concurrency(E::NAME, entity.key())),
    }
}

fn apply<E: Entity<Key = i64>>(table: &mut Rows<E>, version: &mut u64, writes: &[Write<E>]) -> Result<Vec<E>> {
    let Rows { rows, last_key } = table;
    let mut persisted = Vec::new();
    for write in writes {
        match write {
            Write::Insert(entity) => {
                let mut row = entity.clone();
                if row.key() == 0 {
                    *last_key += 1;
                    row.set_key(*last_key);
                } else if rows.contains_key(&row.key()) {
                    return Err(DataError::concurrency(E::NAME, row.key()));
                } else {
                    *last_key = (*last_key).max(row.key());
                }
                *version += 1;
                row.set_row_version(Some(ConcurrencyToken::from_u64(*version)));
                rows.insert(row.key(), row.clone());
                persisted.push(row);
            }
            Write::Update(entity) => {
                check_token(rows, entity)?;
                let mut row = entity.clone();
                *version += 1;
                row.set_row_version(Some(ConcurrencyToken::from_u64(*version)));
                rows.insert(row.key(), row.clone());
                persisted.push(row);
            }
            Write::Delete(entity) => {
                check_token(rows, entity)?;
                rows.remove(&entity.key());
            }
            Write::Guard(entity) => check_token(rows, entity)?,
        }
    }
    Ok(persisted)
}

impl Table<Asset> for MemoryStore {
    fn fetch(&self, key: &i64) -> Result<Option<Asset>> {
        Ok(self.lock().assets.rows.get(key).cloned())
    }

    fn fetch_all(&self) -> Result<Vec<Asset>> {
        Ok(self.lock().assets.rows.values().cloned().collect())
    }

    fn fetch_many(&self, keys: &[i64]) -> Result<Vec<Asset>> {
        Ok(fetch_many(&self.lock().assets.rows, keys))
    }
}

impl Table<Job> for MemoryStore {
    fn fetch(&self, key: &i64) -> Result<Option<Job>> {
        Ok(self.lock().jobs.rows.get(key).cloned())
    }

    fn fetch_all(&self) -> Result<Vec<Job>> {
        Ok(self.lock().jobs.rows.values().cloned().collect())
    }

    fn fetch_many(&self, keys: &[i64]) -> Result<Vec<Job>> {
        Ok(fetch_many(&self.lock().jobs.rows, keys))
    }
}

impl Store for MemoryStore {
    fn commit(&self, batch: &WriteBatch) -> Result<Committed> {
        let mut tables = self.lock();
        let mut next = tables.clone();
        let Tables { assets, jobs, version } = &mut next;
        let jobs = apply(jobs, version, &batch.jobs)?;
        let assets = apply(assets, version, &batch.assets)?;
        *tables = next;
        debug!("Committed {} writes at version {}", batch.len(), tables.version);
        Ok(Committed { assets, jobs })
    }
}
