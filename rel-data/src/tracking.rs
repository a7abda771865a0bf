//! Change tracking
//!
//! [`EntitySet`] is an identity map over one table. Reads are cached, writes
//! are staged until the owning unit of work commits them in one batch.

use crate::error::Result;
use crate::model::{Entity, ValidationError};
use crate::repository::Repository;
use crate::store::{Table, Write};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unchanged,
    Modified,
    Deleted,
    /// Unchanged, but the commit must verify its token
    Guarded,
}

#[derive(Debug, Clone)]
struct Entry<E> {
    state: EntryState,
    value: E,
    /// As last read from or written to the store, or as first staged if
    /// never read
    original: E,
}

impl<E: Clone> Entry<E> {
    fn unchanged(value: E) -> Self {
        Self { state: EntryState::Unchanged, original: value.clone(), value }
    }

    fn staged(state: EntryState, value: E) -> Self {
        Self { state, original: value.clone(), value }
    }
}

/// Tracked entities of type `E` backed by table store `S`.
pub struct EntitySet<E: Entity, S> {
    store: Arc<S>,
    entries: BTreeMap<E::Key, Entry<E>>,
    added: Vec<E>,
}

impl<E: Entity, S> EntitySet<E, S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, entries: BTreeMap::new(), added: Vec::new() }
    }

    pub fn state(&self, key: &E::Key) -> Option<EntryState> {
        self.entries.get(key).map(|e| e.state)
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || self.entries.values().any(|e| e.state != EntryState::Unchanged)
    }

    /// Mark `entity` for a token check at the next commit
    pub fn guard(&mut self, entity: E) {
        match self.entries.get_mut(&entity.key()) {
            Some(entry) if entry.state == EntryState::Unchanged => {
                entry.state = EntryState::Guarded;
                entry.value = entity;
            }
            Some(_) => {}
            None => {
                self.entries.insert(entity.key(), Entry::staged(EntryState::Guarded, entity));
            }
        }
    }

    /// Writes to send to the store
    pub fn pending(&self) -> Vec<Write<E>> {
        let staged = self.entries.values().filter_map(|entry| match entry.state {
            EntryState::Unchanged => None,
            EntryState::Modified => Some(Write::Update(entry.value.clone())),
            EntryState::Deleted => Some(Write::Delete(entry.value.clone())),
            EntryState::Guarded => Some(Write::Guard(entry.value.clone())),
        });
        self.added.iter().cloned().map(Write::Insert).chain(staged).collect()
    }

    /// Fold a successful commit back in; `persisted` carries the stored
    /// versions of every inserted and updated entity.
    pub fn accepted(&mut self, persisted: Vec<E>) {
        self.added.clear();
        self.entries.retain(|_, entry| entry.state != EntryState::Deleted);
        for entry in self.entries.values_mut() {
            entry.state = EntryState::Unchanged;
            entry.original = entry.value.clone();
        }
        for entity in persisted {
            self.entries.insert(entity.key(), Entry::unchanged(entity));
        }
    }

    /// Discard staged writes, restoring the original values. Entities stay
    /// tracked so a later reload can find them.
    pub fn reject(&mut self) {
        self.added.clear();
        for entry in self.entries.values_mut() {
            if entry.state != EntryState::Unchanged {
                entry.value = entry.original.clone();
                entry.state = EntryState::Unchanged;
            }
        }
    }

    pub fn validation_errors(&self) -> Vec<ValidationError> {
        let modified = self
            .entries
            .values()
            .filter(|e| e.state == EntryState::Modified)
            .map(|e| &e.value);
        self.added.iter().chain(modified).flat_map(|e| e.validate()).collect()
    }
}

impl<E: Entity, S: Table<E>> Repository<E> for EntitySet<E, S> {
    fn create(&mut self, entity: E) -> Result<E> {
        trace!("Staging create of {} {}", E::NAME, entity.key());
        self.added.push(entity.clone());
        Ok(entity)
    }

    fn update(&mut self, entity: E) -> Result<E> {
        trace!("Staging update of {} {}", E::NAME, entity.key());
        match self.entries.get_mut(&entity.key()) {
            Some(entry) => {
                entry.state = EntryState::Modified;
                entry.value = entity.clone();
            }
            None => {
                self.entries.insert(entity.key(), Entry::staged(EntryState::Modified, entity.clone()));
            }
        }
        Ok(entity)
    }

    fn delete(&mut self, entity: E) -> Result<E> {
        trace!("Staging delete of {} {}", E::NAME, entity.key());
        match self.entries.get_mut(&entity.key()) {
            Some(entry) => {
                entry.state = EntryState::Deleted;
                entry.value = entity.clone();
            }
            None => {
                self.entries.insert(entity.key(), Entry::staged(EntryState::Deleted, entity.clone()));
            }
        }
        Ok(entity)
    }

    fn get_by_id(&mut self, key: &E::Key) -> Result<Option<E>> {
        if let Some(entry) = self.entries.get(key) {
            return Ok((entry.state != EntryState::Deleted).then(|| entry.value.clone()));
        }
        let fetched = self.store.fetch(key)?;
        if let Some(entity) = &fetched {
            self.entries.insert(*key, Entry::unchanged(entity.clone()));
        }
        Ok(fetched)
    }

    fn get_all(&mut self) -> Result<Vec<E>> {
        for entity in self.store.fetch_all()? {
            self.entries.entry(entity.key()).or_insert_with(|| Entry::unchanged(entity));
        }
        Ok(self.local())
    }

    fn flush(&mut self) {
        self.entries.clear();
        self.added.clear();
    }

    fn local(&self) -> Vec<E> {
        let tracked = self
            .entries
            .values()
            .filter(|e| e.state != EntryState::Deleted)
            .map(|e| e.value.clone());
        tracked.chain(self.added.iter().cloned()).collect()
    }

    fn reload(&mut self, keys: &[E::Key]) -> Result<Vec<E>> {
        for key in keys {
            self.entries.remove(key);
        }
        let fresh = self.store.fetch_many(keys)?;
        for entity in &fresh {
            self.entries.insert(entity.key(), Entry::unchanged(entity.clone()));
        }
        Ok(fresh)
    }
}
