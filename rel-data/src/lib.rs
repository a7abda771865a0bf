//! Rel data layer
//!
//! Offline change sets applied to a partitioned store:
//! - Asset and Job (partition) records
//! - Change sets and their validation
//! - Repository and data-context traits, with a change-tracking unit of work
//! - In-memory and SQLite stores with token-checked atomic commits
//! - Partition locks
//! - Conflict resolvers and the change-set processor
//! - JSON configuration and metrics instrumentation

pub mod changeset;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lock;
pub mod memory;
pub mod model;
pub mod processor;
pub mod repository;
pub mod resolver;
pub mod sqlite;
pub mod store;
pub mod tracking;

pub use changeset::{ChangeAction, ChangeItem, ChangeSet, InvalidChangeItem};
pub use config::{ChangeSetConfig, DataConfig, MAX_LOCK_THRESHOLD};
pub use diagnostics::{ChangeSetScope, Phase, PhaseTimer};
pub use error::{DataError, ProcessError, Result};
pub use lock::{Identity, LockStatus, PartitionLock};
pub use memory::MemoryStore;
pub use model::{Asset, Entity, Job, ValidationError};
pub use processor::ChangeSetProcessor;
pub use repository::{DataContext, Repository};
pub use resolver::{ConflictResolver, MergeConcurrentEdits, RejectConcurrentEdits};
pub use sqlite::SqliteStore;
pub use store::{Committed, Store, Table, UnitOfWork, Write, WriteBatch};
pub use tracking::{EntitySet, EntryState};
