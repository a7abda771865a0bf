//! SQLite-backed store
//!
//! Jobs and assets live in one database file opened in WAL mode. Row versions
//! come from a database-wide sequence and surface as 8-byte concurrency
//! tokens. Updates, deletes and guards match on `(id, row_version)`; a
//! statement that touches no row fails the whole transaction.

use crate::error::{DataError, Result};
use crate::model::{Asset, Entity, Job};
use crate::store::{Committed, Store, Table, Write, WriteBatch};
use chrono::DateTime;
use rel_merge::ConcurrencyToken;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS row_versions (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        value INTEGER NOT NULL
    );
    INSERT OR IGNORE INTO row_versions (id, value) VALUES (1, 0);
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        city TEXT,
        street1 TEXT,
        street2 TEXT,
        state TEXT,
        postal_code TEXT,
        locked_by TEXT,
        locked_on INTEGER,
        row_version INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS assets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        service_area TEXT NOT NULL,
        maximum_and_minimum_decay REAL,
        max_min_decay_with_step_and_tol REAL,
        minimum_decay REAL NOT NULL,
        monotonic_tolerance REAL,
        percent_tolerance REAL,
        static_tolerance REAL,
        row_version INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS assets_job_id ON assets (job_id);
";

/// Row mapping for one table.
trait SqlEntity: Entity<Key = i64> {
    const TABLE: &'static str;
    const SELECT: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Insert and return the row id
    fn insert(&self, conn: &Connection, version: i64) -> rusqlite::Result<i64>;

    /// Update if the stored version is `expected`; returns rows touched
    fn update(&self, conn: &Connection, version: i64, expected: i64) -> rusqlite::Result<usize>;
}

fn token_from_column(version: i64) -> Option<ConcurrencyToken> {
    Some(ConcurrencyToken::from_u64(version as u64))
}

impl SqlEntity for Asset {
    const TABLE: &'static str = "assets";
    const SELECT: &'static str = "SELECT id, job_id, name, service_area, maximum_and_minimum_decay, \
        max_min_decay_with_step_and_tol, minimum_decay, monotonic_tolerance, percent_tolerance, \
        static_tolerance, row_version FROM assets";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Asset {
            id: row.get(0)?,
            job_id: row.get(1)?,
            name: row.get(2)?,
            service_area: row.get(3)?,
            maximum_and_minimum_decay: row.get(4)?,
            max_min_decay_with_step_and_tol: row.get(5)?,
            minimum_decay: row.get(6)?,
            monotonic_tolerance: row.get(7)?,
            percent_tolerance: row.get(8)?,
            static_tolerance: row.get(9)?,
            row_version: token_from_column(row.get(10)?),
        })
    }

    fn insert(&self, conn: &Connection, version: i64) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO assets (id, job_id, name, service_area, maximum_and_minimum_decay, \
             max_min_decay_with_step_and_tol, minimum_decay, monotonic_tolerance, percent_tolerance, \
             static_tolerance, row_version) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                (self.id != 0).then_some(self.id),
                self.job_id,
                self.name,
                self.service_area,
                self.maximum_and_minimum_decay,
                self.max_min_decay_with_step_and_tol,
                self.minimum_decay,
                self.monotonic_tolerance,
                self.percent_tolerance,
                self.static_tolerance,
                version,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection, version: i64, expected: i64) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE assets SET job_id = ?3, name = ?4, service_area = ?5, maximum_and_minimum_decay = ?6, \
             max_min_decay_with_step_and_tol = ?7, minimum_decay = ?8, monotonic_tolerance = ?9, \
             percent_tolerance = ?10, static_tolerance = ?11, row_version = ?12 \
             WHERE id = ?1 AND row_version = ?2",
            rusqlite::params![
                self.id,
                expected,
                self.job_id,
                self.name,
                self.service_area,
                self.maximum_and_minimum_decay,
                self.max_min_decay_with_step_and_tol,
                self.minimum_decay,
                self.monotonic_tolerance,
                self.percent_tolerance,
                self.static_tolerance,
                version,
            ],
        )
    }
}

impl SqlEntity for Job {
    const TABLE: &'static str = "jobs";
    const SELECT: &'static str = "SELECT id, name, city, street1, street2, state, postal_code, \
        locked_by, locked_on, row_version FROM jobs";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let locked_on: Option<i64> = row.get(8)?;
        Ok(Job {
            id: row.get(0)?,
            name: row.get(1)?,
            city: row.get(2)?,
            street1: row.get(3)?,
            street2: row.get(4)?,
            state: row.get(5)?,
            postal_code: row.get(6)?,
            locked_by: row.get(7)?,
            locked_on: locked_on.and_then(DateTime::from_timestamp_millis),
            row_version: token_from_column(row.get(9)?),
        })
    }

    fn insert(&self, conn: &Connection, version: i64) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO jobs (id, name, city, street1, street2, state, postal_code, locked_by, \
             locked_on, row_version) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                (self.id != 0).then_some(self.id),
                self.name,
                self.city,
                self.street1,
                self.street2,
                self.state,
                self.postal_code,
                self.locked_by,
                self.locked_on.map(|t| t.timestamp_millis()),
                version,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection, version: i64, expected: i64) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE jobs SET name = ?3, city = ?4, street1 = ?5, street2 = ?6, state = ?7, \
             postal_code = ?8, locked_by = ?9, locked_on = ?10, row_version = ?11 \
             WHERE id = ?1 AND row_version = ?2",
            rusqlite::params![
                self.id,
                expected,
                self.name,
                self.city,
                self.street1,
                self.street2,
                self.state,
                self.postal_code,
                self.locked_by,
                self.locked_on.map(|t| t.timestamp_millis()),
                version,
            ],
        )
    }
}

fn next_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("UPDATE row_versions SET value = value + 1 WHERE id = 1 RETURNING value", [], |r| r.get(0))
}

fn expected_version<E: SqlEntity>(entity: &E) -> Result<i64> {
    entity
        .row_version()
        .and_then(ConcurrencyToken::to_u64)
        .map(|v| v as i64)
        .ok_or_else(|| DataError::concurrency(E::NAME, entity.key()))
}

fn write_all<E: SqlEntity>(conn: &Connection, writes: &[Write<E>]) -> Result<Vec<E>> {
    let mut persisted = Vec::new();
    for write in writes {
        match write {
            Write::Insert(entity) => {
                let version = next_version(conn)?;
                let id = entity.insert(conn, version).map_err(|e| match e {
                    // someone else already holds this key
                    rusqlite::Error::SqliteFailure(ref f, _)
                        if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                    {
                        DataError::concurrency(E::NAME, entity.key())
                    }
                    e => DataError::from(e),
                })?;
                let mut row = entity.clone();
                row.set_key(id);
                row.set_row_version(token_from_column(version));
                persisted.push(row);
            }
            Write::Update(entity) => {
                let expected = expected_version(entity)?;
                let version = next_version(conn)?;
                if entity.update(conn, version, expected)? == 0 {
                    return Err(DataError::concurrency(E::NAME, entity.key()));
                }
                let mut row = entity.clone();
                row.set_row_version(token_from_column(version));
                persisted.push(row);
            }
            Write::Delete(entity) => {
                let expected = expected_version(entity)?;
                let sql = format!("DELETE FROM {} WHERE id = ?1 AND row_version = ?2", E::TABLE);
                if conn.execute(&sql, rusqlite::params![entity.key(), expected])? == 0 {
                    return Err(DataError::concurrency(E::NAME, entity.key()));
                }
            }
            Write::Guard(entity) => {
                let expected = expected_version(entity)?;
                let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?1 AND row_version = ?2", E::TABLE);
                let count: i64 = conn.query_row(&sql, rusqlite::params![entity.key(), expected], |r| r.get(0))?;
                if count == 0 {
                    return Err(DataError::concurrency(E::NAME, entity.key()));
                }
            }
        }
    }
    Ok(persisted)
}

fn fetch<E: SqlEntity>(conn: &Connection, key: i64) -> Result<Option<E>> {
    let mut stmt = conn.prepare_cached(&format!("{} WHERE id = ?1", E::SELECT))?;
    Ok(stmt.query_row([key], E::from_row).optional()?)
}

fn fetch_all<E: SqlEntity>(conn: &Connection) -> Result<Vec<E>> {
    let mut stmt = conn.prepare_cached(&format!("{} ORDER BY id", E::SELECT))?;
    let rows = stmt.query_map([], E::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// SQLite store; one connection behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        info!("Opened SQLite store at {:?}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch_many<E: SqlEntity>(&self, keys: &[i64]) -> Result<Vec<E>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(row) = fetch::<E>(&tx, *key)? {
                rows.push(row);
            }
        }
        tx.commit()?;
        Ok(rows)
    }
}

impl Table<Asset> for SqliteStore {
    fn fetch(&self, key: &i64) -> Result<Option<Asset>> {
        fetch(&self.lock(), *key)
    }

    fn fetch_all(&self) -> Result<Vec<Asset>> {
        fetch_all(&self.lock())
    }

    fn fetch_many(&self, keys: &[i64]) -> Result<Vec<Asset>> {
        SqliteStore::fetch_many(self, keys)
    }
}

impl Table<Job> for SqliteStore {
    fn fetch(&self, key: &i64) -> Result<Option<Job>> {
        fetch(&self.lock(), *key)
    }

    fn fetch_all(&self) -> Result<Vec<Job>> {
        fetch_all(&self.lock())
    }

    fn fetch_many(&self, keys: &[i64]) -> Result<Vec<Job>> {
        SqliteStore::fetch_many(self, keys)
    }
}

impl Store for SqliteStore {
    fn commit(&self, batch: &WriteBatch) -> Result<Committed> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let jobs = write_all(&tx, &batch.jobs)?;
        let assets = write_all(&tx, &batch.assets)?;
        tx.commit()?;
        debug!("Committed {} writes", batch.len());
        Ok(Committed { assets, jobs })
    }
}
