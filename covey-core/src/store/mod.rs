//! Embedded table store
//!
//! One LMDB environment per node holding every table's rows in a single
//! `rows` database keyed `"{table}/{record_id}"`. The store is the unit of
//! snapshot sync: the primary ships its `data.mdb` file verbatim and a
//! replica swaps its own file out wholesale.
//!
//! Committed writes are reported to registered [`MutationObserver`]s after
//! the transaction commits; the replication layer hangs off that seam.

pub mod value;

pub use value::{FieldValue, Fields, sanitize_fields};

use crate::error::{Error, Result};
use chrono::Utc;
use heed::types::{SerdeJson, Str};
use heed::{CompactionOption, Database, Env, EnvOpenOptions};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// LMDB data file name inside the store directory
const DATA_FILE: &str = "data.mdb";
/// LMDB reader-lock file name; stale after a wholesale file swap
const LOCK_FILE: &str = "lock.mdb";
/// Pause after swapping the data file before reopening the environment
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Kind of committed write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationKind {
    /// A new row was created
    Insert,
    /// Fields of an existing row were overwritten
    Update,
    /// A row was soft-deleted (marker written, identity preserved)
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Insert => write!(f, "INSERT"),
            MutationKind::Update => write!(f, "UPDATE"),
            MutationKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// A stored row: a typed column-to-value mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Column values, including bookkeeping markers such as `deleted_at`
    pub fields: Fields,
}

/// Observer invoked after each committed local write
///
/// Implementations must only log on failure; nothing an observer does may
/// affect the outcome of the write it observed.
pub trait MutationObserver: Send + Sync {
    /// Called once per committed write with the written fields
    fn on_commit(&self, kind: MutationKind, table: &str, record_id: u64, fields: &Fields);
}

/// Open environment plus its row database handle
struct StoreInner {
    env: Env,
    rows: Database<Str, SerdeJson<Row>>,
}

fn open_env(path: &Path, map_size: usize) -> Result<StoreInner> {
    std::fs::create_dir_all(path)?;

    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(map_size)
            .max_dbs(1)
            .open(path)?
    };

    let mut wtxn = env.write_txn()?;
    let rows: Database<Str, SerdeJson<Row>> = env.create_database(&mut wtxn, Some("rows"))?;
    wtxn.commit()?;

    Ok(StoreInner { env, rows })
}

fn row_key(table: &str, record_id: u64) -> String {
    // Zero-padded ids keep prefix iteration in id order
    format!("{}/{:020}", table, record_id)
}

/// Embedded LMDB-backed table store
pub struct TableStore {
    path: PathBuf,
    map_size: usize,
    inner: RwLock<Option<StoreInner>>,
    observers: RwLock<Vec<Arc<dyn MutationObserver>>>,
}

impl TableStore {
    /// Open (or create) the store at the given directory
    ///
    /// Failure here is fatal to startup; there is no degraded mode without
    /// a local store.
    pub fn open(path: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = open_env(&path, map_size)?;

        tracing::info!("Opened table store at {:?}", path);

        Ok(Self {
            path,
            map_size,
            inner: RwLock::new(Some(inner)),
            observers: RwLock::new(Vec::new()),
        })
    }

    /// Register a post-commit observer
    pub fn add_observer(&self, observer: Arc<dyn MutationObserver>) {
        self.observers.write().push(observer);
    }

    fn with_inner<T>(&self, f: impl FnOnce(&StoreInner) -> Result<T>) -> Result<T> {
        let guard = self.inner.read();
        let inner = guard
            .as_ref()
            .ok_or_else(|| Error::store("store is closed"))?;
        f(inner)
    }

    fn notify(&self, kind: MutationKind, table: &str, record_id: u64, fields: &Fields) {
        for observer in self.observers.read().iter() {
            observer.on_commit(kind, table, record_id, fields);
        }
    }

    /// Insert a new row; errors if the id already exists in the table
    pub fn insert(&self, table: &str, record_id: u64, fields: Fields) -> Result<()> {
        self.with_inner(|inner| {
            let mut wtxn = inner.env.write_txn()?;
            let key = row_key(table, record_id);

            if inner.rows.get(&wtxn, &key)?.is_some() {
                return Err(Error::store(format!(
                    "duplicate id {} in table {}",
                    record_id, table
                )));
            }

            inner.rows.put(
                &mut wtxn,
                &key,
                &Row {
                    fields: fields.clone(),
                },
            )?;
            wtxn.commit()?;
            Ok(())
        })?;

        tracing::debug!("Inserted {}/{}", table, record_id);
        self.notify(MutationKind::Insert, table, record_id, &fields);
        Ok(())
    }

    /// Merge fields into an existing row; errors if the row does not exist
    pub fn update(&self, table: &str, record_id: u64, fields: Fields) -> Result<()> {
        self.with_inner(|inner| {
            let mut wtxn = inner.env.write_txn()?;
            let key = row_key(table, record_id);

            let Some(mut row) = inner.rows.get(&wtxn, &key)? else {
                return Err(Error::store(format!(
                    "no row {} in table {}",
                    record_id, table
                )));
            };

            row.fields.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            inner.rows.put(&mut wtxn, &key, &row)?;
            wtxn.commit()?;
            Ok(())
        })?;

        tracing::debug!("Updated {}/{}", table, record_id);
        self.notify(MutationKind::Update, table, record_id, &fields);
        Ok(())
    }

    /// Soft-delete a row by stamping a `deleted_at` marker
    ///
    /// Row identity is preserved for later updates. Deleting a row that
    /// does not exist is a no-op, mirroring an UPDATE that matches zero
    /// rows.
    pub fn soft_delete(&self, table: &str, record_id: u64) -> Result<()> {
        let marker: Fields = [(
            "deleted_at".to_string(),
            FieldValue::Text(Utc::now().to_rfc3339()),
        )]
        .into();

        let deleted = self.with_inner(|inner| {
            let mut wtxn = inner.env.write_txn()?;
            let key = row_key(table, record_id);

            let Some(mut row) = inner.rows.get(&wtxn, &key)? else {
                return Ok(false);
            };

            row.fields
                .extend(marker.iter().map(|(k, v)| (k.clone(), v.clone())));
            inner.rows.put(&mut wtxn, &key, &row)?;
            wtxn.commit()?;
            Ok(true)
        })?;

        if deleted {
            tracing::debug!("Soft-deleted {}/{}", table, record_id);
            self.notify(MutationKind::Delete, table, record_id, &marker);
        }
        Ok(())
    }

    /// Fetch a row by table and id
    pub fn get(&self, table: &str, record_id: u64) -> Result<Option<Row>> {
        self.with_inner(|inner| {
            let rtxn = inner.env.read_txn()?;
            Ok(inner.rows.get(&rtxn, &row_key(table, record_id))?)
        })
    }

    /// Count rows in a table (soft-deleted rows included)
    pub fn count(&self, table: &str) -> Result<u64> {
        self.with_inner(|inner| {
            let rtxn = inner.env.read_txn()?;
            let prefix = format!("{}/", table);
            let mut count = 0;
            for entry in inner.rows.prefix_iter(&rtxn, &prefix)? {
                entry?;
                count += 1;
            }
            Ok(count)
        })
    }

    /// Whether the store holds no rows at all
    pub fn is_empty(&self) -> Result<bool> {
        self.with_inner(|inner| {
            let rtxn = inner.env.read_txn()?;
            Ok(inner.rows.len(&rtxn)? == 0)
        })
    }

    /// Next unused record id for a table (max existing id + 1)
    pub fn next_record_id(&self, table: &str) -> Result<u64> {
        self.with_inner(|inner| {
            let rtxn = inner.env.read_txn()?;
            let prefix = format!("{}/", table);
            let mut max_id = 0u64;
            for entry in inner.rows.prefix_iter(&rtxn, &prefix)? {
                let (key, _) = entry?;
                if let Some(id) = key.rsplit('/').next().and_then(|s| s.parse::<u64>().ok()) {
                    max_id = max_id.max(id);
                }
            }
            Ok(max_id + 1)
        })
    }

    /// Produce a compacted copy of the entire data file
    ///
    /// Safe under concurrent writes; LMDB copies from a consistent read
    /// transaction.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        self.with_inner(|inner| {
            let staging = tempfile::tempdir()?;
            let target = staging.path().join(DATA_FILE);
            inner.env.copy_to_file(&target, CompactionOption::Enabled)?;
            Ok(std::fs::read(&target)?)
        })
    }

    /// Replace the entire data file with the given payload
    ///
    /// Closes the environment, removes the stale reader-lock file, writes
    /// the new data file, waits briefly for the filesystem to settle, and
    /// reopens. Callers serialize this through the cluster's sync guard.
    pub fn replace_with(&self, payload: &[u8]) -> Result<()> {
        let mut guard = self.inner.write();

        if let Some(inner) = guard.take() {
            let StoreInner { env, rows: _ } = inner;
            env.prepare_for_closing().wait();
        }

        let lock_file = self.path.join(LOCK_FILE);
        if lock_file.exists() {
            std::fs::remove_file(&lock_file)?;
        }
        std::fs::write(self.path.join(DATA_FILE), payload)?;
        std::thread::sleep(SETTLE_DELAY);

        *guard = Some(open_env(&self.path, self.map_size)?);

        tracing::info!(
            "Replaced store data file at {:?} ({} bytes)",
            self.path,
            payload.len()
        );
        Ok(())
    }

    /// Directory holding the store files
    pub fn path(&self) -> &Path {
        &self.path
    }
}
