//! Durable entry persistence backed by [`redb`].
//!
//! The draft store is the single source of truth while offline and the only
//! resource mutated by multiple concurrent actors (interactive session and
//! background pipeline tasks).  All mutations go through [`DraftStore::save`]
//! or [`DraftStore::update`]; `update` performs the whole read-modify-write
//! inside one write transaction, which redb serializes, so concurrent writers
//! cannot lose each other's updates.
//!
//! # Table
//!
//! | Name      | Key               | Value                       |
//! |-----------|-------------------|-----------------------------|
//! | `entries` | UUID string (36c) | serde_json-encoded [`Entry`] |
//!
//! Values stay JSON rather than a binary codec: the round-trip is lossless
//! for every entry field (ordered conversation, tag id variants) and the
//! on-disk records remain inspectable when debugging sync issues.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::schema::Entry;

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("draft database error: {0}")]
    Database(#[from] redb::Error),
    #[error("entry encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        Self::Database(err.into())
    }
}

pub struct DraftStore {
    db: Database,
    path: PathBuf,
}

impl DraftStore {
    /// Open or create the draft database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)?;

        // Ensure the table exists so first reads don't fail.
        {
            let tx = db.begin_write()?;
            tx.open_table(ENTRIES_TABLE)?;
            tx.commit()?;
        }

        Ok(Self { db, path })
    }

    /// Insert or overwrite `entry` under its id.
    pub fn save(&self, entry: &Entry) -> Result<(), StoreError> {
        let key = entry.id.to_string();
        let bytes = serde_json::to_vec(entry)?;

        let tx = self.db.begin_write()?;
        {
            let mut tbl = tx.open_table(ENTRIES_TABLE)?;
            tbl.insert(key.as_str(), bytes.as_slice())?;
        }
        tx.commit()?;

        debug!(entry = %entry.id_short(), state = entry.processing_state.slug(), "entry persisted");
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<Option<Entry>, StoreError> {
        let key = id.to_string();
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(ENTRIES_TABLE)?;
        match tbl.get(key.as_str())? {
            None => Ok(None),
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
        }
    }

    /// All entries, newest first.
    pub fn load_all(&self) -> Result<Vec<Entry>, StoreError> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(ENTRIES_TABLE)?;
        let mut entries = Vec::new();
        for item in tbl.iter()? {
            let (_, v) = item?;
            entries.push(serde_json::from_slice::<Entry>(v.value())?);
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Remove the entry.  Returns whether it existed.
    pub fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let key = id.to_string();
        let tx = self.db.begin_write()?;
        let existed = {
            let mut tbl = tx.open_table(ENTRIES_TABLE)?;
            tbl.remove(key.as_str())?.is_some()
        };
        tx.commit()?;
        Ok(existed)
    }

    /// Atomic per-key read-modify-write.
    ///
    /// Loads the entry, applies `apply`, bumps `updated_at`, and writes it
    /// back — all inside a single write transaction.  Returns the updated
    /// entry, or `None` when the id is unknown.
    pub fn update<F>(&self, id: Uuid, apply: F) -> Result<Option<Entry>, StoreError>
    where
        F: FnOnce(&mut Entry),
    {
        let key = id.to_string();
        let tx = self.db.begin_write()?;
        let updated = {
            let mut tbl = tx.open_table(ENTRIES_TABLE)?;
            let existing = tbl.get(key.as_str())?.map(|v| v.value().to_vec());
            match existing {
                None => None,
                Some(bytes) => {
                    let mut entry: Entry = serde_json::from_slice(&bytes)?;
                    apply(&mut entry);
                    entry.touch();
                    let bytes = serde_json::to_vec(&entry)?;
                    tbl.insert(key.as_str(), bytes.as_slice())?;
                    Some(entry)
                }
            }
        };
        tx.commit()?;
        Ok(updated)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        use redb::ReadableTableMetadata;
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(ENTRIES_TABLE)?;
        Ok(tbl.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
