//! # redb-backed Fragment Store
//!
//! A disk-backed store for named query fragments using the redb embedded
//! database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! Fragments are stored under a user-chosen name as header-prefixed
//! postcard bytes (`formats::persistence`), so on-disk records carry the
//! same magic/version validation as any other fragment input.

use crate::formats::{fragment_from_bytes, fragment_to_bytes};
use crate::{Fragment, ProcqError, primitives};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table for fragments: name -> serialized fragment bytes.
const FRAGMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("fragments");

/// A disk-backed store of named fragments.
pub struct FragmentStore {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for FragmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStore").finish_non_exhaustive()
    }
}

impl FragmentStore {
    /// Open or create a fragment store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProcqError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| ProcqError::IoError(e.to_string()))?;

        // Make sure the table exists so reads on a fresh database succeed.
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| ProcqError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(FRAGMENTS)
                .map_err(|e| ProcqError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| ProcqError::IoError(e.to_string()))?;
        }

        Ok(Self { db })
    }

    /// Save a fragment under a name, replacing any previous version.
    pub fn save(&self, name: &str, fragment: &Fragment) -> Result<(), ProcqError> {
        validate_key(name)?;
        let bytes = fragment_to_bytes(fragment)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(FRAGMENTS)
                .map_err(|e| ProcqError::IoError(e.to_string()))?;
            table
                .insert(name, bytes.as_slice())
                .map_err(|e| ProcqError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Load a fragment by name.
    pub fn load(&self, name: &str) -> Result<Fragment, ProcqError> {
        validate_key(name)?;
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(FRAGMENTS)
            .map_err(|e| ProcqError::IoError(e.to_string()))?;

        let bytes = table
            .get(name)
            .map_err(|e| ProcqError::IoError(e.to_string()))?
            .ok_or_else(|| ProcqError::FragmentNotFound(name.to_string()))?;
        fragment_from_bytes(bytes.value())
    }

    /// True when a fragment with the given name exists.
    pub fn contains(&self, name: &str) -> Result<bool, ProcqError> {
        validate_key(name)?;
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(FRAGMENTS)
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        Ok(table
            .get(name)
            .map_err(|e| ProcqError::IoError(e.to_string()))?
            .is_some())
    }

    /// All stored fragment names in lexicographic order.
    pub fn list(&self) -> Result<Vec<String>, ProcqError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(FRAGMENTS)
            .map_err(|e| ProcqError::IoError(e.to_string()))?;

        let mut names = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| ProcqError::IoError(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| ProcqError::IoError(e.to_string()))?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    /// Delete a named fragment.
    pub fn delete(&self, name: &str) -> Result<(), ProcqError> {
        validate_key(name)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        let removed = {
            let mut table = write_txn
                .open_table(FRAGMENTS)
                .map_err(|e| ProcqError::IoError(e.to_string()))?;
            table
                .remove(name)
                .map_err(|e| ProcqError::IoError(e.to_string()))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;

        if removed {
            Ok(())
        } else {
            Err(ProcqError::FragmentNotFound(name.to_string()))
        }
    }

    /// Compact the database.
    pub fn compact(&mut self) -> Result<(), ProcqError> {
        self.db
            .compact()
            .map_err(|e| ProcqError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Fragment names must be non-empty and bounded.
fn validate_key(name: &str) -> Result<(), ProcqError> {
    if name.is_empty() {
        return Err(ProcqError::SerializationError(
            "Fragment name must not be empty".to_string(),
        ));
    }
    if name.len() > primitives::MAX_FRAGMENT_KEY_LENGTH {
        return Err(ProcqError::SerializationError(format!(
            "Fragment name length {} exceeds maximum {}",
            name.len(),
            primitives::MAX_FRAGMENT_KEY_LENGTH
        )));
    }
    Ok(())
}
