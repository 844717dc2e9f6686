use redb::{Database, ReadOnlyTable, ReadableTable, TableDefinition, TableError, WriteTransaction};
use parking_lot::Mutex;
use std::{collections::HashMap, path::Path, sync::Arc};
use tidepool_base::{Error, ErrorKind, Result};
use tracing::{debug, warn};

pub(crate) type Raw = &'static [u8];

pub(crate) fn raw_table(name: &str) -> TableDefinition<'_, Raw, Raw> {
    TableDefinition::new(name)
}

pub(crate) fn persist_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
    Error::with_kind(ErrorKind::Persist, e)
}

pub(crate) fn scan_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
    Error::with_kind(ErrorKind::Scan, e)
}

const CATALOG: &str = "__tidepool_catalog";

/// An open row store. Writers are serialized by redb; readers see the
/// last committed state and never block writers.
pub struct RowDb {
    db: Database,
    members: Vec<String>,
    move_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RowDb {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path).map_err(persist_err)?;
        RowDb::init(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = redb::Builder::new()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(persist_err)?;
        RowDb::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        let rowdb = RowDb {
            db,
            members: vec!["local".to_string()],
            move_locks: Mutex::new(HashMap::new()),
        };
        rowdb.ensure_table(CATALOG)?;
        Ok(rowdb)
    }

    /// Names the cluster members that hold copies of this store's
    /// buckets, in placement order. A fresh store has one member.
    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.members = members;
        self
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// The lock serializing moves of table `name`'s base rows into
    /// batches. Every holder of this store gets the same lock for a name.
    pub fn move_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.move_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    // Runs `f` in one write transaction, committing only if it succeeds.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<T> {
        let wtxn = self.db.begin_write().map_err(persist_err)?;
        match f(&wtxn) {
            Ok(out) => {
                wtxn.commit().map_err(persist_err)?;
                Ok(out)
            }
            Err(e) => {
                if let Err(abort) = wtxn.abort() {
                    warn!(target: "tidepool", %abort, "abort after failed write also failed");
                }
                Err(e)
            }
        }
    }

    // Runs `f` against a snapshot of table `name`; None if the table does
    // not exist.
    pub(crate) fn read<T>(
        &self,
        name: &str,
        f: impl FnOnce(&ReadOnlyTable<Raw, Raw>) -> Result<T>,
    ) -> Result<Option<T>> {
        let rtxn = self.db.begin_read().map_err(scan_err)?;
        let table = match rtxn.open_table(raw_table(name)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(scan_err(e)),
        };
        f(&table).map(Some)
    }

    pub fn ensure_table(&self, name: &str) -> Result<()> {
        self.write(|wtxn| {
            wtxn.open_table(raw_table(name)).map_err(persist_err)?;
            Ok(())
        })
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.read(name, |_| Ok(()))?.is_some())
    }

    pub fn drop_table(&self, name: &str) -> Result<bool> {
        let dropped = self.write(|wtxn| wtxn.delete_table(raw_table(name)).map_err(persist_err))?;
        debug!(target: "tidepool", table = name, dropped, "dropped row-store table");
        Ok(dropped)
    }

    // Empties a table, leaving it in place.
    pub fn clear_table(&self, name: &str) -> Result<()> {
        self.write(|wtxn| {
            wtxn.delete_table(raw_table(name)).map_err(persist_err)?;
            wtxn.open_table(raw_table(name)).map_err(persist_err)?;
            Ok(())
        })
    }

    pub fn put_catalog_entry(&self, name: &str, def: &[u8]) -> Result<()> {
        self.write(|wtxn| {
            let mut t = wtxn.open_table(raw_table(CATALOG)).map_err(persist_err)?;
            t.insert(name.as_bytes(), def).map_err(persist_err)?;
            Ok(())
        })
    }

    pub fn catalog_entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let entry = self.read(CATALOG, |t| {
            Ok(t
                .get(name.as_bytes())
                .map_err(scan_err)?
                .map(|g| g.value().to_vec()))
        })?;
        Ok(entry.flatten())
    }

    pub fn remove_catalog_entry(&self, name: &str) -> Result<bool> {
        self.write(|wtxn| {
            let mut t = wtxn.open_table(raw_table(CATALOG)).map_err(persist_err)?;
            let removed = t.remove(name.as_bytes()).map_err(persist_err)?.is_some();
            Ok(removed)
        })
    }

    pub fn catalog_names(&self) -> Result<Vec<String>> {
        let names = self.read(CATALOG, |t| {
            let mut names = Vec::new();
            for item in t.iter().map_err(scan_err)? {
                let (k, _) = item.map_err(scan_err)?;
                let name = std::str::from_utf8(k.value())
                    .map_err(|e| Error::with_kind(ErrorKind::Corrupt, e))?;
                names.push(name.to_string());
            }
            Ok(names)
        })?;
        Ok(names.unwrap_or_default())
    }
}
