use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tidepool_admin::TableOptions;
use tidepool_base::{err_kind, Error, ErrorKind, Result};
use tidepool_lang::Schema;
use tidepool_rowdb::RowDb;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    // Plain row table: every row stays in the base region.
    Row,
    // Bucketed base region plus column batches.
    Column,
    // Fed by a stream source; append-only from the outside.
    Stream,
    // Column batches holding a sample of another table.
    Sample,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Capabilities {
    pub insert: bool,
    pub column_batches: bool,
    pub truncate: bool,
}

impl TableKind {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            TableKind::Row => Capabilities {
                insert: true,
                column_batches: false,
                truncate: true,
            },
            TableKind::Column => Capabilities {
                insert: true,
                column_batches: true,
                truncate: true,
            },
            TableKind::Stream => Capabilities {
                insert: false,
                column_batches: false,
                truncate: false,
            },
            TableKind::Sample => Capabilities {
                insert: false,
                column_batches: true,
                truncate: true,
            },
        }
    }
}

/// What the store catalog records about a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub kind: TableKind,
    pub schema: Schema,
    pub options: TableOptions,
}

impl TableDef {
    pub fn save(&self, db: &RowDb) -> Result<()> {
        let bytes = rmp_serde::to_vec(self).map_err(|e| Error::with_kind(ErrorKind::Persist, e))?;
        db.put_catalog_entry(&self.name, &bytes)
    }

    pub fn load(db: &RowDb, name: &str) -> Result<TableDef> {
        let bytes = db
            .catalog_entry(name)?
            .ok_or_else(|| err_kind(ErrorKind::NotFound, format!("no table named {}", name)))?;
        rmp_serde::from_slice(&bytes).map_err(|e| Error::with_kind(ErrorKind::Corrupt, e))
    }

    pub fn exists(db: &RowDb, name: &str) -> Result<bool> {
        Ok(db.catalog_entry(name)?.is_some())
    }
}

/// Caches table definitions read from a store's catalog. Every
/// invalidation advances a generation counter, so a caller can tell
/// whether anything was invalidated since it last looked.
pub struct RelationCache {
    db: Arc<RowDb>,
    entries: RwLock<HashMap<String, Arc<TableDef>>>,
    generation: AtomicU64,
}

impl RelationCache {
    pub fn new(db: Arc<RowDb>) -> Self {
        RelationCache {
            db,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<TableDef>> {
        if let Some(def) = self.entries.read().get(name) {
            return Ok(def.clone());
        }
        let def = Arc::new(TableDef::load(&self.db, name)?);
        self.entries
            .write()
            .entry(name.to_string())
            .or_insert_with(|| def.clone());
        Ok(def)
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Forgets one definition and returns the new generation.
    pub fn invalidate(&self, name: &str) -> u64 {
        self.entries.write().remove(name);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(target: "tidepool", table = name, generation, "invalidated relation");
        generation
    }

    pub fn invalidate_all(&self) -> u64 {
        self.entries.write().clear();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(target: "tidepool", generation, "invalidated all relations");
        generation
    }
}
