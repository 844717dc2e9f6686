use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tidepool_admin::{AccessMode, StoreConfig, StoreLocation};
use tidepool_base::{err_kind, ErrorKind, Result};
use tidepool_rowdb::{ConnMode, RowDb};
use tracing::debug;

struct Entry {
    db: Arc<RowDb>,
    refs: usize,
}

type Stores = Arc<Mutex<HashMap<StoreConfig, Entry>>>;

// Drops one reference; true when it was the last and the store is gone.
fn release_ref(stores: &Stores, config: &StoreConfig) -> bool {
    let mut stores = stores.lock();
    let Some(entry) = stores.get_mut(config) else {
        return false;
    };
    entry.refs -= 1;
    if entry.refs > 0 {
        return false;
    }
    stores.remove(config);
    debug!(target: "tidepool", %config, "tore down row store");
    true
}

/// A counted reference to a registered row store. The reference is given
/// back by `StoreRegistry::release` or when the handle is dropped. Every
/// open `ColumnTable` holds a handle of its own.
pub struct StoreHandle {
    config: StoreConfig,
    db: Arc<RowDb>,
    stores: Stores,
    live: bool,
}

impl StoreHandle {
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<RowDb> {
        &self.db
    }

    pub fn mode(&self) -> ConnMode {
        match self.config.mode {
            AccessMode::Embedded => ConnMode::Embedded,
            AccessMode::Remote => ConnMode::Remote,
        }
    }

    /// Takes another counted reference to the same store.
    pub fn retain(&self) -> StoreHandle {
        if let Some(entry) = self.stores.lock().get_mut(&self.config) {
            entry.refs += 1;
        }
        StoreHandle {
            config: self.config.clone(),
            db: self.db.clone(),
            stores: self.stores.clone(),
            live: true,
        }
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        if self.live {
            self.live = false;
            release_ref(&self.stores, &self.config);
        }
    }
}

/// Shares open row stores between users of the same configuration. A
/// store is opened on its first `acquire` and torn down when the last
/// handle is released, including the handles held by open tables.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Stores,
}

impl StoreRegistry {
    pub fn new() -> Self {
        StoreRegistry::default()
    }

    pub fn acquire(&self, config: &StoreConfig) -> Result<StoreHandle> {
        let mut stores = self.stores.lock();
        if let Some(entry) = stores.get_mut(config) {
            entry.refs += 1;
            return Ok(StoreHandle {
                config: config.clone(),
                db: entry.db.clone(),
                stores: self.stores.clone(),
                live: true,
            });
        }
        let db = match &config.location {
            StoreLocation::Path(path) => RowDb::create(path)?,
            StoreLocation::Memory(_) => RowDb::in_memory()?,
        };
        let db = Arc::new(db.with_members(config.members.clone()));
        debug!(target: "tidepool", %config, "opened row store");
        stores.insert(
            config.clone(),
            Entry {
                db: db.clone(),
                refs: 1,
            },
        );
        Ok(StoreHandle {
            config: config.clone(),
            db,
            stores: self.stores.clone(),
            live: true,
        })
    }

    /// Returns true when this was the last reference and the store was
    /// torn down.
    pub fn release(&self, mut handle: StoreHandle) -> Result<bool> {
        if !Arc::ptr_eq(&self.stores, &handle.stores) {
            return Err(err_kind(
                ErrorKind::NotFound,
                format!("store {} is not registered here", handle.config),
            ));
        }
        handle.live = false;
        Ok(release_ref(&self.stores, &handle.config))
    }

    pub fn ref_count(&self, config: &StoreConfig) -> usize {
        self.stores.lock().get(config).map(|e| e.refs).unwrap_or(0)
    }

    pub fn is_open(&self, config: &StoreConfig) -> bool {
        self.stores.lock().contains_key(config)
    }
}
