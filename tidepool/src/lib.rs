// A tidepool store keeps each column table in two regions of a row store:
// a base region of recently inserted rows, and a shadow table of
// immutable, compressed column batches. Rows are routed to buckets by a
// hash of their partition columns; once a bucket has accumulated a full
// batch worth of rows they are moved, in one transaction, into a batch.
//
// Row stores are shared through a registry keyed by their canonical
// configuration, and table definitions are served from a cache that
// callers invalidate when a definition changes.

mod catalog;
mod partition;
mod registry;
mod table;


pub use catalog::{Capabilities, RelationCache, TableDef, TableKind};
pub use partition::Partitioner;
pub use registry::{StoreHandle, StoreRegistry};
pub use table::ColumnTable;

pub use tidepool_admin::{AccessMode, StoreConfig, TableOptions};
pub use tidepool_base::{Error, ErrorKind, Result};
pub use tidepool_coldb::{BatchKey, Cmp, Filter, Predicate};
pub use tidepool_lang::{row, Field, Row, Schema, Ty, Val};
