// The row store is an embedded redb database standing in for the host
// engine's transactional tables. Everything is stored in byte-keyed
// redb tables:
//
//   __tidepool_catalog   name -> encoded table definition
//   <T>                  base rows:   bucket . seq          -> encoded row
//   <T>_COLUMN_STORE_    shadow rows: bucket . uuid . slot  -> header / column
//
// Buckets lead every key so that a bucket's rows are contiguous and a
// bucket-restricted scan is a handful of range reads. Slot 0 of a
// shadow row is its header (uuid, bucket, row count, stats); slot i is
// the buffer of the i-th schema column.

mod base;
mod conn;
mod db;
mod keys;
mod placement;
mod store;


pub use base::BaseTable;
pub use conn::{Conn, ConnMode, ShadowCursor, ShadowHeader, ShadowRow};
pub use db::RowDb;
pub use keys::shadow_table_name;
pub use placement::Placement;
pub use store::{BatchScan, BatchStore, MovingSink, ScanRequest, ScannedBatch};
