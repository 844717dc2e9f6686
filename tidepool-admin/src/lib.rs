// Administrative configuration: the options a table is created with and
// the settings a row store is opened with. Both arrive as string property
// bags and are kept in a canonical form (upper-case keys, every key
// present, values normalized) so that equal configurations compare and
// hash equal however they were spelled.

mod options;
mod props;
mod store;


pub use options::{
    TableOptions, DEFAULT_BUCKETS, DEFAULT_COLUMN_BATCH_SIZE, MAX_REDUNDANCY,
};
pub use props::{canonicalize, Props};
pub use store::{AccessMode, StoreConfig, StoreLocation};
