// A column batch holds up to `batch_size_limit` rows of one bucket, one
// sealed buffer per schema field. Each buffer is laid out as:
//
//   - flags (1 byte) -- bit 0 set when the body is LZ4-compressed, in
//     which case the body is prefixed with its uncompressed size
//   - body:
//     - lane kind (1 byte): bit, int (ints and decimals), flo, str
//     - row count (u32)
//     - null flag (1 byte), then a null bitmap per 256-row chunk if set
//     - lane payload:
//       - Bit: one 256-bit bitmap per chunk
//       - Int: frame-of-reference against the lane min, 1/2/4/8-byte words
//       - Flo: 8-byte little-endian words
//       - Str: plain (heap + offset/len words), dict (sorted entries in a
//         heap + code words) or dict with run-end coded codes
//
// Null rows still occupy a lane slot (false / 0 / 0.0 / ""), so every
// lane in a batch has exactly `rows` slots.
//
// Compression is decided per batch but kept per buffer only when it
// actually shrinks it.
//
// Batches move through three types: an open `BatchBuilder`, a
// `SealedBatch` (finalized, no key) and a keyed `ColumnBatch` that the
// sink has persisted.

mod batch;
mod builder;
mod column;
mod dict;
mod heap;
mod ioutil;
mod stats;
mod wordty;


pub use batch::{BatchKey, BatchSink, ColumnBatch, SealedBatch, INVALID_BUCKET};
pub use builder::{BatchBuilder, BuildOptions};
pub use column::{decode_column, Column, Vals};
pub use stats::{BatchStats, Cmp, ColumnStats, Filter, Predicate};
pub use uuid::Uuid;
