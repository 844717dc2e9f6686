use crate::{
    column::{decode_column, Column},
    stats::BatchStats,
};
use std::fmt;
use tidepool_base::{err_kind, ErrorKind, Result};
use tidepool_lang::{Row, Schema, Val};
use uuid::Uuid;

// Bucket -1 is reserved by the row store for "no bucket"; a batch can
// never be keyed to it.
pub const INVALID_BUCKET: i32 = -1;

/// Identity of a persisted batch. The uuid alone is already unique with
/// overwhelming probability; the bucket scopes it for locality.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BatchKey {
    pub uuid: Uuid,
    pub bucket: i32,
}

impl BatchKey {
    pub fn new(uuid: Uuid, bucket: i32) -> Self {
        BatchKey { uuid, bucket }
    }

    pub fn random(bucket: i32) -> Self {
        BatchKey::new(Uuid::new_v4(), bucket)
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.uuid, self.bucket)
    }
}

/// A finalized but not yet keyed batch: the sealed column buffers and
/// their stats, owned by exactly one bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBatch {
    pub(crate) bucket: i32,
    pub(crate) rows: u32,
    pub(crate) cols: Vec<Vec<u8>>,
    pub(crate) stats: BatchStats,
}

impl SealedBatch {
    pub fn bucket(&self) -> i32 {
        self.bucket
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn with_key(self, key: BatchKey) -> Result<ColumnBatch> {
        if key.bucket != self.bucket {
            return Err(err_kind(
                ErrorKind::Other,
                format!("key {} does not belong to bucket {}", key, self.bucket),
            ));
        }
        Ok(ColumnBatch {
            key,
            rows: self.rows,
            cols: self.cols,
            stats: self.stats,
        })
    }
}

/// An immutable, keyed column batch: what the shadow table stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnBatch {
    key: BatchKey,
    rows: u32,
    cols: Vec<Vec<u8>>,
    stats: BatchStats,
}

impl ColumnBatch {
    // Reassembles a batch read back from storage. The caller vouches that
    // the buffers came from a sealed batch.
    pub fn from_parts(key: BatchKey, rows: u32, cols: Vec<Vec<u8>>, stats: BatchStats) -> Self {
        ColumnBatch {
            key,
            rows,
            cols,
            stats,
        }
    }

    pub fn key(&self) -> BatchKey {
        self.key
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    pub fn column_count(&self) -> usize {
        self.cols.len()
    }

    pub fn column_bytes(&self, i: usize) -> Option<&[u8]> {
        self.cols.get(i).map(|c| c.as_slice())
    }

    pub fn column(&self, schema: &Schema, i: usize) -> Result<Column> {
        let field = schema
            .field(i)
            .ok_or_else(|| err_kind(ErrorKind::SchemaMismatch, format!("no field {}", i)))?;
        let buf = self
            .column_bytes(i)
            .ok_or_else(|| err_kind(ErrorKind::Corrupt, format!("batch has no column {}", i)))?;
        let col = decode_column(field.ty, buf)?;
        if col.len() != self.rows as usize {
            return Err(err_kind(
                ErrorKind::Corrupt,
                format!("column {} has {} rows, batch has {}", i, col.len(), self.rows),
            ));
        }
        Ok(col)
    }

    // Row-wise view of the whole batch, in builder order.
    pub fn decode_rows(&self, schema: &Schema) -> Result<Vec<Row>> {
        let cols = (0..schema.len())
            .map(|i| self.column(schema, i))
            .collect::<Result<Vec<Column>>>()?;
        Ok((0..self.rows as usize)
            .map(|r| Row(cols.iter().map(|c| c.get(r).unwrap_or(Val::Nil)).collect()))
            .collect())
    }
}

/// Where finished batches go. The builder asks the sink for a key and
/// then hands over the keyed batch; the batch becomes visible to the
/// builder's caller only after `persist` returns Ok.
pub trait BatchSink {
    fn assign_key(&self, bucket: i32, explicit: Option<Uuid>) -> BatchKey;
    fn persist(&self, batch: &ColumnBatch) -> Result<()>;
}

impl<S: BatchSink + ?Sized> BatchSink for &S {
    fn assign_key(&self, bucket: i32, explicit: Option<Uuid>) -> BatchKey {
        (**self).assign_key(bucket, explicit)
    }
    fn persist(&self, batch: &ColumnBatch) -> Result<()> {
        (**self).persist(batch)
    }
}
