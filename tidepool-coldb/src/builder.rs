use crate::{
    batch::{BatchKey, BatchSink, SealedBatch, INVALID_BUCKET},
    column::ColumnEncoder,
    stats::BatchStats,
};
use std::sync::Arc;
use tidepool_base::{err_kind, ErrorKind, Result};
use tidepool_lang::{Row, Schema};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuildOptions {
    pub batch_size_limit: usize,
    pub use_compression: bool,
}

impl BuildOptions {
    pub fn new(batch_size_limit: usize, use_compression: bool) -> Self {
        BuildOptions {
            batch_size_limit,
            use_compression,
        }
    }
}

/// Accumulates rows for one bucket into column encoders and turns them
/// into column batches. One builder is driven by one thread at a time;
/// different buckets use different builders.
pub struct BatchBuilder {
    schema: Arc<Schema>,
    bucket: i32,
    opts: BuildOptions,
    encoders: Vec<ColumnEncoder>,
    pending: usize,
}

impl BatchBuilder {
    pub fn open(schema: Arc<Schema>, bucket: i32, opts: BuildOptions) -> Result<Self> {
        if opts.batch_size_limit == 0 {
            return Err(err_kind(ErrorKind::Config, "batch size limit must be positive"));
        }
        if opts.batch_size_limit > u32::MAX as usize {
            return Err(err_kind(ErrorKind::Config, "batch size limit exceeds u32 rows"));
        }
        if bucket == INVALID_BUCKET {
            return Err(err_kind(ErrorKind::Config, "bucket -1 cannot hold batches"));
        }
        let encoders = schema
            .fields()
            .iter()
            .map(|f| ColumnEncoder::new(f.ty))
            .collect();
        Ok(BatchBuilder {
            schema,
            bucket,
            opts,
            encoders,
            pending: 0,
        })
    }

    pub fn bucket(&self) -> i32 {
        self.bucket
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn pending_rows(&self) -> usize {
        self.pending
    }

    /// Appends one row. When the row fills the batch the builder flushes
    /// before returning, and the new batch's key is returned.
    pub fn append<S: BatchSink + ?Sized>(&mut self, row: &Row, sink: &S) -> Result<Option<BatchKey>> {
        // Check the whole row before touching any encoder so that a bad
        // row never leaves the columns at different lengths.
        self.schema.check_row(row)?;
        for (enc, val) in self.encoders.iter_mut().zip(row.vals()) {
            enc.append(val)?;
        }
        self.pending += 1;
        if self.pending >= self.opts.batch_size_limit {
            return self.finish(sink, None);
        }
        Ok(None)
    }

    /// Flushes whatever is pending, however few rows. No-op when empty.
    pub fn force_flush<S: BatchSink + ?Sized>(&mut self, sink: &S) -> Result<Option<BatchKey>> {
        self.finish(sink, None)
    }

    /// Like `force_flush`, but keys the batch with a caller-chosen id,
    /// for replaying a load whose batch ids were recorded.
    pub fn force_flush_with_id<S: BatchSink + ?Sized>(
        &mut self,
        sink: &S,
        batch_id: Uuid,
    ) -> Result<Option<BatchKey>> {
        self.finish(sink, Some(batch_id))
    }

    /// Discards pending rows without persisting anything, leaving the
    /// builder empty. Returns how many rows were dropped.
    pub fn abort(&mut self) -> usize {
        let dropped = self.pending;
        if dropped > 0 {
            self.encoders.iter_mut().for_each(ColumnEncoder::reset);
            self.pending = 0;
            debug!(target: "tidepool", bucket = self.bucket, dropped, "aborted batch builder");
        }
        dropped
    }

    fn seal(&mut self) -> Result<SealedBatch> {
        let rows = self.pending as u32;
        let mut cols = Vec::with_capacity(self.encoders.len());
        let mut stats = BatchStats {
            rows,
            cols: Vec::with_capacity(self.encoders.len()),
        };
        self.pending = 0;
        for enc in self.encoders.iter_mut() {
            let (buf, col_stats) = enc.seal(self.opts.use_compression)?;
            cols.push(buf);
            stats.cols.push(col_stats);
        }
        Ok(SealedBatch {
            bucket: self.bucket,
            rows,
            cols,
            stats,
        })
    }

    fn finish<S: BatchSink + ?Sized>(&mut self, sink: &S, explicit: Option<Uuid>) -> Result<Option<BatchKey>> {
        if self.pending == 0 {
            return Ok(None);
        }
        // Once sealed the rows belong to the batch: if persisting fails the
        // batch is dropped here rather than re-queued.
        let sealed = self.seal()?;
        let key = sink.assign_key(self.bucket, explicit);
        let batch = sealed.with_key(key)?;
        if let Err(e) = sink.persist(&batch) {
            warn!(target: "tidepool", %key, rows = batch.rows(), "discarding batch after failed persist");
            return Err(e);
        }
        debug!(target: "tidepool", %key, rows = batch.rows(), "persisted column batch");
        Ok(Some(key))
    }
}
