use crate::{
    base::BaseTable,
    conn::{shadow_slot_key, Conn, ConnMode, HeaderRecord, ShadowCursor},
    db::{persist_err, raw_table, scan_err, RowDb},
    keys::{parse_shadow_key, shadow_table_name, HEADER_SLOT},
    placement::Placement,
};
use redb::{ReadableTable, WriteTransaction};
use std::{collections::BTreeSet, sync::Arc};
use tidepool_base::{err_kind, ErrorKind, Result};
use tidepool_coldb::{
    BatchKey, BatchSink, BatchStats, Column, ColumnBatch, Filter, Uuid, INVALID_BUCKET,
};
use tidepool_lang::{Row, Schema};
use tracing::{debug, trace, warn};

/// What a scan reads: a column projection (all columns when empty), a
/// stats-pruning filter over schema positions and an optional bucket
/// restriction.
#[derive(Clone, Debug, Default)]
pub struct ScanRequest {
    pub columns: Vec<String>,
    pub filter: Filter,
    pub buckets: Option<Vec<i32>>,
}

impl ScanRequest {
    pub fn all() -> Self {
        ScanRequest::default()
    }

    pub fn columns<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.columns = names.iter().map(|n| n.as_ref().to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn buckets(mut self, buckets: &[i32]) -> Self {
        self.buckets = Some(buckets.to_vec());
        self
    }
}

/// The column-batch side of one table: the `<T>_COLUMN_STORE_` shadow
/// table and the protocol for writing and scanning it.
pub struct BatchStore {
    db: Arc<RowDb>,
    table: String,
    shadow: String,
    schema: Arc<Schema>,
    mode: ConnMode,
    placement: Placement,
}

impl BatchStore {
    pub fn open(
        db: Arc<RowDb>,
        table: &str,
        schema: Arc<Schema>,
        mode: ConnMode,
        redundancy: usize,
    ) -> Result<Self> {
        if schema.len() >= u16::MAX as usize {
            return Err(err_kind(
                ErrorKind::Config,
                format!("table {} has too many columns", table),
            ));
        }
        let shadow = shadow_table_name(table);
        db.ensure_table(&shadow)?;
        let placement = Placement::new(db.members().to_vec(), redundancy);
        Ok(BatchStore {
            db,
            table: table.to_string(),
            shadow,
            schema,
            mode,
            placement,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn shadow_table(&self) -> &str {
        &self.shadow
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn mode(&self) -> ConnMode {
        self.mode
    }

    pub fn preferred_locations(&self, bucket: i32) -> Vec<String> {
        self.placement.preferred_locations(bucket)
    }

    fn write_batch(&self, wtxn: &WriteTransaction, batch: &ColumnBatch) -> Result<()> {
        let key = batch.key();
        if key.bucket == INVALID_BUCKET {
            return Err(err_kind(
                ErrorKind::Persist,
                format!("batch {} violates CHECK (bucketId != -1)", key),
            ));
        }
        if batch.column_count() != self.schema.len() {
            return Err(err_kind(
                ErrorKind::Persist,
                format!(
                    "batch {} has {} columns, {} has {}",
                    key,
                    batch.column_count(),
                    self.shadow,
                    self.schema.len()
                ),
            ));
        }
        let header = HeaderRecord {
            uuid: key.uuid.to_string(),
            bucket: key.bucket,
            num_rows: batch.rows(),
            stats: batch.stats().to_bytes()?,
        };
        let header = rmp_serde::to_vec(&header).map_err(persist_err)?;
        let mut t = wtxn.open_table(raw_table(&self.shadow)).map_err(persist_err)?;
        let hk = shadow_slot_key(&key, HEADER_SLOT);
        let exists = t.get(hk.as_slice()).map_err(persist_err)?.is_some();
        if exists {
            return Err(err_kind(
                ErrorKind::Persist,
                format!("duplicate primary key {} in {}", key, self.shadow),
            ));
        }
        t.insert(hk.as_slice(), header.as_slice()).map_err(persist_err)?;
        for i in 0..batch.column_count() {
            let buf = batch
                .column_bytes(i)
                .ok_or_else(|| err_kind(ErrorKind::Persist, format!("batch {} lost column {}", key, i)))?;
            let k = shadow_slot_key(&key, i as u16 + 1);
            t.insert(k.as_slice(), buf).map_err(persist_err)?;
        }
        Ok(())
    }

    /// Persists `batch` and deletes the base rows it was built from, in
    /// one transaction. Fails without writing anything if any of those
    /// rows is already gone.
    pub fn persist_moving(&self, batch: &ColumnBatch, base: &BaseTable, consumed: &[Vec<u8>]) -> Result<()> {
        self.db
            .write(|wtxn| {
                self.write_batch(wtxn, batch)?;
                let mut t = wtxn.open_table(raw_table(base.name())).map_err(persist_err)?;
                for k in consumed {
                    let removed = t.remove(k.as_slice()).map_err(persist_err)?.is_some();
                    if !removed {
                        return Err(err_kind(
                            ErrorKind::Persist,
                            format!("base row of {} moved concurrently", base.name()),
                        ));
                    }
                }
                Ok(())
            })
            .map_err(|e| e.rekind(ErrorKind::Persist))?;
        trace!(target: "tidepool", key = %batch.key(), moved = consumed.len(), "moved base rows into batch");
        Ok(())
    }

    /// Opens a lazy scan. Embedded connections scope the query to the
    /// requested buckets; if the store refuses, or the connection is
    /// remote, the scan reads everything and drops other buckets itself.
    pub fn scan(&self, req: &ScanRequest) -> Result<BatchScan> {
        let cols: Vec<usize> = if req.columns.is_empty() {
            (0..self.schema.len()).collect()
        } else {
            self.schema.project(&req.columns)?
        };
        let projected = Arc::new(self.schema.projection(&cols));

        let mut conn = Conn::new(self.db.clone(), self.mode);
        let mut client_buckets = None;
        if let Some(buckets) = &req.buckets {
            match self.mode {
                ConnMode::Embedded => {
                    if let Err(e) = conn.set_buckets_for_local_execution(&self.shadow, buckets) {
                        if !e.is(ErrorKind::BucketRouting) {
                            return Err(e);
                        }
                        warn!(target: "tidepool", table = %self.shadow, ?buckets, "bucket scoping refused, filtering buckets in scan");
                        client_buckets = Some(buckets.iter().copied().collect::<BTreeSet<i32>>());
                    }
                }
                ConnMode::Remote => {
                    client_buckets = Some(buckets.iter().copied().collect());
                }
            }
        }
        let mut cursor = conn.select(&self.shadow, &cols)?;
        if let Some(keep) = &client_buckets {
            cursor.retain(|h| keep.contains(&h.key.bucket));
        }
        let candidates = cursor.remaining();
        if !req.filter.is_empty() {
            cursor.retain(|h| req.filter.may_match(&h.stats));
        }
        let pruned = candidates - cursor.remaining();
        debug!(target: "tidepool", table = %self.shadow, batches = cursor.remaining(), pruned, "opened batch scan");
        Ok(BatchScan {
            cursor,
            cols: cols.into(),
            schema: projected,
            pruned,
        })
    }

    /// Number of batches in the shadow table.
    pub fn batch_count(&self) -> Result<usize> {
        let n = self.db.read(&self.shadow, |t| {
            let mut n = 0;
            for item in t.iter().map_err(scan_err)? {
                let (k, _) = item.map_err(scan_err)?;
                if parse_shadow_key(k.value())?.2 == HEADER_SLOT {
                    n += 1;
                }
            }
            Ok(n)
        })?;
        Ok(n.unwrap_or(0))
    }

    pub fn truncate(&self) -> Result<()> {
        self.db.clear_table(&self.shadow)?;
        debug!(target: "tidepool", table = %self.shadow, "truncated shadow table");
        Ok(())
    }

    pub fn drop_store(self) -> Result<()> {
        self.db.drop_table(&self.shadow)?;
        Ok(())
    }
}

impl BatchSink for BatchStore {
    fn assign_key(&self, bucket: i32, explicit: Option<Uuid>) -> BatchKey {
        match explicit {
            Some(uuid) => BatchKey::new(uuid, bucket),
            None => BatchKey::random(bucket),
        }
    }

    fn persist(&self, batch: &ColumnBatch) -> Result<()> {
        self.db
            .write(|wtxn| self.write_batch(wtxn, batch))
            .map_err(|e| e.rekind(ErrorKind::Persist))
    }
}

/// A sink that moves base rows into the batch it persists.
pub struct MovingSink<'a> {
    store: &'a BatchStore,
    base: &'a BaseTable,
    consumed: Vec<Vec<u8>>,
}

impl<'a> MovingSink<'a> {
    pub fn new(store: &'a BatchStore, base: &'a BaseTable, consumed: Vec<Vec<u8>>) -> Self {
        MovingSink {
            store,
            base,
            consumed,
        }
    }
}

impl BatchSink for MovingSink<'_> {
    fn assign_key(&self, bucket: i32, explicit: Option<Uuid>) -> BatchKey {
        self.store.assign_key(bucket, explicit)
    }

    fn persist(&self, batch: &ColumnBatch) -> Result<()> {
        self.store.persist_moving(batch, self.base, &self.consumed)
    }
}

/// A batch read back by a scan. Only the projected columns were fetched,
/// and none is decoded until asked for.
pub struct ScannedBatch {
    batch: ColumnBatch,
    schema: Arc<Schema>,
    cols: Arc<[usize]>,
}

impl ScannedBatch {
    pub fn key(&self) -> BatchKey {
        self.batch.key()
    }

    pub fn rows(&self) -> u32 {
        self.batch.rows()
    }

    /// Stats of the projected columns, in projection order.
    pub fn stats(&self) -> &BatchStats {
        self.batch.stats()
    }

    /// Schema positions of the projected columns.
    pub fn positions(&self) -> &[usize] {
        &self.cols
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn column(&self, i: usize) -> Result<Column> {
        self.batch.column(&self.schema, i)
    }

    pub fn column_named(&self, name: &str) -> Result<Column> {
        let i = self.schema.project(&[name])?[0];
        self.column(i)
    }

    pub fn decode_rows(&self) -> Result<Vec<Row>> {
        self.batch.decode_rows(&self.schema)
    }
}

/// Lazy iterator over the batches a scan selected.
pub struct BatchScan {
    cursor: ShadowCursor,
    cols: Arc<[usize]>,
    schema: Arc<Schema>,
    pruned: usize,
}

impl BatchScan {
    /// Batches skipped because their stats ruled out the filter.
    pub fn pruned(&self) -> usize {
        self.pruned
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl Iterator for BatchScan {
    type Item = Result<ScannedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.cursor.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        let header = row.header;
        let stats = BatchStats {
            rows: header.stats.rows,
            cols: self
                .cols
                .iter()
                .map(|c| header.stats.cols.get(*c).cloned().unwrap_or_default())
                .collect(),
        };
        Some(Ok(ScannedBatch {
            batch: ColumnBatch::from_parts(header.key, header.num_rows, row.cols, stats),
            schema: self.schema.clone(),
            cols: self.cols.clone(),
        }))
    }
}
