use crate::{
    catalog::{TableDef, TableKind},
    partition::Partitioner,
    registry::StoreHandle,
};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::{collections::BTreeMap, sync::Arc};
use tidepool_admin::TableOptions;
use tidepool_base::{err_kind, ErrorKind, Result};
use tidepool_coldb::{BatchBuilder, BatchKey, BuildOptions, Filter, Predicate};
use tidepool_lang::{Row, Schema};
use tidepool_rowdb::{BaseTable, BatchScan, BatchStore, MovingSink, RowDb, ScanRequest};
use tracing::debug;

/// A column table: a bucketed base region of recent rows plus the
/// column batches those rows are moved into.
pub struct ColumnTable {
    def: Arc<TableDef>,
    schema: Arc<Schema>,
    db: Arc<RowDb>,
    base: BaseTable,
    store: BatchStore,
    partitioner: Partitioner,
    // Shared by every instance of this table on the store.
    moving: Arc<Mutex<()>>,
    // Keeps the store registered while the table is open.
    _store_ref: StoreHandle,
}

impl ColumnTable {
    pub fn create(
        handle: &StoreHandle,
        name: &str,
        schema: Schema,
        options: TableOptions,
    ) -> Result<Self> {
        ColumnTable::create_kind(handle, name, schema, options, TableKind::Column)
    }

    pub fn create_kind(
        handle: &StoreHandle,
        name: &str,
        schema: Schema,
        options: TableOptions,
        kind: TableKind,
    ) -> Result<Self> {
        options.validate()?;
        let db = handle.db();
        if TableDef::exists(db, name)? {
            return Err(err_kind(
                ErrorKind::Config,
                format!("table {} already exists", name),
            ));
        }
        let def = Arc::new(TableDef {
            name: name.to_string(),
            kind,
            schema,
            options,
        });
        // Build first so that a bad definition never reaches the catalog.
        let table = ColumnTable::from_def(handle, def)?;
        table.db.ensure_table(name)?;
        table.def.save(&table.db)?;
        debug!(target: "tidepool", table = name, kind = ?table.def.kind, "created column table");
        Ok(table)
    }

    pub fn open(handle: &StoreHandle, name: &str) -> Result<Self> {
        let def = Arc::new(TableDef::load(handle.db(), name)?);
        ColumnTable::from_def(handle, def)
    }

    /// Opens a table from a definition already in hand, such as one served
    /// by a `RelationCache`.
    pub fn from_def(handle: &StoreHandle, def: Arc<TableDef>) -> Result<Self> {
        if !def.kind.capabilities().column_batches {
            return Err(err_kind(
                ErrorKind::Config,
                format!("table {} of kind {:?} holds no column batches", def.name, def.kind),
            ));
        }
        let schema = Arc::new(def.schema.clone());
        let partitioner = Partitioner::new(&schema, &def.options.partition_by, def.options.buckets)?;
        let db = handle.db().clone();
        let store = BatchStore::open(
            db.clone(),
            &def.name,
            schema.clone(),
            handle.mode(),
            def.options.redundancy as usize,
        )?;
        let base = BaseTable::new(db.clone(), def.name.clone());
        let moving = db.move_lock(&def.name);
        Ok(ColumnTable {
            def,
            schema,
            db,
            base,
            store,
            partitioner,
            moving,
            _store_ref: handle.retain(),
        })
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &Arc<TableDef> {
        &self.def
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn options(&self) -> &TableOptions {
        &self.def.options
    }

    pub fn bucket_of(&self, row: &Row) -> i32 {
        self.partitioner.bucket_of(row)
    }

    pub fn preferred_locations(&self, bucket: i32) -> Vec<String> {
        self.store.preferred_locations(bucket)
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions::new(self.def.options.column_batch_size, self.def.options.compression)
    }

    // Checks every row before any is written, then groups them by bucket
    // keeping their relative order.
    fn route(&self, rows: Vec<Row>) -> Result<BTreeMap<i32, Vec<Row>>> {
        for row in rows.iter() {
            self.schema.check_row(row)?;
        }
        let mut by_bucket: BTreeMap<i32, Vec<Row>> = BTreeMap::new();
        for row in rows {
            by_bucket.entry(self.bucket_of(&row)).or_default().push(row);
        }
        Ok(by_bucket)
    }

    /// Inserts rows into the base region. Any bucket that reaches the
    /// batch size has its full batches moved into the shadow table; the
    /// remainder stays in the base region. Returns the new batch keys.
    pub fn insert(&self, rows: Vec<Row>) -> Result<Vec<BatchKey>> {
        if !self.def.kind.capabilities().insert {
            return Err(err_kind(
                ErrorKind::Config,
                format!("table {} does not accept inserts", self.def.name),
            ));
        }
        let limit = self.def.options.column_batch_size;
        let mut keys = Vec::new();
        for (bucket, rows) in self.route(rows)? {
            let count = self.base.append(bucket, &rows)?;
            if count >= limit {
                keys.extend(self.materialize(bucket, true)?);
            }
        }
        Ok(keys)
    }

    /// Moves every remaining base row into batches.
    pub fn flush(&self) -> Result<Vec<BatchKey>> {
        let mut keys = Vec::new();
        for bucket in self.base.bucket_counts()?.into_keys() {
            keys.extend(self.materialize(bucket, false)?);
        }
        Ok(keys)
    }

    // Moves a bucket's base rows into batches of the batch size, oldest
    // first. With `full_only` a trailing partial batch stays behind.
    fn materialize(&self, bucket: i32, full_only: bool) -> Result<Vec<BatchKey>> {
        let _guard = self.moving.lock();
        let limit = self.def.options.column_batch_size;
        let rows = self.base.bucket_rows(bucket)?;
        let mut keys = Vec::new();
        for chunk in rows.chunks(limit) {
            if full_only && chunk.len() < limit {
                break;
            }
            let consumed = chunk.iter().map(|(k, _)| k.clone()).collect();
            let sink = MovingSink::new(&self.store, &self.base, consumed);
            let mut builder = BatchBuilder::open(self.schema.clone(), bucket, self.build_options())?;
            for (_, row) in chunk {
                keys.extend(builder.append(row, &sink)?);
            }
            keys.extend(builder.force_flush(&sink)?);
        }
        debug!(target: "tidepool", table = %self.def.name, bucket, batches = keys.len(), "materialized bucket");
        Ok(keys)
    }

    /// Bulk load straight into batches, bypassing the base region. Each
    /// bucket gets its own builder and buckets are built in parallel. If a
    /// bucket fails, batches already persisted by other buckets remain.
    pub fn load(&self, rows: Vec<Row>) -> Result<Vec<BatchKey>> {
        let by_bucket = self.route(rows)?;
        let opts = self.build_options();
        let per_bucket = by_bucket
            .into_par_iter()
            .map(|(bucket, rows)| -> Result<Vec<BatchKey>> {
                let mut builder = BatchBuilder::open(self.schema.clone(), bucket, opts)?;
                let mut keys = Vec::new();
                for row in rows.iter() {
                    keys.extend(builder.append(row, &self.store)?);
                }
                keys.extend(builder.force_flush(&self.store)?);
                Ok(keys)
            })
            .collect::<Vec<Result<Vec<BatchKey>>>>();
        let mut keys = Vec::new();
        for r in per_bucket {
            keys.extend(r?);
        }
        debug!(target: "tidepool", table = %self.def.name, batches = keys.len(), "bulk loaded");
        Ok(keys)
    }

    /// Scans column batches only. Columns are named; an empty list means
    /// every column. The filter prunes whole batches by their stats.
    pub fn scan_batches<S: AsRef<str>>(
        &self,
        cols: &[S],
        filter: Filter,
        buckets: Option<&[i32]>,
    ) -> Result<BatchScan> {
        let mut req = ScanRequest::all().columns(cols).filter(filter);
        if let Some(b) = buckets {
            req = req.buckets(b);
        }
        self.store.scan(&req)
    }

    /// Every row matching `filter`, projected to `cols`: rows from the
    /// batches first, then rows still in the base region.
    pub fn scan_rows<S: AsRef<str>>(&self, cols: &[S], filter: &Filter) -> Result<Vec<Row>> {
        let positions: Vec<usize> = if cols.is_empty() {
            (0..self.schema.len()).collect()
        } else {
            self.schema.project(cols)?
        };
        for p in filter.predicates() {
            if p.col >= self.schema.len() {
                return Err(err_kind(
                    ErrorKind::SchemaMismatch,
                    format!("filter names column {} of {}", p.col, self.schema.len()),
                ));
            }
        }
        // Fetch the projection plus any filter column outside it, and
        // rewrite the filter against the fetched order.
        let mut fetched = positions.clone();
        for p in filter.predicates() {
            if !fetched.contains(&p.col) {
                fetched.push(p.col);
            }
        }
        let mut local = Filter::all();
        for p in filter.predicates() {
            let col = fetched.iter().position(|c| *c == p.col).unwrap_or(p.col);
            local = local.and(Predicate {
                col,
                cmp: p.cmp,
                val: p.val.clone(),
            });
        }
        let names = fetched
            .iter()
            .filter_map(|c| self.schema.field(*c).map(|f| f.name.clone()))
            .collect::<Vec<String>>();
        let keep = (0..positions.len()).collect::<Vec<usize>>();

        let mut out = Vec::new();
        for batch in self.store.scan(&ScanRequest::all().columns(&names).filter(filter.clone()))? {
            for row in batch?.decode_rows()? {
                if local.matches(&row) {
                    out.push(row.project(&keep));
                }
            }
        }
        for row in self.base.rows(None)? {
            if filter.matches(&row) {
                out.push(row.project(&positions));
            }
        }
        Ok(out)
    }

    pub fn batch_count(&self) -> Result<usize> {
        self.store.batch_count()
    }

    pub fn base_row_count(&self) -> Result<usize> {
        self.base.len()
    }

    pub fn truncate(&self) -> Result<()> {
        if !self.def.kind.capabilities().truncate {
            return Err(err_kind(
                ErrorKind::Config,
                format!("table {} cannot be truncated", self.def.name),
            ));
        }
        let _guard = self.moving.lock();
        self.store.truncate()?;
        self.db.clear_table(&self.def.name)?;
        debug!(target: "tidepool", table = %self.def.name, "truncated column table");
        Ok(())
    }

    /// Removes the table's rows, batches and catalog entry, and gives
    /// back its reference to the store.
    pub fn drop_table(self) -> Result<()> {
        let name = self.def.name.clone();
        let _guard = self.moving.lock();
        self.store.drop_store()?;
        self.db.drop_table(&name)?;
        self.db.remove_catalog_entry(&name)?;
        debug!(target: "tidepool", table = %name, "dropped column table");
        Ok(())
    }
}
