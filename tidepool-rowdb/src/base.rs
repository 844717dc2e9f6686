use crate::{
    db::{persist_err, raw_table, scan_err, RowDb},
    keys::{base_bucket_bounds, base_key, parse_base_key},
};
use redb::ReadableTable;
use std::{collections::BTreeMap, sync::Arc};
use tidepool_base::{Error, ErrorKind, Result};
use tidepool_lang::Row;
use tracing::trace;

const SEQUENCES: &str = "__tidepool_sequences";

fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|e| Error::with_kind(ErrorKind::Corrupt, e))?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_row(bytes: &[u8]) -> Result<Row> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::with_kind(ErrorKind::Corrupt, e))
}

/// The row-oriented region of a table: rows that have been inserted but
/// not yet moved into a column batch, grouped by bucket and kept in
/// insertion order within a bucket.
#[derive(Clone)]
pub struct BaseTable {
    db: Arc<RowDb>,
    name: String,
}

impl BaseTable {
    pub fn new(db: Arc<RowDb>, name: impl Into<String>) -> Self {
        BaseTable {
            db,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends rows to one bucket in a single transaction and returns the
    /// bucket's row count afterwards.
    pub fn append(&self, bucket: i32, rows: &[Row]) -> Result<usize> {
        let encoded = rows
            .iter()
            .map(|r| rmp_serde::to_vec(r).map_err(persist_err))
            .collect::<Result<Vec<Vec<u8>>>>()?;
        let count = self.db.write(|wtxn| {
            // Sequence numbers come from a per-table counter so that a key
            // freed by a move is never handed to a later row.
            let next = {
                let mut seqs = wtxn.open_table(raw_table(SEQUENCES)).map_err(persist_err)?;
                let next = match seqs.get(self.name.as_bytes()).map_err(persist_err)? {
                    Some(g) => decode_seq(g.value())?,
                    None => 0,
                };
                let after = (next + encoded.len() as u64).to_be_bytes();
                seqs.insert(self.name.as_bytes(), after.as_slice()).map_err(persist_err)?;
                next
            };
            let mut t = wtxn.open_table(raw_table(&self.name)).map_err(persist_err)?;
            for (i, row) in encoded.iter().enumerate() {
                let k = base_key(bucket, next + i as u64);
                t.insert(k.as_slice(), row.as_slice()).map_err(persist_err)?;
            }
            let (lo, hi) = base_bucket_bounds(bucket);
            let mut count = 0;
            for item in t.range(lo.as_slice()..=hi.as_slice()).map_err(persist_err)? {
                item.map_err(persist_err)?;
                count += 1;
            }
            Ok(count)
        })?;
        trace!(target: "tidepool", table = %self.name, bucket, added = rows.len(), count, "appended base rows");
        Ok(count)
    }

    /// The rows of one bucket with their storage keys, oldest first.
    pub fn bucket_rows(&self, bucket: i32) -> Result<Vec<(Vec<u8>, Row)>> {
        let rows = self.db.read(&self.name, |t| {
            let (lo, hi) = base_bucket_bounds(bucket);
            let mut out = Vec::new();
            for item in t.range(lo.as_slice()..=hi.as_slice()).map_err(scan_err)? {
                let (k, v) = item.map_err(scan_err)?;
                out.push((k.value().to_vec(), decode_row(v.value())?));
            }
            Ok(out)
        })?;
        Ok(rows.unwrap_or_default())
    }

    /// Row counts of every bucket holding at least one base row.
    pub fn bucket_counts(&self) -> Result<BTreeMap<i32, usize>> {
        let counts = self.db.read(&self.name, |t| {
            let mut counts = BTreeMap::new();
            for item in t.iter().map_err(scan_err)? {
                let (k, _) = item.map_err(scan_err)?;
                let (bucket, _) = parse_base_key(k.value())?;
                *counts.entry(bucket).or_insert(0) += 1;
            }
            Ok(counts)
        })?;
        Ok(counts.unwrap_or_default())
    }

    /// Every base row, bucket by bucket. `buckets` restricts the scan.
    pub fn rows(&self, buckets: Option<&[i32]>) -> Result<Vec<Row>> {
        let rows = self.db.read(&self.name, |t| {
            let mut out = Vec::new();
            for item in t.iter().map_err(scan_err)? {
                let (k, v) = item.map_err(scan_err)?;
                let (bucket, _) = parse_base_key(k.value())?;
                if buckets.map(|b| b.contains(&bucket)).unwrap_or(true) {
                    out.push(decode_row(v.value())?);
                }
            }
            Ok(out)
        })?;
        Ok(rows.unwrap_or_default())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.bucket_counts()?.values().sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
