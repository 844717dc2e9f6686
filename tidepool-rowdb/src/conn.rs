use crate::{
    db::{scan_err, RowDb},
    keys::{
        parse_shadow_key, shadow_all_bounds, shadow_bucket_bounds, shadow_key, shadow_row_bounds,
        HEADER_SLOT,
    },
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Arc,
};
use tidepool_base::{err_kind, Error, ErrorKind, Result};
use tidepool_coldb::{BatchKey, BatchStats, Uuid};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnMode {
    // In-process access: the connection can scope queries to buckets.
    Embedded,
    // Client access: only the projection query is available.
    Remote,
}

// Slot 0 of a shadow row.
#[derive(Serialize, Deserialize)]
pub(crate) struct HeaderRecord {
    pub(crate) uuid: String,
    pub(crate) bucket: i32,
    pub(crate) num_rows: u32,
    pub(crate) stats: Vec<u8>,
}

impl HeaderRecord {
    pub(crate) fn decode(bytes: &[u8]) -> Result<ShadowHeader> {
        let rec: HeaderRecord =
            rmp_serde::from_slice(bytes).map_err(|e| Error::with_kind(ErrorKind::Corrupt, e))?;
        let uuid = Uuid::parse_str(&rec.uuid).map_err(|e| Error::with_kind(ErrorKind::Corrupt, e))?;
        Ok(ShadowHeader {
            key: BatchKey::new(uuid, rec.bucket),
            num_rows: rec.num_rows,
            stats: BatchStats::from_bytes(&rec.stats)?,
        })
    }
}

/// The non-column part of a shadow row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShadowHeader {
    pub key: BatchKey,
    pub num_rows: u32,
    pub stats: BatchStats,
}

/// One shadow row as returned by a projection query: the header plus the
/// requested column buffers, in request order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShadowRow {
    pub header: ShadowHeader,
    pub cols: Vec<Vec<u8>>,
}

/// A connection to the row store. A connection carries the bucket scope
/// set by `set_buckets_for_local_execution`, which applies to the next
/// query against that table only.
pub struct Conn {
    db: Arc<RowDb>,
    mode: ConnMode,
    scoped: HashMap<String, BTreeSet<i32>>,
}

impl Conn {
    pub fn new(db: Arc<RowDb>, mode: ConnMode) -> Self {
        Conn {
            db,
            mode,
            scoped: HashMap::new(),
        }
    }

    pub fn mode(&self) -> ConnMode {
        self.mode
    }

    pub fn set_buckets_for_local_execution(&mut self, table: &str, buckets: &[i32]) -> Result<()> {
        if self.mode == ConnMode::Remote {
            return Err(err_kind(
                ErrorKind::BucketRouting,
                "bucket scoping requires an embedded connection",
            ));
        }
        if let Some(b) = buckets.iter().find(|b| **b < 0) {
            return Err(err_kind(
                ErrorKind::BucketRouting,
                format!("cannot scope {} to bucket {}", table, b),
            ));
        }
        if !self.db.has_table(table)? {
            return Err(err_kind(
                ErrorKind::BucketRouting,
                format!("cannot scope unknown table {}", table),
            ));
        }
        self.scoped
            .insert(table.to_string(), buckets.iter().copied().collect());
        Ok(())
    }

    /// `SELECT <cols>, numRows, stats FROM <table>`. Headers are read up
    /// front; column buffers are fetched one row at a time as the cursor
    /// advances.
    pub fn select(&mut self, table: &str, cols: &[usize]) -> Result<ShadowCursor> {
        let scope = self.scoped.remove(table);
        let headers = self
            .db
            .read(table, |t| {
                let ranges: Vec<(Vec<u8>, Vec<u8>)> = match scope.as_ref() {
                    Some(buckets) => buckets.iter().map(|b| shadow_bucket_bounds(*b)).collect(),
                    None => vec![shadow_all_bounds()],
                };
                let mut headers = VecDeque::new();
                for (lo, hi) in ranges {
                    for item in t.range(lo.as_slice()..=hi.as_slice()).map_err(scan_err)? {
                        let (k, v) = item.map_err(scan_err)?;
                        let (_, _, slot) = parse_shadow_key(k.value())?;
                        if slot == HEADER_SLOT {
                            headers.push_back(HeaderRecord::decode(v.value())?);
                        }
                    }
                }
                Ok(headers)
            })?
            .ok_or_else(|| err_kind(ErrorKind::NotFound, format!("no table {}", table)))?;
        trace!(target: "tidepool", table, batches = headers.len(), scoped = scope.is_some(), "opened shadow cursor");
        Ok(ShadowCursor {
            db: self.db.clone(),
            table: table.to_string(),
            cols: cols.to_vec(),
            headers,
        })
    }
}

/// A finite, non-restartable cursor over shadow rows.
pub struct ShadowCursor {
    db: Arc<RowDb>,
    table: String,
    cols: Vec<usize>,
    headers: VecDeque<ShadowHeader>,
}

impl ShadowCursor {
    /// Drops rows whose header fails `keep` before their columns are read.
    pub fn retain(&mut self, keep: impl FnMut(&ShadowHeader) -> bool) {
        self.headers.retain(keep);
    }

    pub fn remaining(&self) -> usize {
        self.headers.len()
    }

    fn fetch(&self, header: &ShadowHeader) -> Result<Option<Vec<Vec<u8>>>> {
        let key = header.key;
        let fetched = self.db.read(&self.table, |t| {
            let (lo, hi) = shadow_row_bounds(key.bucket, &key.uuid);
            let mut slots = HashMap::new();
            for item in t.range(lo.as_slice()..=hi.as_slice()).map_err(scan_err)? {
                let (k, v) = item.map_err(scan_err)?;
                let (_, _, slot) = parse_shadow_key(k.value())?;
                slots.insert(slot, v.value().to_vec());
            }
            if slots.is_empty() {
                // Removed since the headers were read.
                return Ok(None);
            }
            let mut cols = Vec::with_capacity(self.cols.len());
            for c in self.cols.iter() {
                let slot = *c as u16 + 1;
                let buf = slots.get(&slot).cloned().ok_or_else(|| {
                    err_kind(
                        ErrorKind::Corrupt,
                        format!("batch {} missing column {}", key, c),
                    )
                })?;
                cols.push(buf);
            }
            Ok(Some(cols))
        })?;
        Ok(fetched.flatten())
    }
}

impl Iterator for ShadowCursor {
    type Item = Result<ShadowRow>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(header) = self.headers.pop_front() {
            match self.fetch(&header) {
                Ok(Some(cols)) => return Some(Ok(ShadowRow { header, cols })),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

// Shadow-row slots for a keyed batch.
pub(crate) fn shadow_slot_key(key: &BatchKey, slot: u16) -> Vec<u8> {
    shadow_key(key.bucket, &key.uuid, slot)
}
