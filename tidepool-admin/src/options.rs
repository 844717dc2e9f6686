use crate::props::{canonicalize, parse_list, parse_num, Props};
use serde::{Deserialize, Serialize};
use tidepool_base::{err_kind, ErrorKind, Result};

pub const DEFAULT_BUCKETS: u32 = 113;
pub const DEFAULT_COLUMN_BATCH_SIZE: usize = 10_000;
pub const MAX_REDUNDANCY: u32 = 3;

const BUCKETS: &str = "BUCKETS";
const COLUMN_BATCH_SIZE: &str = "COLUMN_BATCH_SIZE";
const COMPRESSION: &str = "COMPRESSION";
const PARTITION_BY: &str = "PARTITION_BY";
const REDUNDANCY: &str = "REDUNDANCY";
const KEYS: &[&str] = &[BUCKETS, COLUMN_BATCH_SIZE, COMPRESSION, PARTITION_BY, REDUNDANCY];

/// Options of a column table. `partition_by` names the columns whose
/// values choose a row's bucket; empty means the whole row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableOptions {
    pub buckets: u32,
    pub column_batch_size: usize,
    pub compression: bool,
    pub partition_by: Vec<String>,
    pub redundancy: u32,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            buckets: DEFAULT_BUCKETS,
            column_batch_size: DEFAULT_COLUMN_BATCH_SIZE,
            compression: true,
            partition_by: Vec::new(),
            redundancy: 0,
        }
    }
}

fn parse_bool(props: &Props, key: &str, default: bool) -> Result<bool> {
    let Some(v) = props.get(key) else {
        return Ok(default);
    };
    match v.to_ascii_lowercase().as_str() {
        "true" | "on" | "lz4" => Ok(true),
        "false" | "off" | "none" => Ok(false),
        _ => Err(err_kind(
            ErrorKind::Config,
            format!("{} must be one of true/false/lz4/none, got '{}'", key, v),
        )),
    }
}

impl TableOptions {
    pub fn from_props<K, V>(props: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let props = canonicalize(props, KEYS)?;
        let d = TableOptions::default();
        let opts = TableOptions {
            buckets: parse_num(&props, BUCKETS, d.buckets)?,
            column_batch_size: parse_num(&props, COLUMN_BATCH_SIZE, d.column_batch_size)?,
            compression: parse_bool(&props, COMPRESSION, d.compression)?,
            partition_by: parse_list(&props, PARTITION_BY)?,
            redundancy: parse_num(&props, REDUNDANCY, d.redundancy)?,
        };
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buckets == 0 || self.buckets > i32::MAX as u32 {
            return Err(err_kind(
                ErrorKind::Config,
                format!("{} must be between 1 and {}", BUCKETS, i32::MAX),
            ));
        }
        if self.column_batch_size == 0 || self.column_batch_size > u32::MAX as usize {
            return Err(err_kind(
                ErrorKind::Config,
                format!("{} must be between 1 and {}", COLUMN_BATCH_SIZE, u32::MAX),
            ));
        }
        if self.redundancy > MAX_REDUNDANCY {
            return Err(err_kind(
                ErrorKind::Config,
                format!("{} must be at most {}", REDUNDANCY, MAX_REDUNDANCY),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for c in self.partition_by.iter() {
            if !seen.insert(c.to_ascii_lowercase()) {
                return Err(err_kind(
                    ErrorKind::Config,
                    format!("{} names column '{}' twice", PARTITION_BY, c),
                ));
            }
        }
        Ok(())
    }

    /// The canonical property bag: every key, normalized values.
    pub fn to_props(&self) -> Props {
        let mut p = Props::new();
        p.insert(BUCKETS.to_string(), self.buckets.to_string());
        p.insert(COLUMN_BATCH_SIZE.to_string(), self.column_batch_size.to_string());
        p.insert(COMPRESSION.to_string(), self.compression.to_string());
        p.insert(PARTITION_BY.to_string(), self.partition_by.join(","));
        p.insert(REDUNDANCY.to_string(), self.redundancy.to_string());
        p
    }
}
