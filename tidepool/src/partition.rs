use tidepool_base::{err_kind, ErrorKind, Result};
use tidepool_lang::{Row, Schema};

/// Routes rows to buckets: rapidhash over the key bytes of the partition
/// columns, modulo the bucket count. With no partition columns the whole
/// row is the key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partitioner {
    cols: Vec<usize>,
    buckets: u32,
}

impl Partitioner {
    pub fn new<S: AsRef<str>>(schema: &Schema, partition_by: &[S], buckets: u32) -> Result<Self> {
        if buckets == 0 || buckets > i32::MAX as u32 {
            return Err(err_kind(
                ErrorKind::Config,
                format!("bucket count {} out of range", buckets),
            ));
        }
        let cols = schema
            .project(partition_by)
            .map_err(|e| e.rekind(ErrorKind::Config))?;
        Ok(Partitioner { cols, buckets })
    }

    pub fn buckets(&self) -> u32 {
        self.buckets
    }

    pub fn columns(&self) -> &[usize] {
        &self.cols
    }

    pub fn bucket_of(&self, row: &Row) -> i32 {
        let mut key = Vec::new();
        if self.cols.is_empty() {
            for v in row.vals() {
                v.write_key_bytes(&mut key);
            }
        } else {
            for c in self.cols.iter() {
                match row.get(*c) {
                    Some(v) => v.write_key_bytes(&mut key),
                    None => key.push(0),
                }
            }
        }
        (rapidhash::rapidhash(&key) % self.buckets as u64) as i32
    }
}
