use tidepool_base::{err_kind, ErrorKind, Result};
use uuid::Uuid;

pub(crate) const BUCKET_LEN: usize = 4;
pub(crate) const SHADOW_KEY_LEN: usize = BUCKET_LEN + 16 + 2;
pub(crate) const BASE_KEY_LEN: usize = BUCKET_LEN + 8;
pub(crate) const HEADER_SLOT: u16 = 0;

pub fn shadow_table_name(table: &str) -> String {
    format!("{}_COLUMN_STORE_", table)
}

// Flipping the sign bit makes the big-endian bytes of an i32 sort in
// numeric order, so bucket -1 sorts before bucket 0.
pub(crate) fn bucket_bytes(bucket: i32) -> [u8; BUCKET_LEN] {
    ((bucket as u32) ^ 0x8000_0000).to_be_bytes()
}

fn bucket_from_bytes(bytes: &[u8]) -> i32 {
    let mut b = [0_u8; BUCKET_LEN];
    b.copy_from_slice(&bytes[..BUCKET_LEN]);
    (u32::from_be_bytes(b) ^ 0x8000_0000) as i32
}

pub(crate) fn shadow_key(bucket: i32, uuid: &Uuid, slot: u16) -> Vec<u8> {
    let mut k = Vec::with_capacity(SHADOW_KEY_LEN);
    k.extend_from_slice(&bucket_bytes(bucket));
    k.extend_from_slice(uuid.as_bytes());
    k.extend_from_slice(&slot.to_be_bytes());
    k
}

// Inclusive bounds covering every shadow key of one bucket.
pub(crate) fn shadow_bucket_bounds(bucket: i32) -> (Vec<u8>, Vec<u8>) {
    (
        shadow_key(bucket, &Uuid::nil(), 0),
        shadow_key(bucket, &Uuid::from_bytes([0xff; 16]), u16::MAX),
    )
}

pub(crate) fn shadow_all_bounds() -> (Vec<u8>, Vec<u8>) {
    (
        shadow_key(i32::MIN, &Uuid::nil(), 0),
        shadow_key(i32::MAX, &Uuid::from_bytes([0xff; 16]), u16::MAX),
    )
}

// Inclusive bounds covering every slot of one shadow row.
pub(crate) fn shadow_row_bounds(bucket: i32, uuid: &Uuid) -> (Vec<u8>, Vec<u8>) {
    (shadow_key(bucket, uuid, 0), shadow_key(bucket, uuid, u16::MAX))
}

pub(crate) fn parse_shadow_key(k: &[u8]) -> Result<(i32, Uuid, u16)> {
    if k.len() != SHADOW_KEY_LEN {
        return Err(err_kind(
            ErrorKind::Corrupt,
            format!("shadow key has {} bytes", k.len()),
        ));
    }
    let bucket = bucket_from_bytes(k);
    let mut u = [0_u8; 16];
    u.copy_from_slice(&k[BUCKET_LEN..BUCKET_LEN + 16]);
    let slot = u16::from_be_bytes([k[SHADOW_KEY_LEN - 2], k[SHADOW_KEY_LEN - 1]]);
    Ok((bucket, Uuid::from_bytes(u), slot))
}

pub(crate) fn base_key(bucket: i32, seq: u64) -> [u8; BASE_KEY_LEN] {
    let mut k = [0_u8; BASE_KEY_LEN];
    k[..BUCKET_LEN].copy_from_slice(&bucket_bytes(bucket));
    k[BUCKET_LEN..].copy_from_slice(&seq.to_be_bytes());
    k
}

pub(crate) fn base_bucket_bounds(bucket: i32) -> ([u8; BASE_KEY_LEN], [u8; BASE_KEY_LEN]) {
    (base_key(bucket, 0), base_key(bucket, u64::MAX))
}

pub(crate) fn parse_base_key(k: &[u8]) -> Result<(i32, u64)> {
    if k.len() != BASE_KEY_LEN {
        return Err(err_kind(
            ErrorKind::Corrupt,
            format!("base key has {} bytes", k.len()),
        ));
    }
    let mut s = [0_u8; 8];
    s.copy_from_slice(&k[BUCKET_LEN..]);
    Ok((bucket_from_bytes(k), u64::from_be_bytes(s)))
}
