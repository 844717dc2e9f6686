/// A simple 32-byte / 256-bit bitmap that counts bits in order from
/// least-to-most significant bits and ascending words. Column buffers
/// are cut into 256-row chunks, so one of these covers one chunk of
/// null flags or boolean values.
#[derive(Clone, Default, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct Bitmap256 {
    pub bits: [u64; 4],
}
impl Bitmap256 {
    pub const ROWS: usize = 256;

    pub fn new() -> Self {
        Bitmap256 { bits: [0; 4] }
    }
    pub fn from_words(bits: [u64; 4]) -> Self {
        Bitmap256 { bits }
    }
    pub fn set(&mut self, i: usize, val: bool) {
        if val {
            self.bits[i / 64] |= 1 << (i % 64);
        } else {
            self.bits[i / 64] &= !(1 << (i % 64));
        }
    }
    pub fn get(&self, i: usize) -> bool {
        (self.bits[i / 64] & (1 << (i % 64))) != 0
    }
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|x| x.count_ones()).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|x| *x == 0)
    }
    pub fn any(&self) -> bool {
        self.bits.iter().any(|x| *x != 0)
    }
}

// Splits a flat sequence of flags into 256-row bitmaps; the last one
// is only partially used when `flags.len()` is not a multiple of 256.
pub fn chunked_bitmaps<I: IntoIterator<Item = bool>>(flags: I) -> Vec<Bitmap256> {
    let mut out = Vec::new();
    for (i, flag) in flags.into_iter().enumerate() {
        let slot = i % Bitmap256::ROWS;
        if slot == 0 {
            out.push(Bitmap256::new());
        }
        if flag {
            if let Some(last) = out.last_mut() {
                last.set(slot, true);
            }
        }
    }
    out
}

pub fn chunked_get(maps: &[Bitmap256], i: usize) -> bool {
    maps.get(i / Bitmap256::ROWS)
        .map(|m| m.get(i % Bitmap256::ROWS))
        .unwrap_or(false)
}
