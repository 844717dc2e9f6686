use funty::Numeric;
use tidepool_base::{err_kind, Bitmap256, ErrorKind, Result};

// Column buffers are built in memory and handed to the row store as
// opaque blobs, so the writer is just a growable byte vector and the
// reader a cursor over a borrowed slice. All numbers are little-endian.

#[derive(Debug, Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn write_le_num<T: Numeric>(&mut self, v: T)
    where
        T::Bytes: AsRef<[u8]>,
    {
        self.buf.extend_from_slice(v.to_le_bytes().as_ref());
    }

    pub(crate) fn write_le_num_slice<T: Numeric>(&mut self, vals: &[T])
    where
        T::Bytes: AsRef<[u8]>,
    {
        for v in vals {
            self.write_le_num(*v);
        }
    }

    pub(crate) fn write_byte_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn write_len_prefixed_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| err_kind(ErrorKind::Other, "byte run longer than 4GiB"))?;
        self.write_le_num(len);
        self.write_byte_slice(bytes);
        Ok(())
    }

    pub(crate) fn write_bitmaps(&mut self, maps: &[Bitmap256]) -> Result<()> {
        let n = u32::try_from(maps.len())
            .map_err(|_| err_kind(ErrorKind::Other, "too many bitmaps"))?;
        self.write_le_num(n);
        for m in maps {
            self.write_le_num_slice(&m.bits);
        }
        Ok(())
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn truncated(what: &str) -> tidepool_base::Error {
    err_kind(ErrorKind::Corrupt, format!("buffer truncated reading {}", what))
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub(crate) fn read_byte_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| truncated("bytes"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_le_num<T: Numeric>(&mut self) -> Result<T>
    where
        T::Bytes: Default + AsMut<[u8]>,
    {
        let mut bytes = T::Bytes::default();
        let n = bytes.as_mut().len();
        let src = self.read_byte_slice(n).map_err(|_| truncated("number"))?;
        bytes.as_mut().copy_from_slice(src);
        Ok(T::from_le_bytes(bytes))
    }

    pub(crate) fn read_len_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let len: u32 = self.read_le_num()?;
        self.read_byte_slice(len as usize)
    }

    pub(crate) fn read_bitmaps(&mut self) -> Result<Vec<Bitmap256>> {
        let n: u32 = self.read_le_num()?;
        if (n as usize).saturating_mul(32) > self.buf.len() - self.pos {
            return Err(truncated("bitmaps"));
        }
        let mut maps = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let mut bits = [0_u64; 4];
            for word in bits.iter_mut() {
                *word = self.read_le_num()?;
            }
            maps.push(Bitmap256::from_words(bits));
        }
        Ok(maps)
    }
}
