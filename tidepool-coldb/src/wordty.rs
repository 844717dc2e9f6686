use crate::ioutil::{Reader, Writer};
use tidepool_base::{err_kind, ErrorKind, Result};

// Integer lanes are frame-of-reference encoded: every value is stored as
// its unsigned distance from the lane minimum, in the narrowest word
// that holds the largest distance.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub(crate) enum WordTy {
    Word1,
    Word2,
    Word4,
    Word8,
}
impl WordTy {
    pub(crate) fn len(&self) -> usize {
        match self {
            WordTy::Word1 => 1,
            WordTy::Word2 => 2,
            WordTy::Word4 => 4,
            WordTy::Word8 => 8,
        }
    }

    pub(crate) fn code(&self) -> u8 {
        match self {
            WordTy::Word1 => 0,
            WordTy::Word2 => 1,
            WordTy::Word4 => 2,
            WordTy::Word8 => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(WordTy::Word1),
            1 => Ok(WordTy::Word2),
            2 => Ok(WordTy::Word4),
            3 => Ok(WordTy::Word8),
            _ => Err(err_kind(ErrorKind::Corrupt, format!("bad word type code {}", code))),
        }
    }

    pub(crate) fn select_min_and_ty(vals: &[i64]) -> (i64, WordTy) {
        let min = vals.iter().copied().min().unwrap_or(0);
        let accum = vals
            .iter()
            .map(|x| x.wrapping_sub(min) as u64)
            .fold(0, |a, x| a | x);
        let ty = if accum <= 0xff {
            WordTy::Word1
        } else if accum <= 0xffff {
            WordTy::Word2
        } else if accum <= 0xffff_ffff {
            WordTy::Word4
        } else {
            WordTy::Word8
        };
        (min, ty)
    }
}

// Layout: [min: i64][word type: u8][len(vals) words]. The count is not
// stored; callers always know it from the enclosing buffer.
pub(crate) fn write_for_slice(wr: &mut Writer, vals: &[i64]) {
    let (min, ty) = WordTy::select_min_and_ty(vals);
    wr.write_le_num(min);
    wr.write_le_num(ty.code());
    for v in vals {
        let delta = v.wrapping_sub(min) as u64;
        match ty {
            WordTy::Word1 => wr.write_le_num(delta as u8),
            WordTy::Word2 => wr.write_le_num(delta as u16),
            WordTy::Word4 => wr.write_le_num(delta as u32),
            WordTy::Word8 => wr.write_le_num(delta),
        }
    }
}

pub(crate) fn read_for_slice(rd: &mut Reader<'_>, n: usize) -> Result<Vec<i64>> {
    let min: i64 = rd.read_le_num()?;
    let ty = WordTy::from_code(rd.read_le_num()?)?;
    let words = rd.read_byte_slice(n.checked_mul(ty.len()).ok_or_else(|| {
        err_kind(ErrorKind::Corrupt, "word slice length overflows")
    })?)?;
    let mut out = Vec::with_capacity(n);
    for w in words.chunks_exact(ty.len()) {
        let mut le = [0_u8; 8];
        le[..w.len()].copy_from_slice(w);
        out.push(min.wrapping_add(u64::from_le_bytes(le) as i64));
    }
    Ok(out)
}
