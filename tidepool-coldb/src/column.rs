use crate::{
    dict::{dict_encode, run_end_decode, run_end_encode},
    heap::Heap,
    ioutil::{Reader, Writer},
    stats::ColumnStats,
    wordty::{read_for_slice, write_for_slice},
};
use ordered_float::OrderedFloat;
use tidepool_base::{chunked_bitmaps, chunked_get, err_kind, Bitmap256, ErrorKind, Result};
use tidepool_lang::{Ty, Val};
use tracing::trace;

// Buffer flags, first byte of every sealed column.
const FLAG_LZ4: u8 = 0b01;

// Lane kinds, first byte of the (decompressed) body.
const LANE_BIT: u8 = 0;
const LANE_INT: u8 = 1;
const LANE_FLO: u8 = 2;
const LANE_STR: u8 = 3;

// String lane forms.
const STR_PLAIN: u8 = 0;
const STR_DICT: u8 = 1;
const STR_DICT_RUNS: u8 = 2;

fn lane_kind(ty: Ty) -> u8 {
    match ty {
        Ty::Bit => LANE_BIT,
        Ty::Int | Ty::Dec { .. } => LANE_INT,
        Ty::Flo => LANE_FLO,
        Ty::Str => LANE_STR,
    }
}

fn corrupt(msg: impl Into<std::borrow::Cow<'static, str>>) -> tidepool_base::Error {
    err_kind(ErrorKind::Corrupt, msg)
}

// Values of one lane, typed. Null rows hold a placeholder (false, 0,
// 0.0, "") so every lane has exactly one slot per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Vals {
    Bits(Vec<bool>),
    Ints(Vec<i64>),
    Flos(Vec<OrderedFloat<f64>>),
    Strs(Vec<String>),
}

impl Vals {
    fn empty_for(ty: Ty) -> Self {
        match ty {
            Ty::Bit => Vals::Bits(Vec::new()),
            Ty::Int | Ty::Dec { .. } => Vals::Ints(Vec::new()),
            Ty::Flo => Vals::Flos(Vec::new()),
            Ty::Str => Vals::Strs(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Vals::Bits(v) => v.len(),
            Vals::Ints(v) => v.len(),
            Vals::Flos(v) => v.len(),
            Vals::Strs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open, append-only encoder for one field of a batch.
pub(crate) struct ColumnEncoder {
    ty: Ty,
    nulls: Vec<bool>,
    any_null: bool,
    vals: Vals,
    stats: ColumnStats,
}

impl ColumnEncoder {
    pub(crate) fn new(ty: Ty) -> Self {
        ColumnEncoder {
            ty,
            nulls: Vec::new(),
            any_null: false,
            vals: Vals::empty_for(ty),
            stats: ColumnStats::default(),
        }
    }

    pub(crate) fn rows(&self) -> usize {
        self.nulls.len()
    }

    pub(crate) fn append(&mut self, val: &Val) -> Result<()> {
        match (&mut self.vals, val) {
            (Vals::Bits(v), Val::Nil) => v.push(false),
            (Vals::Ints(v), Val::Nil) => v.push(0),
            (Vals::Flos(v), Val::Nil) => v.push(OrderedFloat(0.0)),
            (Vals::Strs(v), Val::Nil) => v.push(String::new()),
            (Vals::Bits(v), Val::Bit(b)) => v.push(*b),
            (Vals::Ints(v), Val::Int(i)) if self.ty == Ty::Int => v.push(*i),
            (Vals::Ints(v), Val::Dec(d)) if matches!(self.ty, Ty::Dec { .. }) => v.push(*d),
            (Vals::Flos(v), Val::Flo(f)) => v.push(*f),
            (Vals::Strs(v), Val::Str(s)) => v.push(s.clone()),
            _ => {
                return Err(err_kind(
                    ErrorKind::SchemaMismatch,
                    format!("{} column cannot hold {:?}", self.ty.name(), val),
                ))
            }
        }
        self.nulls.push(val.is_nil());
        self.any_null |= val.is_nil();
        self.stats.observe(val);
        Ok(())
    }

    // Seals the accumulated values into one buffer and resets the encoder.
    pub(crate) fn seal(&mut self, use_compression: bool) -> Result<(Vec<u8>, ColumnStats)> {
        let rows = u32::try_from(self.rows())
            .map_err(|_| err_kind(ErrorKind::Config, "column longer than u32 rows"))?;
        let mut wr = Writer::new();
        wr.write_le_num(lane_kind(self.ty));
        wr.write_le_num(rows);
        if self.any_null {
            wr.write_le_num(1_u8);
            wr.write_bitmaps(&chunked_bitmaps(self.nulls.iter().copied()))?;
        } else {
            wr.write_le_num(0_u8);
        }
        match &self.vals {
            Vals::Bits(v) => wr.write_bitmaps(&chunked_bitmaps(v.iter().copied()))?,
            Vals::Ints(v) => write_for_slice(&mut wr, v),
            Vals::Flos(v) => {
                for f in v {
                    wr.write_le_num(f.0);
                }
            }
            Vals::Strs(v) => write_str_lane(&mut wr, v)?,
        }
        let body = wr.into_bytes();
        let mut out = Vec::with_capacity(body.len() + 1);
        if use_compression {
            let packed = lz4_flex::compress_prepend_size(&body);
            if packed.len() < body.len() {
                trace!(target: "tidepool", raw = body.len(), packed = packed.len(), "lz4 column");
                out.push(FLAG_LZ4);
                out.extend_from_slice(&packed);
            }
        }
        if out.is_empty() {
            out.push(0);
            out.extend_from_slice(&body);
        }
        let stats = std::mem::take(&mut self.stats);
        self.reset();
        Ok((out, stats))
    }

    // Drops every accumulated value.
    pub(crate) fn reset(&mut self) {
        self.nulls.clear();
        self.any_null = false;
        self.vals = Vals::empty_for(self.ty);
        self.stats = ColumnStats::default();
    }
}

fn write_heap_entries(wr: &mut Writer, entries: &[&String]) -> Result<()> {
    let mut heap = Heap::default();
    let mut offsets = Vec::with_capacity(entries.len());
    let mut lens = Vec::with_capacity(entries.len());
    for s in entries {
        offsets.push(heap.add(s.as_bytes()) as i64);
        lens.push(s.len() as i64);
    }
    wr.write_len_prefixed_bytes(&heap.data)?;
    write_for_slice(wr, &offsets);
    write_for_slice(wr, &lens);
    Ok(())
}

fn read_heap_entries(rd: &mut Reader<'_>, n: usize) -> Result<Vec<String>> {
    let heap = Heap {
        data: rd.read_len_prefixed_bytes()?.to_vec(),
    };
    let offsets = read_for_slice(rd, n)?;
    let lens = read_for_slice(rd, n)?;
    offsets
        .iter()
        .zip(lens.iter())
        .map(|(&off, &len)| {
            let bytes = usize::try_from(off)
                .ok()
                .zip(usize::try_from(len).ok())
                .and_then(|(off, len)| heap.get(off, len))
                .ok_or_else(|| corrupt("string heap entry out of range"))?;
            String::from_utf8(bytes.to_vec()).map_err(|e| tidepool_base::Error::with_kind(ErrorKind::Corrupt, e))
        })
        .collect()
}

// Dictionary-code a string lane when values repeat enough to pay for the
// dictionary, and run-end the codes when runs are long enough.
fn write_str_lane(wr: &mut Writer, vals: &[String]) -> Result<()> {
    let (dict, codes) = dict_encode(vals);
    if vals.is_empty() || dict.len() * 2 > vals.len() {
        wr.write_le_num(STR_PLAIN);
        let all = vals.iter().collect::<Vec<&String>>();
        return write_heap_entries(wr, &all);
    }
    let (run_vals, run_ends) = run_end_encode(&codes);
    let runs = run_vals.len() * 2 < codes.len();
    wr.write_le_num(if runs { STR_DICT_RUNS } else { STR_DICT });
    wr.write_le_num(dict.len() as u32);
    write_heap_entries(wr, &dict)?;
    if runs {
        wr.write_le_num(run_vals.len() as u32);
        let run_vals = run_vals.into_iter().copied().collect::<Vec<i64>>();
        write_for_slice(wr, &run_vals);
        write_for_slice(wr, &run_ends);
    } else {
        write_for_slice(wr, &codes);
    }
    Ok(())
}

fn read_str_lane(rd: &mut Reader<'_>, rows: usize) -> Result<Vec<String>> {
    let form: u8 = rd.read_le_num()?;
    if form == STR_PLAIN {
        return read_heap_entries(rd, rows);
    }
    let n_dict: u32 = rd.read_le_num()?;
    let dict = read_heap_entries(rd, n_dict as usize)?;
    let codes = match form {
        STR_DICT => read_for_slice(rd, rows)?,
        STR_DICT_RUNS => {
            let n_runs: u32 = rd.read_le_num()?;
            let run_vals = read_for_slice(rd, n_runs as usize)?;
            let run_ends = read_for_slice(rd, n_runs as usize)?;
            run_end_decode(&run_vals, &run_ends, rows).ok_or_else(|| corrupt("bad run ends"))?
        }
        _ => return Err(corrupt(format!("unknown string form {}", form))),
    };
    codes
        .iter()
        .map(|&c| {
            usize::try_from(c)
                .ok()
                .and_then(|c| dict.get(c))
                .cloned()
                .ok_or_else(|| corrupt("dictionary code out of range"))
        })
        .collect()
}

/// A decoded column: typed values plus a null map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    ty: Ty,
    nulls: Vec<Bitmap256>,
    vals: Vals,
}

impl Column {
    pub fn ty(&self) -> Ty {
        self.ty
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    pub fn vals(&self) -> &Vals {
        &self.vals
    }

    pub fn is_null(&self, row: usize) -> bool {
        chunked_get(&self.nulls, row)
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    pub fn get(&self, row: usize) -> Option<Val> {
        if row >= self.len() {
            return None;
        }
        if self.is_null(row) {
            return Some(Val::Nil);
        }
        Some(match (&self.vals, self.ty) {
            (Vals::Bits(v), _) => Val::Bit(v[row]),
            (Vals::Ints(v), Ty::Dec { .. }) => Val::Dec(v[row]),
            (Vals::Ints(v), _) => Val::Int(v[row]),
            (Vals::Flos(v), _) => Val::Flo(v[row]),
            (Vals::Strs(v), _) => Val::Str(v[row].clone()),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Val> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

pub fn decode_column(ty: Ty, buf: &[u8]) -> Result<Column> {
    let (&flags, rest) = buf
        .split_first()
        .ok_or_else(|| corrupt("empty column buffer"))?;
    let unpacked;
    let body = if flags & FLAG_LZ4 != 0 {
        unpacked = lz4_flex::decompress_size_prepended(rest)
            .map_err(|e| tidepool_base::Error::with_kind(ErrorKind::Corrupt, e))?;
        &unpacked[..]
    } else {
        rest
    };
    let mut rd = Reader::new(body);
    let kind: u8 = rd.read_le_num()?;
    if kind != lane_kind(ty) {
        return Err(corrupt(format!(
            "column buffer holds lane kind {}, expected {} for {}",
            kind,
            lane_kind(ty),
            ty.name()
        )));
    }
    let rows = rd.read_le_num::<u32>()? as usize;
    let has_nulls: u8 = rd.read_le_num()?;
    let nulls = if has_nulls != 0 {
        rd.read_bitmaps()?
    } else {
        Vec::new()
    };
    let vals = match kind {
        LANE_BIT => {
            let maps = rd.read_bitmaps()?;
            Vals::Bits((0..rows).map(|i| chunked_get(&maps, i)).collect())
        }
        LANE_INT => Vals::Ints(read_for_slice(&mut rd, rows)?),
        LANE_FLO => {
            let mut v = Vec::with_capacity(rows.min(body.len() / 8));
            for _ in 0..rows {
                v.push(OrderedFloat(rd.read_le_num::<f64>()?));
            }
            Vals::Flos(v)
        }
        _ => Vals::Strs(read_str_lane(&mut rd, rows)?),
    };
    if !rd.is_at_end() {
        return Err(corrupt("trailing bytes after column body"));
    }
    if vals.len() != rows {
        return Err(corrupt("column value count does not match row count"));
    }
    Ok(Column { ty, nulls, vals })
}
