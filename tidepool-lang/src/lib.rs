use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tidepool_base::{err_kind, ErrorKind, Result};


// Decimals are fixed-point i64s: an unscaled integer plus a per-column
// scale. 18 digits is the most that always fits in an i64.
pub const MAX_DEC_PRECISION: u8 = 18;

// The logical type of a column. Every type admits Nil when its field is
// nullable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Ty {
    Bit,
    Int,
    Flo,
    Str,
    Dec { precision: u8, scale: u8 },
}

impl Ty {
    pub fn name(&self) -> &'static str {
        match self {
            Ty::Bit => "bit",
            Ty::Int => "int",
            Ty::Flo => "flo",
            Ty::Str => "str",
            Ty::Dec { .. } => "dec",
        }
    }

    pub fn admits(&self, val: &Val) -> bool {
        match (self, val) {
            (_, Val::Nil) => true,
            (Ty::Bit, Val::Bit(_)) => true,
            (Ty::Int, Val::Int(_)) => true,
            (Ty::Flo, Val::Flo(_)) => true,
            (Ty::Str, Val::Str(_)) => true,
            (Ty::Dec { precision, .. }, Val::Dec(unscaled)) => {
                unscaled.unsigned_abs() < 10_u64.pow(*precision as u32)
            }
            _ => false,
        }
    }
}

// A single cell value. The derived ordering is only meaningful between
// values of the same type, which is all that per-column stats need.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Val {
    #[default]
    Nil,
    Bit(bool),
    Int(i64),
    Flo(OrderedFloat<f64>),
    Str(String),
    Dec(i64),
}

impl Val {
    pub fn flo(f: f64) -> Self {
        Val::Flo(OrderedFloat(f))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Val::Str(s.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    // Appends a type-tagged, self-delimiting byte form of the value. Two
    // values produce the same bytes exactly when they are equal, so the
    // output is fit for hashing.
    pub fn write_key_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Val::Nil => out.push(0),
            Val::Bit(b) => {
                out.push(1);
                out.push(*b as u8);
            }
            Val::Int(i) => {
                out.push(2);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Val::Flo(f) => {
                // Zeroes and NaNs compare equal under OrderedFloat; hash
                // them as one bit pattern each.
                let bits = if f.0.is_nan() {
                    f64::NAN.to_bits()
                } else if f.0 == 0.0 {
                    0u64
                } else {
                    f.0.to_bits()
                };
                out.push(3);
                out.extend_from_slice(&bits.to_le_bytes());
            }
            Val::Str(s) => {
                out.push(4);
                out.extend_from_slice(&(s.len() as u64).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Val::Dec(d) => {
                out.push(5);
                out.extend_from_slice(&d.to_le_bytes());
            }
        }
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bit(b)
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<f64> for Val {
    fn from(f: f64) -> Self {
        Val::flo(f)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::str(s)
    }
}

impl<T: Into<Val>> From<Option<T>> for Val {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Val::Nil)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Ty,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Field {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            return Err(err_kind(ErrorKind::Config, "schema has no fields"));
        }
        let mut names = BTreeSet::new();
        for field in fields.iter() {
            if !names.insert(field.name.to_ascii_lowercase()) {
                return Err(err_kind(
                    ErrorKind::Config,
                    format!("duplicate field name '{}'", field.name),
                ));
            }
            if let Ty::Dec { precision, scale } = field.ty {
                if precision == 0 || precision > MAX_DEC_PRECISION || scale > precision {
                    return Err(err_kind(
                        ErrorKind::Config,
                        format!(
                            "field '{}': unsupported decimal({}, {})",
                            field.name, precision, scale
                        ),
                    ));
                }
            }
        }
        Ok(Schema { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    // Resolves column names to field positions, in the order given.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                self.index_of(n.as_ref()).ok_or_else(|| {
                    err_kind(
                        ErrorKind::SchemaMismatch,
                        format!("no column named '{}'", n.as_ref()),
                    )
                })
            })
            .collect()
    }

    /// The fields at `cols`, in that order. Positions may repeat, so the
    /// result can carry a name more than once.
    pub fn projection(&self, cols: &[usize]) -> Schema {
        Schema {
            fields: cols
                .iter()
                .filter_map(|c| self.fields.get(*c).cloned())
                .collect(),
        }
    }

    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.fields.len() {
            return Err(err_kind(
                ErrorKind::SchemaMismatch,
                format!(
                    "row has {} values, schema has {} fields",
                    row.len(),
                    self.fields.len()
                ),
            ));
        }
        for (field, val) in self.fields.iter().zip(row.vals()) {
            if val.is_nil() && !field.nullable {
                return Err(err_kind(
                    ErrorKind::SchemaMismatch,
                    format!("null in non-nullable field '{}'", field.name),
                ));
            }
            if !field.ty.admits(val) {
                return Err(err_kind(
                    ErrorKind::SchemaMismatch,
                    format!(
                        "field '{}' of type {} cannot hold {:?}",
                        field.name,
                        field.ty.name(),
                        val
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Row(pub Vec<Val>);

impl Row {
    pub fn new(vals: Vec<Val>) -> Self {
        Row(vals)
    }

    pub fn vals(&self) -> &[Val] {
        &self.0
    }

    pub fn get(&self, i: usize) -> Option<&Val> {
        self.0.get(i)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn project(&self, cols: &[usize]) -> Row {
        Row(cols
            .iter()
            .map(|&c| self.0.get(c).cloned().unwrap_or(Val::Nil))
            .collect())
    }
}

impl From<Vec<Val>> for Row {
    fn from(vals: Vec<Val>) -> Self {
        Row(vals)
    }
}

// Shorthand for building rows in tests and callers: `row![1_i64, "a", None::<i64>]`.
#[macro_export]
macro_rules! row {
    ($($v:expr),* $(,)?) => {
        $crate::Row(vec![$($crate::Val::from($v)),*])
    };
}
