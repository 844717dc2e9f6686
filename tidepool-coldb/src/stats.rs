use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tidepool_base::{ErrorKind, Result};
use tidepool_lang::{Row, Val};

/// Summary of one sealed column buffer. `lo` and `hi` range over the
/// non-null values only; both are `Nil` when every row is null.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnStats {
    pub lo: Val,
    pub hi: Val,
    pub nulls: u32,
}

impl ColumnStats {
    pub(crate) fn observe(&mut self, val: &Val) {
        if val.is_nil() {
            self.nulls += 1;
            return;
        }
        if self.lo.is_nil() || *val < self.lo {
            self.lo = val.clone();
        }
        if self.hi.is_nil() || *val > self.hi {
            self.hi = val.clone();
        }
    }
}

/// Per-batch statistics, stored in the shadow table's `stats` column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchStats {
    pub rows: u32,
    pub cols: Vec<ColumnStats>,
}

impl BatchStats {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| tidepool_base::Error::with_kind(ErrorKind::Corrupt, e))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cmp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    NotNull,
}

/// A single-column predicate. Comparisons never match null cells, and a
/// value of a different type than the column never compares equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub col: usize,
    pub cmp: Cmp,
    pub val: Val,
}

fn same_kind(a: &Val, b: &Val) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

impl Predicate {
    pub fn new(col: usize, cmp: Cmp, val: impl Into<Val>) -> Self {
        Predicate {
            col,
            cmp,
            val: val.into(),
        }
    }

    pub fn is_null(col: usize) -> Self {
        Predicate::new(col, Cmp::IsNull, Val::Nil)
    }

    pub fn not_null(col: usize) -> Self {
        Predicate::new(col, Cmp::NotNull, Val::Nil)
    }

    pub fn matches(&self, cell: &Val) -> bool {
        match self.cmp {
            Cmp::IsNull => return cell.is_nil(),
            Cmp::NotNull => return !cell.is_nil(),
            _ => (),
        }
        if cell.is_nil() || !same_kind(cell, &self.val) {
            return false;
        }
        let ord = cell.cmp(&self.val);
        match self.cmp {
            Cmp::Eq => ord == Ordering::Equal,
            Cmp::Lt => ord == Ordering::Less,
            Cmp::Le => ord != Ordering::Greater,
            Cmp::Gt => ord == Ordering::Greater,
            Cmp::Ge => ord != Ordering::Less,
            Cmp::IsNull | Cmp::NotNull => unreachable!(),
        }
    }

    // False only when no row summarized by `stats` can match.
    pub fn may_match(&self, stats: &ColumnStats, rows: u32) -> bool {
        match self.cmp {
            Cmp::IsNull => return stats.nulls > 0,
            Cmp::NotNull => return stats.nulls < rows,
            _ => (),
        }
        if stats.lo.is_nil() {
            return false;
        }
        if !same_kind(&stats.lo, &self.val) {
            return true;
        }
        let v = &self.val;
        match self.cmp {
            Cmp::Eq => stats.lo <= *v && *v <= stats.hi,
            Cmp::Lt => stats.lo < *v,
            Cmp::Le => stats.lo <= *v,
            Cmp::Gt => stats.hi > *v,
            Cmp::Ge => stats.hi >= *v,
            Cmp::IsNull | Cmp::NotNull => unreachable!(),
        }
    }
}

/// A conjunction of predicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    preds: Vec<Predicate>,
}

impl Filter {
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn and(mut self, pred: Predicate) -> Self {
        self.preds.push(pred);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.preds
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.preds
            .iter()
            .all(|p| row.get(p.col).map(|v| p.matches(v)).unwrap_or(false))
    }

    pub fn may_match(&self, stats: &BatchStats) -> bool {
        self.preds.iter().all(|p| match stats.cols.get(p.col) {
            Some(cs) => p.may_match(cs, stats.rows),
            None => true,
        })
    }
}
