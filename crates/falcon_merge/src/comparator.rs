//! Row ordering for the sorted merge.

use std::cmp::Ordering;

use falcon_common::datum::{Datum, OwnedRow};

/// Total order used by a sorted merge. Every source must deliver its rows
/// already sorted by the same comparator.
pub trait RowComparator: Send + Sync {
    fn compare(&self, a: &OwnedRow, b: &OwnedRow) -> Ordering;
}

impl<F> RowComparator for F
where
    F: Fn(&OwnedRow, &OwnedRow) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &OwnedRow, b: &OwnedRow) -> Ordering {
        self(a, b)
    }
}

/// ORDER BY over column positions: `(col_idx, ascending)` pairs, compared
/// left to right. NULLs sort first in ascending order.
#[derive(Debug, Clone)]
pub struct SortKeyComparator {
    sort_columns: Vec<(usize, bool)>,
}

impl SortKeyComparator {
    pub fn new(sort_columns: Vec<(usize, bool)>) -> Self {
        Self { sort_columns }
    }

    pub fn sort_columns(&self) -> &[(usize, bool)] {
        &self.sort_columns
    }
}

impl RowComparator for SortKeyComparator {
    fn compare(&self, a: &OwnedRow, b: &OwnedRow) -> Ordering {
        compare_rows_by_columns(a, b, &self.sort_columns)
    }
}

pub fn compare_rows_by_columns(
    a: &OwnedRow,
    b: &OwnedRow,
    sort_columns: &[(usize, bool)],
) -> Ordering {
    for &(col_idx, ascending) in sort_columns {
        let ord = compare_datums(a.values.get(col_idx), b.values.get(col_idx));
        let ord = if ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compare two optional Datum values for sorting. A missing column sorts
/// like NULL.
pub fn compare_datums(a: Option<&Datum>, b: Option<&Datum>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(da), Some(db)) => cmp_datum(da, db),
    }
}

pub(crate) fn cmp_datum(a: &Datum, b: &Datum) -> Ordering {
    match (a, b) {
        (Datum::Null, Datum::Null) => Ordering::Equal,
        (Datum::Null, _) => Ordering::Less,
        (_, Datum::Null) => Ordering::Greater,
        (Datum::Int32(x), Datum::Int32(y)) => x.cmp(y),
        (Datum::Int64(x), Datum::Int64(y)) => x.cmp(y),
        (Datum::Int32(x), Datum::Int64(y)) => (*x as i64).cmp(y),
        (Datum::Int64(x), Datum::Int32(y)) => x.cmp(&(*y as i64)),
        (Datum::Float64(x), Datum::Float64(y)) => x.total_cmp(y),
        (Datum::Float64(x), Datum::Int64(y)) => x.total_cmp(&(*y as f64)),
        (Datum::Int64(x), Datum::Float64(y)) => (*x as f64).total_cmp(y),
        (Datum::Float64(x), Datum::Int32(y)) => x.total_cmp(&(*y as f64)),
        (Datum::Int32(x), Datum::Float64(y)) => (*x as f64).total_cmp(y),
        (Datum::Text(x), Datum::Text(y)) => x.cmp(y),
        (Datum::Boolean(x), Datum::Boolean(y)) => x.cmp(y),
        (Datum::Timestamp(x), Datum::Timestamp(y)) => x.cmp(y),
        (Datum::Date(x), Datum::Date(y)) => x.cmp(y),
        (Datum::Bytea(x), Datum::Bytea(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Fixed order between incomparable types, so a mixed-type column still
/// sorts consistently. Numeric widths share one rank.
fn type_rank(d: &Datum) -> u8 {
    match d {
        Datum::Null => 0,
        Datum::Boolean(_) => 1,
        Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) => 2,
        Datum::Text(_) => 3,
        Datum::Timestamp(_) => 4,
        Datum::Date(_) => 5,
        Datum::Bytea(_) => 6,
    }
}
