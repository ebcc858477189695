//! Aggregates over the rows of one flow level.
//!
//! Rows are grouped by the group registers; within a group each distinct
//! projection tuple counts once.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{FlowError, FlowResult};
use crate::interner::Interner;
use crate::value::{Id, RawValue};

use super::{Field, Register, Row};

/// Sort direction of one projection column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Up,
    Down,
}

impl Direction {
    /// Parses `"up"` or `"down"`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// What an aggregate computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateKind {
    /// Number of distinct projection tuples.
    Count,
    /// Sum of the value over distinct projection tuples.
    Sum(Field),
    /// 1-based position of the projection tuple in its group.
    Sort(Vec<Direction>),
}

type Key = Vec<Option<Id>>;

fn raw(interner: &Interner, id: Option<Id>) -> FlowResult<Option<&RawValue>> {
    id.map(|id| {
        interner
            .reverse(id)
            .ok_or_else(|| FlowError::internal(format!("unknown value id {id}")))
    })
    .transpose()
}

fn compare_tuples(
    interner: &Interner,
    directions: &[Direction],
    left: &Key,
    right: &Key,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    for (column, (l, r)) in left.iter().zip(right).enumerate() {
        let l = l.and_then(|id| interner.reverse(id));
        let r = r.and_then(|id| interner.reverse(id));
        let ord = match (l, r) {
            (Some(l), Some(r)) => l.total_cmp(r),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ord = match directions.get(column).copied().unwrap_or_default() {
            Direction::Up => ord,
            Direction::Down => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// The aggregate value for each row, in row order.
pub(crate) fn evaluate(
    kind: &AggregateKind,
    group: &[Register],
    projection: &[Register],
    rows: &[Row],
    interner: &mut Interner,
) -> FlowResult<Vec<Id>> {
    let mut groups: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
    let mut keys = Vec::with_capacity(rows.len());
    for row in rows {
        let group_key = row.key(group);
        let mut tuple = row.key(projection);
        if let AggregateKind::Sum(value) = kind {
            tuple.push(row.resolve(*value));
        }
        groups.entry(group_key.clone()).or_default().insert(tuple.clone());
        keys.push((group_key, tuple));
    }

    match kind {
        AggregateKind::Count => {
            let counts: BTreeMap<&Key, Id> = groups
                .iter()
                .map(|(group, tuples)| (group, interner.intern(&RawValue::from(tuples.len()))))
                .collect();
            Ok(keys.iter().map(|(group, _)| counts[group]).collect())
        }
        AggregateKind::Sum(_) => {
            let mut sums: BTreeMap<&Key, Id> = BTreeMap::new();
            for (group, tuples) in &groups {
                let mut total = 0.0;
                for tuple in tuples {
                    let value = raw(interner, tuple.last().copied().flatten())?;
                    total += value.and_then(RawValue::as_number).unwrap_or(0.0);
                }
                sums.insert(group, interner.intern(&RawValue::from(total)));
            }
            Ok(keys.iter().map(|(group, _)| sums[group]).collect())
        }
        AggregateKind::Sort(directions) => {
            let mut positions: BTreeMap<(&Key, &Key), Id> = BTreeMap::new();
            for (group, tuples) in &groups {
                let mut ordered: Vec<&Key> = tuples.iter().collect();
                ordered.sort_by(|l, r| compare_tuples(interner, directions, l, r));
                for (ix, tuple) in ordered.into_iter().enumerate() {
                    positions.insert((group, tuple), interner.intern(&RawValue::from(ix + 1)));
                }
            }
            Ok(keys
                .iter()
                .map(|(group, tuple)| positions[&(group, tuple)])
                .collect())
        }
    }
}
