//! Things a flow collects while its body runs.

use crate::runtime::{BranchMode, Direction, FunctionInfo};

use super::context::ContextId;
use super::{Reference, Value};

/// A pattern over an existing record: one scan per attribute.
#[derive(Debug, Clone)]
pub(crate) struct RecordItem {
    pub(crate) context: ContextId,
    pub(crate) record: Reference,
    pub(crate) attributes: Vec<(Value, Value)>,
}

/// Facts the block emits about `record`.
#[derive(Debug, Clone)]
pub(crate) struct InsertItem {
    pub(crate) record: Reference,
    pub(crate) attributes: Vec<(Value, Value)>,
}

/// A scan whose attribute is free.
#[derive(Debug, Clone)]
pub(crate) struct LookupItem {
    pub(crate) context: ContextId,
    pub(crate) record: Value,
    pub(crate) attribute: Reference,
    pub(crate) value: Reference,
}

/// A function application.
#[derive(Debug, Clone)]
pub(crate) struct CallItem {
    pub(crate) context: ContextId,
    pub(crate) info: FunctionInfo,
    pub(crate) args: Vec<Value>,
    pub(crate) output: Option<Reference>,
}

#[derive(Debug, Clone)]
pub(crate) enum AggregateSpec {
    Count,
    Sum(Value),
    Sort(Vec<Direction>),
}

/// `gather(projection).per(group)` followed by an aggregate.
#[derive(Debug, Clone)]
pub(crate) struct AggregateItem {
    pub(crate) context: ContextId,
    pub(crate) spec: AggregateSpec,
    pub(crate) projection: Vec<Reference>,
    pub(crate) group: Vec<Reference>,
    pub(crate) output: Reference,
}

/// Copy `from`, as seen in `context`, into the register of `to` as seen by
/// the scope that owns it.
#[derive(Debug, Clone)]
pub(crate) struct MoveItem {
    pub(crate) context: ContextId,
    pub(crate) from: Value,
    pub(crate) to: Reference,
}

/// A choose or union.
#[derive(Debug, Clone)]
pub(crate) struct BranchSetItem {
    pub(crate) mode: BranchMode,
    pub(crate) branches: Vec<ContextId>,
    pub(crate) results: Vec<Reference>,
}

/// Item indices collected by one scope.
#[derive(Debug, Clone, Default)]
pub(crate) struct Collector {
    pub(crate) records: Vec<usize>,
    pub(crate) inserts: Vec<usize>,
    pub(crate) lookups: Vec<usize>,
    pub(crate) calls: Vec<usize>,
    pub(crate) aggregates: Vec<usize>,
    pub(crate) moves: Vec<usize>,
    pub(crate) nots: Vec<ContextId>,
    pub(crate) branch_sets: Vec<usize>,
}

impl Collector {
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.inserts.is_empty()
            && self.lookups.is_empty()
            && self.calls.is_empty()
            && self.aggregates.is_empty()
            && self.moves.is_empty()
            && self.nots.is_empty()
            && self.branch_sets.is_empty()
    }
}
