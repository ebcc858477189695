//! Splitting a scope's items into dependency-ordered levels.
//!
//! Branch sets and aggregates need every row of their input before they can
//! produce output, so anything reading their results runs one level later.
//! Registers bound by a scan are available from level 0.

use std::collections::{BTreeSet, HashMap};

use crate::error::{CompileError, FlowResult};

use super::context::{ContextId, Owner};
use super::items::AggregateSpec;
use super::{Builder, Value};

/// Items evaluated together: one join, then its wrappers.
#[derive(Debug, Clone, Default)]
pub(crate) struct Level {
    pub(crate) records: Vec<usize>,
    pub(crate) lookups: Vec<usize>,
    pub(crate) calls: Vec<usize>,
    pub(crate) moves: Vec<usize>,
    pub(crate) nots: Vec<ContextId>,
    pub(crate) branch_sets: Vec<usize>,
    pub(crate) aggregates: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Item {
    Record(usize),
    Call(usize),
    Move(usize),
    Not(ContextId),
    BranchSet(usize),
    Aggregate(usize),
}

#[derive(Debug)]
struct Dependencies {
    item: Item,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    delay: usize,
}

impl Builder {
    /// Whether a record item scans an entity found by a scan. Records over
    /// a computed value (a branch result, an aggregate, a call) wait for it.
    fn is_found(&self, ix: usize) -> bool {
        matches!(self.owner(self.records[ix].record), Owner::Record(_))
    }

    /// Registers bound by the scans of `context`, plus everything bound
    /// before the scope starts.
    fn supported(&self, context: ContextId) -> BTreeSet<usize> {
        let scope = self.context(context);
        let mut supported: BTreeSet<usize> = (0..scope.register_start).collect();
        for ix in scope.items.records.iter().filter(|ix| self.is_found(**ix)) {
            let record = &self.records[*ix];
            if !record.attributes.is_empty() {
                supported.extend(self.register_of(context, &record.record.into()));
            }
            for (attribute, value) in &record.attributes {
                supported.extend(self.register_of(context, attribute));
                supported.extend(self.register_of(context, value));
            }
        }
        for ix in &scope.items.lookups {
            let lookup = &self.lookups[*ix];
            supported.extend(self.register_of(context, &lookup.record));
            supported.extend(self.register_of(context, &lookup.attribute.into()));
            supported.extend(self.register_of(context, &lookup.value.into()));
        }
        supported
    }

    fn registers_of<'a>(&self, context: ContextId, values: impl IntoIterator<Item = &'a Value>) -> Vec<usize> {
        values
            .into_iter()
            .filter_map(|value| self.register_of(context, value))
            .collect()
    }

    fn dependencies(&self, context: ContextId) -> Vec<Dependencies> {
        let items = &self.context(context).items;
        let mut deps = Vec::new();
        for ix in items.records.iter().filter(|ix| !self.is_found(**ix)) {
            let record = &self.records[*ix];
            deps.push(Dependencies {
                item: Item::Record(*ix),
                inputs: self.register_of(context, &record.record.into()).into_iter().collect(),
                outputs: record
                    .attributes
                    .iter()
                    .flat_map(|(attribute, value)| [attribute, value])
                    .filter_map(|value| self.register_of(context, value))
                    .collect(),
                delay: 0,
            });
        }
        for ix in &items.calls {
            let call = &self.calls[*ix];
            deps.push(Dependencies {
                item: Item::Call(*ix),
                inputs: self.registers_of(context, &call.args),
                outputs: call
                    .output
                    .and_then(|output| self.register_of(context, &output.into()))
                    .into_iter()
                    .collect(),
                delay: 0,
            });
        }
        for ix in &items.moves {
            let mv = &self.moves[*ix];
            let owner = self.owner_context(mv.to);
            deps.push(Dependencies {
                item: Item::Move(*ix),
                inputs: self.register_of(context, &mv.from).into_iter().collect(),
                outputs: self.register_of(owner, &mv.to.into()).into_iter().collect(),
                delay: 0,
            });
        }
        for not in &items.nots {
            deps.push(Dependencies {
                item: Item::Not(*not),
                inputs: self.input_registers(*not, &[]),
                outputs: Vec::new(),
                delay: 0,
            });
        }
        for ix in &items.branch_sets {
            let set = &self.branch_sets[*ix];
            let inputs: BTreeSet<usize> = set
                .branches
                .iter()
                .flat_map(|branch| self.input_registers(*branch, &set.results))
                .collect();
            let outputs: Vec<Value> = set.results.iter().map(Value::from).collect();
            deps.push(Dependencies {
                item: Item::BranchSet(*ix),
                inputs: inputs.into_iter().collect(),
                outputs: self.registers_of(context, &outputs),
                delay: 1,
            });
        }
        for ix in &items.aggregates {
            let aggregate = &self.aggregates[*ix];
            let mut inputs: Vec<Value> = aggregate
                .projection
                .iter()
                .chain(&aggregate.group)
                .map(Value::from)
                .collect();
            if let AggregateSpec::Sum(value) = &aggregate.spec {
                inputs.push(value.clone());
            }
            deps.push(Dependencies {
                item: Item::Aggregate(*ix),
                inputs: self.registers_of(context, &inputs),
                outputs: self
                    .register_of(context, &aggregate.output.into())
                    .into_iter()
                    .collect(),
                delay: 1,
            });
        }
        deps
    }

    /// Partition the items of `context` into levels.
    pub(crate) fn split(&self, context: ContextId) -> FlowResult<Vec<Level>> {
        let supported = self.supported(context);
        let deps = self.dependencies(context);
        let limit = deps.len() + 1;

        let mut available: HashMap<usize, usize> = HashMap::new();
        let mut levels = vec![0usize; deps.len()];
        let mut settled = false;
        for _ in 0..=limit {
            let mut changed = false;
            for (ix, dep) in deps.iter().enumerate() {
                let level = dep
                    .inputs
                    .iter()
                    .filter(|register| !supported.contains(register))
                    .filter_map(|register| available.get(register).copied())
                    .max()
                    .unwrap_or(0);
                if level > levels[ix] {
                    levels[ix] = level;
                    changed = true;
                }
                let produced = levels[ix] + dep.delay;
                for output in dep.outputs.iter().filter(|register| !supported.contains(register)) {
                    let entry = available.entry(*output).or_insert(0);
                    if produced > *entry {
                        *entry = produced;
                        changed = true;
                    }
                }
            }
            if levels.iter().any(|level| *level > limit) {
                break;
            }
            if !changed {
                settled = true;
                break;
            }
        }
        if !settled {
            return Err(CompileError::Unstratifiable {
                block: self.name.clone(),
            }
            .into());
        }

        let count = levels.iter().max().map_or(1, |max| max + 1);
        let mut out = vec![Level::default(); count];
        let scope = &self.context(context).items;
        out[0].records = scope.records.iter().copied().filter(|ix| self.is_found(*ix)).collect();
        out[0].lookups.clone_from(&scope.lookups);
        for (dep, level) in deps.iter().zip(levels) {
            let target = &mut out[level];
            match dep.item {
                Item::Record(ix) => target.records.push(ix),
                Item::Call(ix) => target.calls.push(ix),
                Item::Move(ix) => target.moves.push(ix),
                Item::Not(not) => target.nots.push(not),
                Item::BranchSet(ix) => target.branch_sets.push(ix),
                Item::Aggregate(ix) => target.aggregates.push(ix),
            }
        }
        Ok(out)
    }
}
