//! Compiled blocks.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::change::{Eav, Round};
use crate::error::FlowResult;
use crate::index::Index;
use crate::interner::Interner;
use crate::value::Id;

use super::node::{InsertNode, Plan};
use super::{EvalContext, Row};

/// Attributes a block scans. A scan with a free attribute reads
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reads {
    attributes: BTreeSet<Id>,
    any: bool,
}

impl Reads {
    pub fn add(&mut self, attribute: Option<Id>) {
        match attribute {
            Some(attribute) => {
                self.attributes.insert(attribute);
            }
            None => self.any = true,
        }
    }

    #[must_use]
    pub fn contains(&self, attribute: Id) -> bool {
        self.any || self.attributes.contains(&attribute)
    }

    /// Whether some scan has a free attribute.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.any
    }

    pub fn attributes(&self) -> impl Iterator<Item = Id> + '_ {
        self.attributes.iter().copied()
    }

    /// Whether the index has cells at `round` this block could see.
    #[must_use]
    pub fn touched(&self, index: &Index, round: Round) -> bool {
        if self.any {
            return index.has_round(round);
        }
        self.attributes
            .iter()
            .any(|attribute| index.touches(round, *attribute))
    }
}

/// Whether a block writes to the index or only reports its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Rule,
    Watch,
}

/// A compiled block: a plan plus the facts it emits per row.
#[derive(Debug, Clone)]
pub struct Block {
    name: String,
    id: Uuid,
    kind: BlockKind,
    plan: Plan,
    outputs: Vec<InsertNode>,
    registers: usize,
    levels: usize,
    reads: Reads,
}

impl Block {
    pub(crate) fn new(
        name: String,
        id: Uuid,
        kind: BlockKind,
        plan: Plan,
        outputs: Vec<InsertNode>,
        registers: usize,
        levels: usize,
    ) -> Self {
        let mut reads = Reads::default();
        plan.collect_reads(&mut reads);
        Self {
            name,
            id,
            kind,
            plan,
            outputs,
            registers,
            levels,
            reads,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    #[must_use]
    pub const fn reads(&self) -> &Reads {
        &self.reads
    }

    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    #[must_use]
    pub fn outputs(&self) -> &[InsertNode] {
        &self.outputs
    }

    /// Number of registers a row of this block can hold.
    #[must_use]
    pub const fn register_count(&self) -> usize {
        self.registers
    }

    /// Number of stratification levels of the root flow.
    #[must_use]
    pub const fn level_count(&self) -> usize {
        self.levels
    }

    /// Evaluate against the facts visible at `round`. Returns the distinct
    /// facts produced, each with the node that first produced it.
    pub(crate) fn exec(
        &self,
        index: &Index,
        interner: &mut Interner,
        round: Round,
    ) -> FlowResult<BTreeMap<Eav, Id>> {
        let mut ctx = EvalContext {
            index,
            interner,
            round,
            block: &self.name,
        };
        let rows = self.plan.exec(&mut ctx, vec![Row::new()])?;
        let mut produced = BTreeMap::new();
        for row in &rows {
            for output in &self.outputs {
                if let Some(key) = output.resolve(row) {
                    produced.entry(key).or_insert(output.node);
                }
            }
        }
        Ok(produced)
    }
}
