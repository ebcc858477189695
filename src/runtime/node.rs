//! Flow nodes layered on top of joins.

use std::collections::HashMap;

use crate::change::Eav;
use crate::error::FlowResult;
use crate::value::Id;

use super::aggregate::{self, AggregateKind};
use super::block::Reads;
use super::join::{Constraint, DownstreamJoinNode, JoinNode};
use super::{EvalContext, Field, Register, Row};

/// One executable stage of a plan.
#[derive(Debug, Clone)]
pub enum Node {
    Join(JoinNode),
    DownstreamJoin(DownstreamJoinNode),
    AntiJoin(AntiJoin),
    Branch(BranchFlow),
    Aggregate(AggregateFlow),
}

impl Node {
    pub(crate) fn exec(&self, ctx: &mut EvalContext<'_>, upstream: Vec<Row>) -> FlowResult<Vec<Row>> {
        match self {
            Self::Join(join) => join.exec(ctx),
            Self::DownstreamJoin(join) => join.exec(ctx, upstream),
            Self::AntiJoin(anti) => anti.exec(ctx, upstream),
            Self::Branch(branch) => branch.exec(ctx, upstream),
            Self::Aggregate(agg) => agg.exec(ctx, upstream),
        }
    }

    pub(crate) fn collect_reads(&self, reads: &mut Reads) {
        let constraints = match self {
            Self::Join(join) => &join.constraints,
            Self::DownstreamJoin(join) => &join.constraints,
            Self::AntiJoin(anti) => {
                anti.left.collect_reads(reads);
                anti.right.collect_reads(reads);
                return;
            }
            Self::Branch(branch) => {
                branch.left.collect_reads(reads);
                branch.branches.iter().for_each(|plan| plan.collect_reads(reads));
                return;
            }
            Self::Aggregate(agg) => {
                agg.left.collect_reads(reads);
                return;
            }
        };
        for constraint in constraints {
            if let Constraint::Scan(scan) = constraint {
                reads.add(scan.attribute());
            }
        }
    }
}

/// Nodes run in sequence, each consuming the rows of the previous one.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub nodes: Vec<Node>,
}

impl Plan {
    pub(crate) fn exec(&self, ctx: &mut EvalContext<'_>, seed: Vec<Row>) -> FlowResult<Vec<Row>> {
        let mut rows = seed;
        for node in &self.nodes {
            rows = node.exec(ctx, rows)?;
            if rows.is_empty() {
                break;
            }
        }
        Ok(rows)
    }

    pub(crate) fn collect_reads(&self, reads: &mut Reads) {
        self.nodes.iter().for_each(|node| node.collect_reads(reads));
    }
}

/// Keeps left rows for which the sub-plan yields nothing.
#[derive(Debug, Clone)]
pub struct AntiJoin {
    pub left: Box<Node>,
    pub right: Plan,
    /// Registers the sub-plan reads from the left row.
    pub inputs: Vec<Register>,
}

impl AntiJoin {
    fn exec(&self, ctx: &mut EvalContext<'_>, upstream: Vec<Row>) -> FlowResult<Vec<Row>> {
        let rows = self.left.exec(ctx, upstream)?;
        let mut matched: HashMap<Vec<Option<Id>>, bool> = HashMap::new();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key = row.key(&self.inputs);
            let hit = if let Some(hit) = matched.get(&key) {
                *hit
            } else {
                let hit = !self.right.exec(ctx, vec![row.clone()])?.is_empty();
                matched.insert(key, hit);
                hit
            };
            if !hit {
                out.push(row);
            }
        }
        Ok(out)
    }
}

/// How a branch flow combines its branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchMode {
    /// First branch, in order, that yields any rows.
    Choose,
    /// Every branch's rows, concatenated.
    Union,
}

/// Choose or union over sub-plans seeded by each left row.
#[derive(Debug, Clone)]
pub struct BranchFlow {
    pub mode: BranchMode,
    pub left: Box<Node>,
    pub branches: Vec<Plan>,
    /// Registers the branches read from the left row.
    pub inputs: Vec<Register>,
    /// Registers below this offset belong to enclosing scopes and are
    /// carried back out of the branch.
    pub scope: usize,
}

impl BranchFlow {
    fn exec(&self, ctx: &mut EvalContext<'_>, upstream: Vec<Row>) -> FlowResult<Vec<Row>> {
        let rows = self.left.exec(ctx, upstream)?;
        let mut memo: Vec<HashMap<Vec<Option<Id>>, Vec<Row>>> = vec![HashMap::new(); self.branches.len()];
        let mut out = Vec::new();
        for row in rows {
            let key = row.key(&self.inputs);
            for (ix, branch) in self.branches.iter().enumerate() {
                if !memo[ix].contains_key(&key) {
                    let results = branch.exec(ctx, vec![row.clone()])?;
                    memo[ix].insert(key.clone(), results);
                }
                let results = &memo[ix][&key];
                for result in results {
                    let mut merged = row.clone();
                    merged.fill_unbound(result, self.scope);
                    out.push(merged);
                }
                if self.mode == BranchMode::Choose && !results.is_empty() {
                    break;
                }
            }
        }
        Ok(out)
    }
}

/// Joins an aggregate value back onto each row.
#[derive(Debug, Clone)]
pub struct AggregateFlow {
    pub left: Box<Node>,
    pub kind: AggregateKind,
    pub group: Vec<Register>,
    pub projection: Vec<Register>,
    pub output: Field,
}

impl AggregateFlow {
    fn exec(&self, ctx: &mut EvalContext<'_>, upstream: Vec<Row>) -> FlowResult<Vec<Row>> {
        let rows = self.left.exec(ctx, upstream)?;
        let values = aggregate::evaluate(&self.kind, &self.group, &self.projection, &rows, ctx.interner)?;
        Ok(rows
            .into_iter()
            .zip(values)
            .filter_map(|(mut row, value)| row.unify(self.output, value).then_some(row))
            .collect())
    }
}

/// Emits one fact per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertNode {
    pub e: Field,
    pub a: Field,
    pub v: Field,
    /// Identifier reported as the producing node of emitted changes.
    pub node: Id,
}

impl InsertNode {
    #[must_use]
    pub fn resolve(&self, row: &Row) -> Option<Eav> {
        Some(Eav::new(row.resolve(self.e)?, row.resolve(self.a)?, row.resolve(self.v)?))
    }
}
