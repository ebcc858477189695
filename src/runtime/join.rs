//! Constraint joins.
//!
//! A join extends a row by repeatedly picking a constraint that is ready
//! to run. Scans are always ready; functions wait for all their arguments
//! and moves for their source. Among ready constraints, cheap ones
//! (functions, moves) go first, then the scan with the most bound fields.
//! The result is the same set of rows whatever order is chosen.

use crate::error::{FlowResult, RuntimeError};
use crate::value::Id;

use super::function::FunctionConstraint;
use super::{EvalContext, Field, Register, Row};

/// Pattern match against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub e: Field,
    pub a: Field,
    pub v: Field,
}

impl Scan {
    /// The attribute this scan is restricted to, if constant.
    #[must_use]
    pub const fn attribute(&self) -> Option<Id> {
        match self.a {
            Field::Value(id) => Some(id),
            Field::Register(_) => None,
        }
    }

    pub(crate) fn registers(&self) -> impl Iterator<Item = Register> {
        [self.e, self.a, self.v].into_iter().filter_map(Field::register)
    }

    fn bound(&self, row: &Row) -> usize {
        [self.e, self.a, self.v]
            .into_iter()
            .filter(|field| row.resolve(*field).is_some())
            .count()
    }

    fn propose(&self, ctx: &EvalContext<'_>, row: &Row) -> Vec<Row> {
        let matches = ctx.index.scan(
            row.resolve(self.e),
            row.resolve(self.a),
            row.resolve(self.v),
            ctx.round,
        );
        matches
            .into_iter()
            .filter_map(|key| {
                let mut out = row.clone();
                (out.unify(self.e, key.e) && out.unify(self.a, key.a) && out.unify(self.v, key.v))
                    .then_some(out)
            })
            .collect()
    }
}

/// Copy a value into a register, or check it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveConstraint {
    pub from: Field,
    pub to: Field,
}

impl MoveConstraint {
    fn apply(&self, row: &Row) -> Option<Row> {
        let value = row.resolve(self.from)?;
        let mut out = row.clone();
        out.unify(self.to, value).then_some(out)
    }
}

/// Anything a join can solve.
#[derive(Debug, Clone)]
pub enum Constraint {
    Scan(Scan),
    Function(FunctionConstraint),
    Move(MoveConstraint),
}

impl Constraint {
    fn is_ready(&self, row: &Row) -> bool {
        match self {
            Self::Scan(_) => true,
            Self::Function(function) => function.is_ready(row),
            Self::Move(mv) => row.resolve(mv.from).is_some(),
        }
    }

    fn apply(&self, ctx: &mut EvalContext<'_>, row: &Row) -> FlowResult<Vec<Row>> {
        match self {
            Self::Scan(scan) => Ok(scan.propose(ctx, row)),
            Self::Function(function) => Ok(function.apply(ctx, row)?.into_iter().collect()),
            Self::Move(mv) => Ok(mv.apply(row).into_iter().collect()),
        }
    }
}

fn pick(constraints: &[Constraint], pending: &[usize], row: &Row) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (position, ix) in pending.iter().enumerate() {
        let constraint = &constraints[*ix];
        if !constraint.is_ready(row) {
            continue;
        }
        let score = match constraint {
            Constraint::Function(_) | Constraint::Move(_) => 4,
            Constraint::Scan(scan) => scan.bound(row),
        };
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((position, score));
        }
    }
    best.map(|(position, _)| position)
}

fn solve(
    constraints: &[Constraint],
    ctx: &mut EvalContext<'_>,
    row: Row,
    pending: &mut Vec<usize>,
    out: &mut Vec<Row>,
) -> FlowResult<()> {
    if pending.is_empty() {
        out.push(row);
        return Ok(());
    }
    let position = pick(constraints, pending, &row).ok_or_else(|| RuntimeError::JoinStalled {
        block: ctx.block.to_string(),
    })?;
    let ix = pending.remove(position);
    let result = constraints[ix].apply(ctx, &row).and_then(|rows| {
        rows.into_iter()
            .try_for_each(|next| solve(constraints, ctx, next, pending, out))
    });
    pending.insert(position, ix);
    result
}

fn join_rows(
    constraints: &[Constraint],
    ctx: &mut EvalContext<'_>,
    seeds: Vec<Row>,
) -> FlowResult<Vec<Row>> {
    let mut out = Vec::new();
    let mut pending: Vec<usize> = (0..constraints.len()).collect();
    for seed in seeds {
        solve(constraints, ctx, seed, &mut pending, &mut out)?;
    }
    Ok(out)
}

/// The first join of a block; starts from an empty row.
#[derive(Debug, Clone)]
pub struct JoinNode {
    pub constraints: Vec<Constraint>,
}

impl JoinNode {
    pub(crate) fn exec(&self, ctx: &mut EvalContext<'_>) -> FlowResult<Vec<Row>> {
        join_rows(&self.constraints, ctx, vec![Row::new()])
    }
}

/// A join that extends each upstream row.
#[derive(Debug, Clone)]
pub struct DownstreamJoinNode {
    pub constraints: Vec<Constraint>,
}

impl DownstreamJoinNode {
    pub(crate) fn exec(&self, ctx: &mut EvalContext<'_>, upstream: Vec<Row>) -> FlowResult<Vec<Row>> {
        join_rows(&self.constraints, ctx, upstream)
    }
}
