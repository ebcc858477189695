//! Turning a built flow into an executable block.

use std::collections::BTreeSet;

use tracing::debug;
use uuid::Uuid;

use crate::error::{CompileError, FlowError, FlowResult};
use crate::interner::Interner;
use crate::runtime::{
    AggregateFlow, AggregateKind, AntiJoin, Block, BlockKind, BranchFlow, Constraint,
    DownstreamJoinNode, Field, FunctionConstraint, InsertNode, JoinNode, MoveConstraint, Node,
    Plan, Register, Scan,
};

use super::context::ContextId;
use super::items::AggregateSpec;
use super::stratify::Level;
use super::{Builder, Value};

fn registers(offsets: impl IntoIterator<Item = usize>) -> Vec<Register> {
    offsets.into_iter().map(Register::new).collect()
}

impl Builder {
    /// Compile the root flow and the block's inserts.
    pub(crate) fn compile(
        mut self,
        id: Uuid,
        interner: &mut Interner,
        kind: BlockKind,
    ) -> FlowResult<Block> {
        if let Some(error) = self.errors.first() {
            return Err(error.clone().into());
        }
        let root = Self::root();
        if self.context(root).items.is_empty() {
            return Err(CompileError::EmptyBlock { block: self.name }.into());
        }

        let (plan, levels, bound) = self.compile_flow(root, false, interner)?;
        let outputs = self.compile_inserts(id, &bound, interner)?;
        debug!(
            block = %self.name,
            levels,
            registers = self.next_register,
            outputs = outputs.len(),
            "compiled block"
        );
        Ok(Block::new(self.name, id, kind, plan, outputs, self.next_register, levels))
    }

    /// Compile one scope. `seeded` scopes run once per row of their parent.
    /// Returns the plan, its level count and the registers bound at its end.
    fn compile_flow(
        &mut self,
        context: ContextId,
        seeded: bool,
        interner: &mut Interner,
    ) -> FlowResult<(Plan, usize, BTreeSet<usize>)> {
        self.unify(context)?;
        self.add_moves(context);
        let levels = self.split(context)?;

        let mut bound: BTreeSet<usize> = if seeded {
            (0..self.context(context).register_start).collect()
        } else {
            BTreeSet::new()
        };
        let mut plan = Plan::default();
        for level in &levels {
            let constraints = self.constraints(context, level, interner)?;
            self.check_bound(&constraints, &mut bound)?;

            let mut node = if constraints.is_empty() {
                match plan.nodes.pop() {
                    Some(previous) => previous,
                    None if seeded => Node::DownstreamJoin(DownstreamJoinNode { constraints }),
                    None => Node::Join(JoinNode { constraints }),
                }
            } else if plan.nodes.is_empty() && !seeded {
                Node::Join(JoinNode { constraints })
            } else {
                Node::DownstreamJoin(DownstreamJoinNode { constraints })
            };

            for not in &level.nots {
                let inputs = self.input_registers(*not, &[]);
                self.require(&bound, &inputs)?;
                let (right, _, _) = self.compile_flow(*not, true, interner)?;
                node = Node::AntiJoin(AntiJoin {
                    left: Box::new(node),
                    right,
                    inputs: registers(inputs),
                });
            }

            let mut produced = Vec::new();
            for ix in &level.branch_sets {
                let set = self.branch_sets[*ix].clone();
                let required: BTreeSet<usize> = set
                    .branches
                    .iter()
                    .flat_map(|branch| self.input_registers(*branch, &set.results))
                    .collect();
                self.require(&bound, &required.into_iter().collect::<Vec<_>>())?;
                let inputs: BTreeSet<usize> = set
                    .branches
                    .iter()
                    .flat_map(|branch| self.input_registers(*branch, &[]))
                    .collect();
                let mut branches = Vec::with_capacity(set.branches.len());
                for branch in &set.branches {
                    branches.push(self.compile_flow(*branch, true, interner)?.0);
                }
                produced.extend(
                    set.results
                        .iter()
                        .filter_map(|result| self.register_of(context, &result.into())),
                );
                node = Node::Branch(BranchFlow {
                    mode: set.mode,
                    left: Box::new(node),
                    branches,
                    inputs: registers(inputs),
                    scope: self.context(context).register_end,
                });
            }

            for ix in &level.aggregates {
                let aggregate = self.aggregates[*ix].clone();
                let projection: Vec<usize> = aggregate
                    .projection
                    .iter()
                    .filter_map(|reference| self.register_of(context, &reference.into()))
                    .collect();
                let group: Vec<usize> = aggregate
                    .group
                    .iter()
                    .filter_map(|reference| self.register_of(context, &reference.into()))
                    .collect();
                self.require(&bound, &projection)?;
                self.require(&bound, &group)?;
                let kind = match &aggregate.spec {
                    AggregateSpec::Count => AggregateKind::Count,
                    AggregateSpec::Sum(value) => {
                        let field = self.field(context, value, interner)?;
                        let used: Vec<usize> = field.register().map(Register::offset).into_iter().collect();
                        self.require(&bound, &used)?;
                        AggregateKind::Sum(field)
                    }
                    AggregateSpec::Sort(directions) => AggregateKind::Sort(directions.clone()),
                };
                let output = self.field(context, &aggregate.output.into(), interner)?;
                produced.extend(output.register().map(Register::offset));
                node = Node::Aggregate(AggregateFlow {
                    left: Box::new(node),
                    kind,
                    group: registers(group),
                    projection: registers(projection),
                    output,
                });
            }

            plan.nodes.push(node);
            bound.extend(produced);
        }
        Ok((plan, levels.len(), bound))
    }

    fn constraints(
        &self,
        context: ContextId,
        level: &Level,
        interner: &mut Interner,
    ) -> FlowResult<Vec<Constraint>> {
        let mut constraints = Vec::new();
        for ix in &level.records {
            let record = &self.records[*ix];
            let e = self.field(context, &record.record.into(), interner)?;
            for (attribute, value) in &record.attributes {
                constraints.push(Constraint::Scan(Scan {
                    e,
                    a: self.field(context, attribute, interner)?,
                    v: self.field(context, value, interner)?,
                }));
            }
        }
        for ix in &level.lookups {
            let lookup = &self.lookups[*ix];
            constraints.push(Constraint::Scan(Scan {
                e: self.field(context, &lookup.record, interner)?,
                a: self.field(context, &lookup.attribute.into(), interner)?,
                v: self.field(context, &lookup.value.into(), interner)?,
            }));
        }
        for ix in &level.calls {
            let call = &self.calls[*ix];
            let args = call
                .args
                .iter()
                .map(|arg| self.field(context, arg, interner))
                .collect::<FlowResult<Vec<_>>>()?;
            let output = match call.output {
                Some(output) => Some(self.field(context, &output.into(), interner)?),
                None => None,
            };
            constraints.push(Constraint::Function(FunctionConstraint {
                info: call.info.clone(),
                args,
                output,
            }));
        }
        for ix in &level.moves {
            let mv = &self.moves[*ix];
            let owner = self.owner_context(mv.to);
            constraints.push(Constraint::Move(MoveConstraint {
                from: self.field(context, &mv.from, interner)?,
                to: self.field(owner, &Value::Ref(mv.to), interner)?,
            }));
        }
        Ok(constraints)
    }

    /// Walk the constraints the way a join would, binding registers as
    /// each becomes solvable.
    fn check_bound(&self, constraints: &[Constraint], bound: &mut BTreeSet<usize>) -> FlowResult<()> {
        let mut pending: Vec<&Constraint> = constraints.iter().collect();
        loop {
            let before = pending.len();
            let mut waiting = Vec::with_capacity(pending.len());
            for constraint in pending {
                match constraint {
                    Constraint::Scan(scan) => bound.extend(scan.registers().map(Register::offset)),
                    Constraint::Function(function) => {
                        if function.input_registers().all(|r| bound.contains(&r.offset())) {
                            bound.extend(function.output.and_then(Field::register).map(Register::offset));
                        } else {
                            waiting.push(constraint);
                        }
                    }
                    Constraint::Move(mv) => match mv.from.register() {
                        Some(from) if !bound.contains(&from.offset()) => waiting.push(constraint),
                        _ => bound.extend(mv.to.register().map(Register::offset)),
                    },
                }
            }
            pending = waiting;
            if pending.is_empty() {
                return Ok(());
            }
            if pending.len() == before {
                break;
            }
        }

        let register = pending
            .iter()
            .flat_map(|constraint| match constraint {
                Constraint::Function(function) => function.input_registers().collect::<Vec<_>>(),
                Constraint::Move(mv) => mv.from.register().into_iter().collect(),
                Constraint::Scan(_) => Vec::new(),
            })
            .find(|r| !bound.contains(&r.offset()))
            .map_or(0, Register::offset);
        Err(self.unbound(register))
    }

    fn require(&self, bound: &BTreeSet<usize>, registers: &[usize]) -> FlowResult<()> {
        match registers.iter().find(|r| !bound.contains(r)) {
            Some(register) => Err(self.unbound(*register)),
            None => Ok(()),
        }
    }

    fn unbound(&self, register: usize) -> FlowError {
        CompileError::UnboundVariable {
            block: self.name.clone(),
            register,
        }
        .into()
    }

    fn compile_inserts(
        &self,
        block: Uuid,
        bound: &BTreeSet<usize>,
        interner: &mut Interner,
    ) -> FlowResult<Vec<InsertNode>> {
        let root = Self::root();
        let mut outputs = Vec::new();
        for (ix, insert) in self.inserts.iter().enumerate() {
            let e = self.field(root, &insert.record.into(), interner)?;
            for (position, (attribute, value)) in insert.attributes.iter().enumerate() {
                let a = self.field(root, attribute, interner)?;
                let v = self.field(root, value, interner)?;
                let used: Vec<usize> = [e, a, v]
                    .iter()
                    .filter_map(|field| field.register().map(Register::offset))
                    .collect();
                self.require(bound, &used)?;
                let name = Uuid::new_v5(&block, format!("insert/{ix}/{position}").as_bytes());
                outputs.push(InsertNode {
                    e,
                    a,
                    v,
                    node: interner.intern_str(&name.to_string()),
                });
            }
        }
        Ok(outputs)
    }
}
