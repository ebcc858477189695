//! Scopes, unification and register assignment.
//!
//! Every flow (the block root, each `not`, each choose/union branch) has a
//! [`ReferenceContext`]. A reference belongs to the scope that created it
//! and may be used by any scope nested below. Unification runs per scope,
//! parent first: equalities collapse references onto a shared register or
//! a literal, and a nested scope that pins an outer reference to a
//! different value gets a move back into the outer register.

use std::collections::{BTreeSet, HashMap};

use crate::error::{CompileError, FlowError, FlowResult};
use crate::interner::Interner;
use crate::runtime::{Field, Register};
use crate::value::RawValue;

use super::items::{Collector, MoveItem};
use super::{Builder, Reference, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ContextId(usize);

impl ContextId {
    pub(crate) const ROOT: Self = Self(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Root,
    Not,
    Branch,
}

/// What created a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    Record(usize),
    Insert(usize),
    Call,
    Aggregate,
    Free,
}

#[derive(Debug, Clone)]
pub(crate) struct ReferenceData {
    pub(crate) context: ContextId,
    pub(crate) owner: Owner,
}

/// Identity of a register before it has an offset. References unified
/// together share one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RegisterSlot(usize);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Register(RegisterSlot),
    Raw(RawValue),
}

#[derive(Debug)]
pub(crate) struct ReferenceContext {
    pub(crate) parent: Option<ContextId>,
    pub(crate) kind: ScopeKind,
    pub(crate) references: BTreeSet<Reference>,
    pub(crate) equalities: Vec<(Value, Value)>,
    values: HashMap<Reference, Slot>,
    pub(crate) items: Collector,
    pub(crate) register_start: usize,
    pub(crate) register_end: usize,
}

impl ReferenceContext {
    pub(crate) fn new(parent: Option<ContextId>, kind: ScopeKind) -> Self {
        Self {
            parent,
            kind,
            references: BTreeSet::new(),
            equalities: Vec::new(),
            values: HashMap::new(),
            items: Collector::default(),
            register_start: 0,
            register_end: 0,
        }
    }
}

impl Builder {
    pub(crate) fn context(&self, id: ContextId) -> &ReferenceContext {
        &self.contexts[id.0]
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> &mut ReferenceContext {
        &mut self.contexts[id.0]
    }

    pub(crate) fn new_context(&mut self, parent: ContextId, kind: ScopeKind) -> ContextId {
        self.contexts.push(ReferenceContext::new(Some(parent), kind));
        ContextId(self.contexts.len() - 1)
    }

    pub(crate) fn new_reference(&mut self, context: ContextId, owner: Owner) -> Reference {
        let reference = Reference(u32::try_from(self.references.len()).unwrap_or(u32::MAX));
        self.references.push(ReferenceData { context, owner });
        self.context_mut(context).references.insert(reference);
        reference
    }

    pub(crate) fn owner(&self, reference: Reference) -> Owner {
        self.references[reference.index()].owner
    }

    pub(crate) fn owner_context(&self, reference: Reference) -> ContextId {
        self.references[reference.index()].context
    }

    pub(crate) fn owns(&self, context: ContextId, reference: Reference) -> bool {
        self.owner_context(reference) == context
    }

    /// Make `reference` usable in `context`, registering it in every scope
    /// between `context` and its owner.
    pub(crate) fn register(&mut self, context: ContextId, reference: Reference) {
        let owner = self.owner_context(reference);
        let mut chain = vec![context];
        let mut current = context;
        while current != owner {
            match self.context(current).parent {
                Some(parent) => {
                    current = parent;
                    if current != owner {
                        chain.push(current);
                    }
                }
                None => {
                    self.error(CompileError::UnownedReference {
                        reference: reference.id(),
                    });
                    return;
                }
            }
        }
        for scope in chain {
            self.context_mut(scope).references.insert(reference);
        }
    }

    pub(crate) fn register_value(&mut self, context: ContextId, value: &Value) {
        if let Value::Ref(reference) = value {
            self.register(context, *reference);
        }
    }

    pub(crate) fn equality(&mut self, context: ContextId, a: Value, b: Value) {
        self.register_value(context, &a);
        self.register_value(context, &b);
        self.context_mut(context).equalities.push((a, b));
    }

    /// The value of `reference` as seen from `context`, falling back to
    /// outer scopes for references this scope does not own.
    pub(crate) fn slot(&self, context: ContextId, reference: Reference) -> Option<Slot> {
        let mut current = context;
        loop {
            let scope = self.context(current);
            if let Some(slot) = scope.values.get(&reference) {
                return Some(slot.clone());
            }
            if self.owns(current, reference) {
                return None;
            }
            current = scope.parent?;
        }
    }

    fn slot_or_generate(&mut self, context: ContextId, reference: Reference) -> FlowResult<Slot> {
        if let Some(slot) = self.slot(context, reference) {
            return Ok(slot);
        }
        if !self.owns(context, reference) {
            return Err(FlowError::internal(format!(
                "{reference} has no value in its owning scope"
            )));
        }
        self.registers.push(None);
        let slot = Slot::Register(RegisterSlot(self.registers.len() - 1));
        self.context_mut(context).values.insert(reference, slot.clone());
        Ok(slot)
    }

    fn value_slot(&mut self, context: ContextId, value: &Value) -> FlowResult<Slot> {
        match value {
            Value::Ref(reference) => self.slot_or_generate(context, *reference),
            Value::Raw(raw) => Ok(Slot::Raw(raw.clone())),
        }
    }

    /// Which of two references is the source of truth: one owned by an
    /// outer scope if any, otherwise the later one.
    fn select_reference(&self, context: ContextId, a: Reference, b: Reference) -> Reference {
        match (self.owns(context, a), self.owns(context, b)) {
            (false, true) => a,
            (true, false) => b,
            _ => a.max(b),
        }
    }

    /// Resolve this scope's equalities to a fixed point, then assign
    /// registers to every slot still unassigned.
    pub(crate) fn unify(&mut self, context: ContextId) -> FlowResult<()> {
        let references: Vec<Reference> = self.context(context).references.iter().copied().collect();
        for reference in &references {
            self.slot_or_generate(context, *reference)?;
        }

        let equalities = self.context(context).equalities.clone();
        let max_rounds = self
            .max_unify_rounds
            .unwrap_or_else(|| (equalities.len() + 1).pow(2));
        let mut changed = !equalities.is_empty();
        let mut round = 0;
        while changed {
            if round >= max_rounds {
                return Err(CompileError::UnifyDiverged { rounds: round }.into());
            }
            round += 1;
            changed = false;
            for (a, b) in &equalities {
                let a_slot = self.value_slot(context, a)?;
                let b_slot = self.value_slot(context, b)?;
                if a_slot == b_slot {
                    continue;
                }
                let (loser, winner) = match (&a_slot, &b_slot) {
                    (Slot::Raw(left), Slot::Raw(right)) => {
                        return Err(CompileError::DisparateValues {
                            left: left.clone(),
                            right: right.clone(),
                        }
                        .into());
                    }
                    (Slot::Raw(_), Slot::Register(_)) => (b_slot, a_slot),
                    (Slot::Register(_), Slot::Raw(_)) => (a_slot, b_slot),
                    (Slot::Register(_), Slot::Register(_)) => {
                        let (Value::Ref(ra), Value::Ref(rb)) = (a, b) else {
                            return Err(FlowError::internal("register slot on a literal"));
                        };
                        if self.select_reference(context, *ra, *rb) == *rb {
                            (a_slot, b_slot)
                        } else {
                            (b_slot, a_slot)
                        }
                    }
                };
                self.merge_slot(context, &references, &loser, &winner);
                changed = true;
            }
        }

        self.assign_registers(context, &references)
    }

    /// Point every reference of `context` that currently resolves to
    /// `loser` at `winner`, so a whole equivalence class moves at once.
    fn merge_slot(&mut self, context: ContextId, references: &[Reference], loser: &Slot, winner: &Slot) {
        for reference in references {
            if self.slot(context, *reference).as_ref() == Some(loser) {
                self.context_mut(context).values.insert(*reference, winner.clone());
            }
        }
    }

    fn assign_registers(&mut self, context: ContextId, references: &[Reference]) -> FlowResult<()> {
        let start = self.next_register;
        for reference in references {
            if let Some(Slot::Register(RegisterSlot(slot))) = self.slot(context, *reference) {
                if self.registers[slot].is_none() {
                    self.registers[slot] = Some(self.next_register);
                    self.next_register += 1;
                }
            }
        }
        let end = self.next_register;
        let scope = self.context_mut(context);
        scope.register_start = start;
        scope.register_end = end;
        Ok(())
    }

    /// Moves for outer references this scope pinned to a different value.
    pub(crate) fn add_moves(&mut self, context: ContextId) {
        let references: Vec<Reference> = self.context(context).references.iter().copied().collect();
        for reference in references {
            if self.owns(context, reference) {
                continue;
            }
            let local = self.slot(context, reference);
            let outer = self.slot(self.owner_context(reference), reference);
            if local != outer {
                self.push_move(context, Value::Ref(reference), reference);
            }
        }
    }

    pub(crate) fn push_move(&mut self, context: ContextId, from: Value, to: Reference) {
        let ix = self.moves.len();
        self.moves.push(MoveItem { context, from, to });
        self.context_mut(context).items.moves.push(ix);
    }

    /// Register offset of `value` in `context`, if it is held in a register.
    pub(crate) fn register_of(&self, context: ContextId, value: &Value) -> Option<usize> {
        let Value::Ref(reference) = value else {
            return None;
        };
        match self.slot(context, *reference)? {
            Slot::Register(RegisterSlot(slot)) => self.registers[slot],
            Slot::Raw(_) => None,
        }
    }

    /// The runtime field for `value` in `context`.
    pub(crate) fn field(
        &self,
        context: ContextId,
        value: &Value,
        interner: &mut Interner,
    ) -> FlowResult<Field> {
        match value {
            Value::Raw(raw) => Ok(Field::Value(interner.intern(raw))),
            Value::Ref(reference) => match self.slot(context, *reference) {
                Some(Slot::Raw(raw)) => Ok(Field::Value(interner.intern(&raw))),
                Some(Slot::Register(RegisterSlot(slot))) => self.registers[slot]
                    .map(|offset| Field::Register(Register::new(offset)))
                    .ok_or_else(|| FlowError::internal(format!("{reference} has no register"))),
                None => Err(FlowError::internal(format!(
                    "{reference} was never unified"
                ))),
            },
        }
    }

    /// Registers, in the parent's view, of outer references used by the
    /// nested scope `child`.
    pub(crate) fn input_registers(&self, child: ContextId, exclude: &[Reference]) -> Vec<usize> {
        let Some(parent) = self.context(child).parent else {
            return Vec::new();
        };
        let inputs: BTreeSet<usize> = self
            .context(child)
            .references
            .iter()
            .filter(|reference| !self.owns(child, **reference) && !exclude.contains(reference))
            .filter_map(|reference| self.register_of(parent, &Value::Ref(*reference)))
            .collect();
        inputs.into_iter().collect()
    }
}
