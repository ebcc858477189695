//! Executable dataflow nodes.
//!
//! A compiled block is a chain of nodes that turn rows of register
//! bindings into more rows. The leaves are joins over [`Scan`],
//! [`FunctionConstraint`] and [`MoveConstraint`]; the wrappers implement
//! negation, choice, union and aggregation. Everything here reads the
//! index at a single round and never writes to it.

mod aggregate;
mod block;
mod function;
mod join;
mod node;
pub mod stdlib;

use std::fmt;

use crate::change::Round;
use crate::index::Index;
use crate::interner::Interner;
use crate::value::Id;

pub use aggregate::{AggregateKind, Direction};
pub use block::{Block, BlockKind, Reads};
pub use function::{Arity, FunctionConstraint, FunctionImpl, FunctionInfo, FunctionRegistry};
pub use join::{Constraint, DownstreamJoinNode, JoinNode, MoveConstraint, Scan};
pub use node::{AggregateFlow, AntiJoin, BranchFlow, BranchMode, InsertNode, Node, Plan};

/// A slot in a row, assigned at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(usize);

impl Register {
    #[must_use]
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A constraint position: either a register or a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Register(Register),
    Value(Id),
}

impl Field {
    #[must_use]
    pub const fn register(self) -> Option<Register> {
        match self {
            Self::Register(register) => Some(register),
            Self::Value(_) => None,
        }
    }
}

/// Register bindings flowing between nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Row {
    values: Vec<Option<Id>>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, register: Register) -> Option<Id> {
        self.values.get(register.offset()).copied().flatten()
    }

    pub fn set(&mut self, register: Register, value: Id) {
        let offset = register.offset();
        if self.values.len() <= offset {
            self.values.resize(offset + 1, None);
        }
        self.values[offset] = Some(value);
    }

    /// The value of a field, if bound.
    #[must_use]
    pub fn resolve(&self, field: Field) -> Option<Id> {
        match field {
            Field::Register(register) => self.get(register),
            Field::Value(id) => Some(id),
        }
    }

    /// Bind `field` to `value`, or check it already holds `value`.
    #[must_use]
    pub fn unify(&mut self, field: Field, value: Id) -> bool {
        match field {
            Field::Value(id) => id == value,
            Field::Register(register) => match self.get(register) {
                Some(existing) => existing == value,
                None => {
                    self.set(register, value);
                    true
                }
            },
        }
    }

    /// Values of `registers`, used as memoization and grouping keys.
    #[must_use]
    pub fn key(&self, registers: &[Register]) -> Vec<Option<Id>> {
        registers.iter().map(|r| self.get(*r)).collect()
    }

    /// Copy registers below `limit` that are bound in `other` but not in
    /// `self`.
    pub(crate) fn fill_unbound(&mut self, other: &Self, limit: usize) {
        for (offset, value) in other.values.iter().enumerate().take(limit) {
            if let Some(value) = value {
                if self.get(Register::new(offset)).is_none() {
                    self.set(Register::new(offset), *value);
                }
            }
        }
    }
}

/// Everything a node needs while evaluating one round.
pub struct EvalContext<'a> {
    pub index: &'a Index,
    pub interner: &'a mut Interner,
    pub round: Round,
    /// Block name, for diagnostics.
    pub block: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_grows_on_set() {
        let mut row = Row::new();
        assert_eq!(row.get(Register::new(4)), None);
        row.set(Register::new(4), Id::new(9));
        assert_eq!(row.get(Register::new(4)), Some(Id::new(9)));
        assert_eq!(row.get(Register::new(2)), None);
    }

    #[test]
    fn test_unify_binds_or_checks() {
        let mut row = Row::new();
        let field = Field::Register(Register::new(0));
        assert!(row.unify(field, Id::new(1)));
        assert!(row.unify(field, Id::new(1)));
        assert!(!row.unify(field, Id::new(2)));
        assert!(row.unify(Field::Value(Id::new(3)), Id::new(3)));
        assert!(!row.unify(Field::Value(Id::new(3)), Id::new(4)));
    }

    #[test]
    fn test_fill_unbound() {
        let mut parent = Row::new();
        parent.set(Register::new(0), Id::new(1));
        let mut branch = Row::new();
        branch.set(Register::new(0), Id::new(7));
        branch.set(Register::new(1), Id::new(2));
        branch.set(Register::new(5), Id::new(3));
        parent.fill_unbound(&branch, 2);
        assert_eq!(parent.get(Register::new(0)), Some(Id::new(1)));
        assert_eq!(parent.get(Register::new(1)), Some(Id::new(2)));
        assert_eq!(parent.get(Register::new(5)), None);
    }
}
