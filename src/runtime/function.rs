//! Pure functions callable from blocks.

use std::collections::BTreeMap;

use crate::error::{FlowError, FlowResult};
use crate::value::RawValue;

use super::{EvalContext, Field, Register, Row};

/// How a function evaluates its arguments.
#[derive(Debug, Clone, Copy)]
pub enum FunctionImpl {
    /// Keeps or drops the row; produces no value.
    Filter(fn(&[RawValue]) -> bool),
    /// Produces one value, or `None` to drop the row.
    Map(fn(&[RawValue]) -> Option<RawValue>),
}

/// Accepted argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

/// A named function with its arity and implementation.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub arity: Arity,
    pub implementation: FunctionImpl,
}

impl FunctionInfo {
    pub fn filter(name: impl Into<String>, arity: Arity, f: fn(&[RawValue]) -> bool) -> Self {
        Self {
            name: name.into(),
            arity,
            implementation: FunctionImpl::Filter(f),
        }
    }

    pub fn map(
        name: impl Into<String>,
        arity: Arity,
        f: fn(&[RawValue]) -> Option<RawValue>,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            implementation: FunctionImpl::Map(f),
        }
    }

    #[must_use]
    pub const fn is_filter(&self) -> bool {
        matches!(self.implementation, FunctionImpl::Filter(_))
    }
}

/// Registry of functions available to a program.
///
/// A program owns its registry; there is no global table.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionInfo>,
}

impl FunctionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard library.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        super::stdlib::install(&mut registry);
        registry
    }

    /// Add or replace a function.
    pub fn register(&mut self, info: FunctionInfo) -> &mut Self {
        self.functions.insert(info.name.clone(), info);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// A function applied to row registers.
#[derive(Debug, Clone)]
pub struct FunctionConstraint {
    pub info: FunctionInfo,
    pub args: Vec<Field>,
    /// `None` for filters.
    pub output: Option<Field>,
}

impl FunctionConstraint {
    pub(crate) fn is_ready(&self, row: &Row) -> bool {
        self.args.iter().all(|field| row.resolve(*field).is_some())
    }

    pub(crate) fn input_registers(&self) -> impl Iterator<Item = Register> + '_ {
        self.args.iter().filter_map(|field| field.register())
    }

    /// Apply to one row. `Ok(None)` drops the row.
    pub(crate) fn apply(&self, ctx: &mut EvalContext<'_>, row: &Row) -> FlowResult<Option<Row>> {
        let mut raw = Vec::with_capacity(self.args.len());
        for field in &self.args {
            let id = row.resolve(*field).ok_or_else(|| {
                FlowError::internal(format!("argument of '{}' is unbound", self.info.name))
            })?;
            let value = ctx
                .interner
                .reverse(id)
                .ok_or_else(|| FlowError::internal(format!("unknown value id {id}")))?;
            raw.push(value.clone());
        }

        match self.info.implementation {
            FunctionImpl::Filter(f) => Ok(f(&raw).then(|| row.clone())),
            FunctionImpl::Map(f) => {
                let Some(result) = f(&raw) else {
                    return Ok(None);
                };
                let id = ctx.interner.intern(&result);
                let mut out = row.clone();
                match self.output {
                    Some(field) => Ok(out.unify(field, id).then_some(out)),
                    None => Ok(Some(out)),
                }
            }
        }
    }
}
