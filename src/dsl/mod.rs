//! Block authoring.
//!
//! A block body is written against a [`Flow`]: it finds records, reads
//! their attributes, calls functions, negates and branches, and finally
//! creates records. Everything it touches is a [`Reference`], a
//! placeholder that is unified and given a register when the block is
//! compiled. Authoring mistakes are collected while the body runs and
//! reported when the block compiles.

mod compile;
mod context;
mod flow;
mod items;
mod stratify;

use std::fmt;
use std::sync::Arc;

use crate::error::CompileError;
use crate::runtime::FunctionRegistry;
use crate::value::RawValue;

pub use flow::{Branches, Flow, Gather, IntoResults, Lookup};

use context::{ContextId, ReferenceContext, ReferenceData, ScopeKind};
use items::{AggregateItem, BranchSetItem, CallItem, InsertItem, LookupItem, MoveItem, RecordItem};

/// A placeholder for a value inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference(u32);

impl Reference {
    /// Creation-order id, unique within a block.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref{}", self.0)
    }
}

/// A reference or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Ref(Reference),
    Raw(RawValue),
}

impl Value {
    #[must_use]
    pub const fn as_reference(&self) -> Option<Reference> {
        match self {
            Self::Ref(reference) => Some(*reference),
            Self::Raw(_) => None,
        }
    }
}

impl From<Reference> for Value {
    fn from(v: Reference) -> Self {
        Self::Ref(v)
    }
}

impl From<&Reference> for Value {
    fn from(v: &Reference) -> Self {
        Self::Ref(*v)
    }
}

impl From<RawValue> for Value {
    fn from(v: RawValue) -> Self {
        Self::Raw(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Raw(RawValue::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Raw(RawValue::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Raw(RawValue::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Raw(RawValue::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Raw(RawValue::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Raw(RawValue::from(v))
    }
}

/// Arena holding everything a block body creates.
#[derive(Debug)]
pub(crate) struct Builder {
    name: String,
    functions: Arc<FunctionRegistry>,
    max_unify_rounds: Option<usize>,
    contexts: Vec<ReferenceContext>,
    references: Vec<ReferenceData>,
    /// Register offsets, indexed by register slot id.
    registers: Vec<Option<usize>>,
    next_register: usize,
    records: Vec<RecordItem>,
    inserts: Vec<InsertItem>,
    lookups: Vec<LookupItem>,
    calls: Vec<CallItem>,
    aggregates: Vec<AggregateItem>,
    moves: Vec<MoveItem>,
    branch_sets: Vec<BranchSetItem>,
    errors: Vec<CompileError>,
}

impl Builder {
    pub(crate) fn new(
        name: impl Into<String>,
        functions: Arc<FunctionRegistry>,
        max_unify_rounds: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            functions,
            max_unify_rounds,
            contexts: vec![ReferenceContext::new(None, ScopeKind::Root)],
            references: Vec::new(),
            registers: Vec::new(),
            next_register: 0,
            records: Vec::new(),
            inserts: Vec::new(),
            lookups: Vec::new(),
            calls: Vec::new(),
            aggregates: Vec::new(),
            moves: Vec::new(),
            branch_sets: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) const fn root() -> ContextId {
        ContextId::ROOT
    }

    /// Run `body` against the root flow of this builder.
    pub(crate) fn build(&mut self, body: impl FnOnce(&mut Flow<'_>)) {
        let mut flow = Flow::new(self, Self::root());
        body(&mut flow);
    }

    fn error(&mut self, error: CompileError) {
        self.errors.push(error);
    }
}
