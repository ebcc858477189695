//! # factflow - incremental queries over entity/attribute/value facts
//!
//! A [`Program`] holds facts as `(entity, attribute, value)` triples and a
//! set of blocks: small rules that find records, compute over them and
//! create new records. Every transaction of input changes is pushed through
//! the blocks until nothing new follows, and only the net change is
//! reported. Rules may be recursive, negated, prioritised or aggregated.
//!
//! ## Core Concepts
//!
//! - **Fact**: an `(e, a, v)` triple with a signed multiplicity per round
//! - **Block**: a compiled rule, written against a [`Flow`]
//! - **Watch**: a block whose output is reported as [`DiffBatch`]es instead
//!   of being written back
//!
//! ## Usage
//!
//! ```rust,ignore
//! use factflow::{eav, Program};
//!
//! let mut program = Program::new("people");
//! program.block("dog-less people are tagged", |f| {
//!     let person = f.find(&["person"]);
//!     let info = f.choose(|b| {
//!         b.branch(|f| {
//!             f.attr(person, "dog");
//!             "cool"
//!         })
//!         .branch(|_| "not cool");
//!     });
//!     f.record_with(&["dog-less"], [("info", info[0])]);
//! })?;
//! let report = program.input_eavs(&[eav(1, "tag", "person")])?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Facts and their storage
pub mod change;
pub mod error;
pub mod index;
pub mod interner;
pub mod value;

// Compilation and evaluation
pub mod dsl;
pub mod runtime;
pub mod transaction;

// Program surface
pub mod config;
pub mod program;
pub mod watch;

pub use change::{eav, eavrc, Change, Count, Eav, RawChange, Round, TransactionId};
pub use config::ProgramConfig;
pub use dsl::{Branches, Flow, Gather, IntoResults, Lookup, Reference, Value};
pub use error::{CompileError, FlowError, FlowResult, RuntimeError};
pub use index::Index;
pub use interner::Interner;
pub use program::Program;
pub use runtime::{Arity, Block, BlockKind, Direction, FunctionInfo, FunctionRegistry};
pub use transaction::{Transaction, TransactionReport};
pub use value::{Id, RawValue};
pub use watch::{DiffBatch, DiffHandler, DiffStream, ObjectBatch, RawEav};
