//! The public entry point: a set of compiled blocks over one fact index.
//!
//! A [`Program`] owns its index, interner, function registry and blocks.
//! Nothing is shared between programs; the only way to move facts from one
//! program to another is to forward a [`DiffBatch`] with
//! [`Program::input_diffs`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::change::{Change, Eav, RawChange, Round, TransactionId};
use crate::config::ProgramConfig;
use crate::dsl::{Builder, Flow};
use crate::error::FlowResult;
use crate::index::Index;
use crate::interner::Interner;
use crate::runtime::{Block, BlockKind, FunctionInfo, FunctionRegistry};
use crate::transaction::{BlockState, Runtime, Transaction, TransactionReport};
use crate::value::{Id, RawValue};
use crate::watch::{DiffBatch, DiffStream, Exporter, ObjectBatch, RawEav};

/// Node marker recorded on changes that came from outside the program.
pub const INPUT_NODE: &str = "input";

/// A named program: blocks, the facts they run over, and their watchers.
#[derive(Debug)]
pub struct Program {
    name: String,
    config: ProgramConfig,
    interner: Interner,
    index: Index,
    functions: Arc<FunctionRegistry>,
    blocks: Vec<BlockState>,
    exporter: Exporter,
    next_transaction: TransactionId,
    input_node: Id,
}

impl Program {
    /// A program with the default configuration and the standard library.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ProgramConfig::default())
    }

    #[must_use]
    pub fn with_config(name: impl Into<String>, config: ProgramConfig) -> Self {
        let mut interner = Interner::new();
        let input_node = interner.intern_str(INPUT_NODE);
        Self {
            name: name.into(),
            exporter: Exporter::new(config.stream_capacity),
            config,
            interner,
            index: Index::new(),
            functions: Arc::new(FunctionRegistry::standard()),
            blocks: Vec::new(),
            next_transaction: 1,
            input_node,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &ProgramConfig {
        &self.config
    }

    #[must_use]
    pub const fn interner(&self) -> &Interner {
        &self.interner
    }

    #[must_use]
    pub const fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Compiled blocks, in declaration order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().map(|state| &state.block)
    }

    /// Make a function available to blocks declared from now on.
    pub fn register_function(&mut self, info: FunctionInfo) -> &mut Self {
        Arc::make_mut(&mut self.functions).register(info);
        self
    }

    /// Compile a rule block. Its records are inserted into the index.
    pub fn block(&mut self, name: &str, body: impl FnOnce(&mut Flow<'_>)) -> FlowResult<&mut Self> {
        self.install(name, BlockKind::Rule, body)?;
        Ok(self)
    }

    /// Compile a watch block. Its records are reported to the handlers and
    /// streams attached to it and never reach the index.
    pub fn watch(&mut self, name: &str, body: impl FnOnce(&mut Flow<'_>)) -> FlowResult<&mut Self> {
        self.install(name, BlockKind::Watch, body)?;
        self.exporter.declare(name);
        Ok(self)
    }

    fn install(&mut self, name: &str, kind: BlockKind, body: impl FnOnce(&mut Flow<'_>)) -> FlowResult<()> {
        let mut builder = Builder::new(name, Arc::clone(&self.functions), self.config.max_unify_rounds);
        builder.build(body);
        let id = self.block_id(name);
        let block = builder.compile(id, &mut self.interner, kind)?;
        self.blocks.push(BlockState::new(block));
        Ok(())
    }

    /// Stable id for the next block: the same program built the same way
    /// reports the same nodes on every run.
    fn block_id(&self, name: &str) -> Uuid {
        let key = format!("{}/{}/{name}", self.name, self.blocks.len());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    /// Call `handler` with every non-empty diff of the last declared watch.
    pub fn as_diffs(&mut self, handler: impl FnMut(&DiffBatch) + Send + 'static) -> FlowResult<&mut Self> {
        let watch = self.exporter.last()?.to_string();
        self.exporter.attach(&watch, Box::new(handler))?;
        Ok(self)
    }

    /// Like [`Program::as_diffs`], with facts grouped by entity and
    /// deserialized into `T`. Batches that do not fit `T` are skipped.
    pub fn as_objects<T>(&mut self, mut handler: impl FnMut(ObjectBatch<T>) + Send + 'static) -> FlowResult<&mut Self>
    where
        T: DeserializeOwned + 'static,
    {
        let watch = self.exporter.last()?.to_string();
        let name = watch.clone();
        self.exporter.attach(
            &watch,
            Box::new(move |batch: &DiffBatch| match batch.objects::<T>() {
                Ok(objects) => handler(objects),
                Err(err) => warn!(watch = %name, transaction = batch.transaction, error = %err, "skipping diff batch"),
            }),
        )?;
        Ok(self)
    }

    /// A bounded stream of the named watch block's diffs.
    pub fn subscribe(&mut self, watch: &str) -> FlowResult<DiffStream> {
        Ok(self.exporter.subscribe(watch)?)
    }

    /// Intern `eavs` into a transaction with the next free id.
    pub fn transaction(&mut self, eavs: &[RawChange]) -> Transaction {
        let id = self.next_transaction;
        Transaction::new(id, self.intern_inputs(id, eavs))
    }

    fn intern_inputs(&mut self, id: TransactionId, eavs: &[RawChange]) -> Vec<Change> {
        eavs.iter()
            .map(|eav| eav.intern(&mut self.interner, self.input_node, id))
            .collect()
    }

    /// Apply raw facts as one transaction.
    pub fn input_eavs(&mut self, eavs: &[RawChange]) -> FlowResult<TransactionReport> {
        let transaction = self.transaction(eavs);
        self.input(transaction)
    }

    /// Apply raw facts under an explicit transaction id.
    pub fn test(&mut self, id: TransactionId, eavs: &[RawChange]) -> FlowResult<TransactionReport> {
        let inputs = self.intern_inputs(id, eavs);
        self.input(Transaction::new(id, inputs))
    }

    /// Apply a diff batch from another program: adds are asserted and
    /// removes retracted, all at round 0.
    pub fn input_diffs(&mut self, batch: &DiffBatch) -> FlowResult<TransactionReport> {
        let eavs: Vec<RawChange> = batch
            .adds
            .iter()
            .map(|fact| (fact, 1))
            .chain(batch.removes.iter().map(|fact| (fact, -1)))
            .map(|((e, a, v), count)| RawChange {
                e: e.clone(),
                a: a.clone(),
                v: v.clone(),
                round: 0,
                count,
            })
            .collect();
        self.input_eavs(&eavs)
    }

    /// Run `transaction` to a fixed point, then deliver watch diffs.
    pub fn input(&mut self, transaction: Transaction) -> FlowResult<TransactionReport> {
        let id = transaction.id();
        self.next_transaction = self.next_transaction.max(id.saturating_add(1));
        let report = transaction.exec(Runtime {
            index: &mut self.index,
            interner: &mut self.interner,
            blocks: &mut self.blocks,
            config: &self.config,
        })?;
        debug!(
            program = %self.name,
            transaction = id,
            changes = report.changes.len(),
            rounds = report.rounds,
            "transaction committed"
        );
        self.export(&report);
        Ok(report)
    }

    fn export(&mut self, report: &TransactionReport) {
        for (ix, diff) in &report.exports {
            let Some(state) = self.blocks.get(*ix) else {
                continue;
            };
            let mut batch = DiffBatch {
                transaction: report.transaction,
                ..DiffBatch::default()
            };
            for (key, count) in diff {
                let Some(fact) = self.raw(key.e, key.a, key.v) else {
                    continue;
                };
                if *count > 0 {
                    batch.adds.push(fact);
                } else if *count < 0 {
                    batch.removes.push(fact);
                }
            }
            if !batch.is_empty() {
                self.exporter.deliver(state.block.name(), &batch);
            }
        }
    }

    fn raw(&self, e: Id, a: Id, v: Id) -> Option<RawEav> {
        Some((
            self.interner.reverse(e)?.clone(),
            self.interner.reverse(a)?.clone(),
            self.interner.reverse(v)?.clone(),
        ))
    }

    /// Every fact currently in the index.
    #[must_use]
    pub fn facts(&self) -> Vec<RawEav> {
        self.index
            .visible(Round::MAX)
            .into_iter()
            .filter_map(|key| self.raw(key.e, key.a, key.v))
            .collect()
    }

    /// Whether `(e, a, v)` is currently in the index.
    #[must_use]
    pub fn contains(&self, e: impl Into<RawValue>, a: impl Into<RawValue>, v: impl Into<RawValue>) -> bool {
        let (Some(e), Some(a), Some(v)) = (
            self.interner.get(&e.into()),
            self.interner.get(&a.into()),
            self.interner.get(&v.into()),
        ) else {
            return false;
        };
        self.index.contains(&Eav::new(e, a, v), Round::MAX)
    }

    /// Forget every fact. Blocks are kept and re-primed by the next
    /// transaction.
    pub fn clear(&mut self) {
        self.index = Index::new();
        for state in &mut self.blocks {
            state.ledger.clear();
            state.primed = false;
        }
    }
}
