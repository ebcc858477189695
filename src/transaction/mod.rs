//! Fixed-point evaluation of one batch of input changes.
//!
//! Every block computes its output from the facts visible at round `t` and
//! that output becomes visible at `t + 1`. A transaction walks the rounds
//! upward from its earliest input, re-evaluating only the blocks whose
//! inputs or previous outputs changed at that round, and corrects each
//! block's output ledger (and, for rules, the index) to match. It stops
//! once no round beyond the current one holds any change.
//!
//! Any error rolls the index and every ledger back to where they were
//! before the transaction started.

mod journal;
mod ledger;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, trace};

use crate::change::{Change, Count, Eav, RawChange, Round, TransactionId};
use crate::config::ProgramConfig;
use crate::error::{FlowResult, RuntimeError};
use crate::index::Index;
use crate::interner::Interner;
use crate::runtime::{Block, BlockKind};
use crate::value::Id;

use journal::Journal;
pub(crate) use ledger::OutputLedger;

/// A compiled block with its evaluation state.
#[derive(Debug)]
pub(crate) struct BlockState {
    pub(crate) block: Block,
    pub(crate) ledger: OutputLedger,
    /// Whether the block has been evaluated from round 0.
    pub(crate) primed: bool,
}

impl BlockState {
    pub(crate) fn new(block: Block) -> Self {
        Self {
            block,
            ledger: OutputLedger::default(),
            primed: false,
        }
    }
}

/// What a committed transaction did.
#[derive(Debug, Clone, Default)]
pub struct TransactionReport {
    /// Transaction id.
    pub transaction: TransactionId,
    /// Net visible changes, inputs included, ordered by round then fact.
    pub changes: Vec<Change>,
    /// Last round evaluated.
    pub rounds: Round,
    /// Net output change of each watch block, by block position.
    pub(crate) exports: BTreeMap<usize, BTreeMap<Eav, i64>>,
}

impl TransactionReport {
    /// The changes with raw values. Changes whose ids are unknown to
    /// `interner` are skipped.
    #[must_use]
    pub fn raw_changes(&self, interner: &Interner) -> Vec<RawChange> {
        self.changes
            .iter()
            .filter_map(|change| change.to_raw(interner))
            .collect()
    }

    /// Whether nothing observable happened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.exports.values().all(BTreeMap::is_empty)
    }
}

/// Borrowed program state a transaction runs against.
pub(crate) struct Runtime<'a> {
    pub(crate) index: &'a mut Index,
    pub(crate) interner: &'a mut Interner,
    pub(crate) blocks: &'a mut [BlockState],
    pub(crate) config: &'a ProgramConfig,
}

/// A batch of input changes.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TransactionId,
    inputs: Vec<Change>,
}

#[derive(Default)]
struct Recorder {
    changes: BTreeMap<(Round, Eav), (Id, i64)>,
    touched: BTreeSet<Eav>,
}

impl Recorder {
    fn record(&mut self, key: Eav, node: Id, transitions: Vec<(Round, Count)>) {
        self.touched.insert(key);
        for (round, count) in transitions {
            let entry = self.changes.entry((round, key)).or_insert((node, 0));
            entry.1 += i64::from(count);
        }
    }

    fn finish(self, transaction: TransactionId) -> Vec<Change> {
        self.changes
            .into_iter()
            .filter(|(_, (_, count))| *count != 0)
            .map(|((round, key), (node, count))| {
                let count = Count::try_from(count).unwrap_or(if count < 0 { Count::MIN } else { Count::MAX });
                Change::from_key(key, node, transaction, round, count)
            })
            .collect()
    }
}

impl Transaction {
    /// A transaction over `inputs`, applied in order.
    #[must_use]
    pub fn new(id: TransactionId, inputs: Vec<Change>) -> Self {
        Self { id, inputs }
    }

    #[must_use]
    pub const fn id(&self) -> TransactionId {
        self.id
    }

    #[must_use]
    pub fn inputs(&self) -> &[Change] {
        &self.inputs
    }

    /// Run to a fixed point. On error nothing is left applied.
    pub(crate) fn exec(self, rt: Runtime<'_>) -> FlowResult<TransactionReport> {
        let mut journal = Journal::default();
        let Runtime {
            index,
            interner,
            blocks,
            config,
        } = rt;
        match self.run(index, interner, blocks, config, &mut journal) {
            Ok(report) => {
                for state in blocks.iter_mut() {
                    state.primed = true;
                }
                Ok(report)
            }
            Err(err) => {
                error!(
                    transaction = self.id,
                    writes = journal.len(),
                    error = %err,
                    "rolling back transaction"
                );
                journal.rollback(index, blocks);
                Err(err)
            }
        }
    }

    fn run(
        &self,
        index: &mut Index,
        interner: &mut Interner,
        blocks: &mut [BlockState],
        config: &ProgramConfig,
        journal: &mut Journal,
    ) -> FlowResult<TransactionReport> {
        let mut recorder = Recorder::default();
        let mut start: Option<Round> = None;
        for input in &self.inputs {
            let key = input.key();
            journal.index(key, input.round, input.count);
            recorder.record(key, input.node, index.apply(key, input.round, input.count));
            start = Some(start.map_or(input.round, |s| s.min(input.round)));
        }
        if blocks.iter().any(|state| !state.primed) {
            start = Some(0);
        }
        let Some(mut round) = start else {
            return Ok(TransactionReport {
                transaction: self.id,
                ..TransactionReport::default()
            });
        };

        let mut exports: BTreeMap<usize, BTreeMap<Eav, i64>> = BTreeMap::new();
        loop {
            if round > config.max_rounds {
                return Err(RuntimeError::RoundLimit {
                    transaction: self.id,
                    limit: config.max_rounds,
                }
                .into());
            }
            trace!(transaction = self.id, round, "evaluating round");

            for (ix, state) in blocks.iter_mut().enumerate() {
                let due = (round == 0 && !state.primed)
                    || state.block.reads().touched(index, round)
                    || state.ledger.has_round(round + 1);
                if !due {
                    continue;
                }
                let produced = state.block.exec(index, interner, round)?;
                let next = round + 1;
                for (key, node, count) in state.ledger.corrections(&produced, next) {
                    state.ledger.apply(key, node, next, count);
                    journal.ledger(ix, key, node, next, count);
                    match state.block.kind() {
                        BlockKind::Rule => {
                            journal.index(key, next, count);
                            recorder.record(key, node, index.apply(key, next, count));
                        }
                        BlockKind::Watch => {
                            *exports.entry(ix).or_default().entry(key).or_insert(0) += i64::from(count);
                        }
                    }
                }
            }

            let last = blocks
                .iter()
                .filter_map(|state| state.ledger.max_round())
                .chain(index.max_round())
                .max();
            match last {
                Some(last) if last > round => round += 1,
                _ => break,
            }
        }

        if config.distinct_check {
            index.check_distinct(&recorder.touched)?;
        }
        for diff in exports.values_mut() {
            diff.retain(|_, count| *count != 0);
        }
        Ok(TransactionReport {
            transaction: self.id,
            changes: recorder.finish(self.id),
            rounds: round,
            exports,
        })
    }
}
