//! Undo log for an in-flight transaction.

use crate::change::{Count, Eav, Round};
use crate::index::Index;
use crate::value::Id;

use super::BlockState;

#[derive(Debug, Clone, Copy)]
enum Entry {
    Index {
        key: Eav,
        round: Round,
        count: Count,
    },
    Ledger {
        block: usize,
        key: Eav,
        node: Id,
        round: Round,
        count: Count,
    },
}

/// Everything a transaction wrote, so it can be reverted.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<Entry>,
}

impl Journal {
    pub(crate) fn index(&mut self, key: Eav, round: Round, count: Count) {
        self.entries.push(Entry::Index { key, round, count });
    }

    pub(crate) fn ledger(&mut self, block: usize, key: Eav, node: Id, round: Round, count: Count) {
        self.entries.push(Entry::Ledger {
            block,
            key,
            node,
            round,
            count,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Revert every recorded write, newest first.
    pub(crate) fn rollback(self, index: &mut Index, blocks: &mut [BlockState]) {
        for entry in self.entries.into_iter().rev() {
            match entry {
                Entry::Index { key, round, count } => {
                    index.apply(key, round, -count);
                }
                Entry::Ledger {
                    block,
                    key,
                    node,
                    round,
                    count,
                } => {
                    if let Some(state) = blocks.get_mut(block) {
                        state.ledger.apply(key, node, round, -count);
                    }
                }
            }
        }
    }
}
