//! What each block has emitted, per round.

use std::collections::BTreeMap;

use crate::change::{Count, Eav, Round};
use crate::index::{CellChange, RoundCounts};
use crate::value::Id;

#[derive(Debug, Clone)]
struct Entry {
    node: Id,
    counts: RoundCounts,
}

/// A block's output multiplicities. A fact is in the block's output at
/// round `t` when its summed cells up to `t` are positive.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputLedger {
    entries: BTreeMap<Eav, Entry>,
    rounds: BTreeMap<Round, usize>,
}

impl OutputLedger {
    pub(crate) fn count_at(&self, key: &Eav, round: Round) -> i64 {
        self.entries.get(key).map_or(0, |entry| entry.counts.count_at(round))
    }

    pub(crate) fn has_round(&self, round: Round) -> bool {
        self.rounds.contains_key(&round)
    }

    pub(crate) fn max_round(&self) -> Option<Round> {
        self.rounds.keys().next_back().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn apply(&mut self, key: Eav, node: Id, round: Round, count: Count) {
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            node,
            counts: RoundCounts::default(),
        });
        match entry.counts.add(round, i64::from(count)) {
            CellChange::Created => *self.rounds.entry(round).or_insert(0) += 1,
            CellChange::Cleared => {
                if let Some(n) = self.rounds.get_mut(&round) {
                    *n -= 1;
                    if *n == 0 {
                        self.rounds.remove(&round);
                    }
                }
            }
            CellChange::Updated | CellChange::Unchanged => {}
        }
        if entry.counts.is_empty() {
            self.entries.remove(&key);
        }
    }

    /// Corrections that make the output at `round` equal `produced`.
    pub(crate) fn corrections(
        &self,
        produced: &BTreeMap<Eav, Id>,
        round: Round,
    ) -> Vec<(Eav, Id, Count)> {
        let mut out = Vec::new();
        for (key, node) in produced {
            let current = self.count_at(key, round);
            if current != 1 {
                out.push((*key, *node, clamp(1 - current)));
            }
        }
        for (key, entry) in &self.entries {
            if produced.contains_key(key) {
                continue;
            }
            let current = entry.counts.count_at(round);
            if current != 0 {
                out.push((*key, entry.node, clamp(-current)));
            }
        }
        out
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.rounds.clear();
    }
}

fn clamp(count: i64) -> Count {
    Count::try_from(count).unwrap_or(if count < 0 { Count::MIN } else { Count::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u32) -> Eav {
        Eav::new(Id::new(n), Id::new(100), Id::new(200))
    }

    #[test]
    fn test_corrections_add_and_remove() {
        let node = Id::new(7);
        let mut ledger = OutputLedger::default();
        ledger.apply(key(1), node, 1, 1);

        let produced: BTreeMap<Eav, Id> = [(key(2), node)].into_iter().collect();
        let mut corrections = ledger.corrections(&produced, 1);
        corrections.sort();
        assert_eq!(corrections, vec![(key(1), node, -1), (key(2), node, 1)]);
    }

    #[test]
    fn test_later_cells_are_counted() {
        let node = Id::new(7);
        let mut ledger = OutputLedger::default();
        ledger.apply(key(1), node, 1, 1);
        ledger.apply(key(1), node, 3, -1);
        assert!(ledger.has_round(3));
        assert_eq!(ledger.max_round(), Some(3));

        // Present again at round 3 means the -1 cell must be cancelled.
        let produced: BTreeMap<Eav, Id> = [(key(1), node)].into_iter().collect();
        assert_eq!(ledger.corrections(&produced, 3), vec![(key(1), node, 1)]);
        ledger.apply(key(1), node, 3, 1);
        assert!(!ledger.has_round(3));
        assert_eq!(ledger.len(), 1);
    }
}
