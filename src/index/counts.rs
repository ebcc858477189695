//! Sparse per-round multiplicities for a single fact.

use std::collections::BTreeMap;

use crate::change::{Count, Round};

/// Non-zero multiplicity cells of one fact, keyed by round.
///
/// The multiplicity visible at round `t` is the sum of all cells at rounds
/// `<= t`; the fact is present when that sum is positive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RoundCounts {
    cells: BTreeMap<Round, i64>,
}

/// How a single cell changed under [`RoundCounts::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellChange {
    Created,
    Updated,
    Cleared,
    Unchanged,
}

impl RoundCounts {
    pub(crate) fn count_at(&self, round: Round) -> i64 {
        self.cells.range(..=round).map(|(_, count)| *count).sum()
    }

    pub(crate) fn visible_at(&self, round: Round) -> bool {
        self.count_at(round) > 0
    }

    pub(crate) fn total(&self) -> i64 {
        self.cells.values().sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn last_round(&self) -> Option<Round> {
        self.cells.keys().next_back().copied()
    }

    pub(crate) fn add(&mut self, round: Round, count: i64) -> CellChange {
        if count == 0 {
            return CellChange::Unchanged;
        }
        let cell = self.cells.entry(round).or_insert(0);
        let created = *cell == 0;
        *cell += count;
        if *cell == 0 {
            self.cells.remove(&round);
            CellChange::Cleared
        } else if created {
            CellChange::Created
        } else {
            CellChange::Updated
        }
    }

    /// Rounds at which visibility flips, with `+1` for appearing and `-1`
    /// for disappearing.
    pub(crate) fn transitions(&self) -> BTreeMap<Round, Count> {
        let mut out = BTreeMap::new();
        let mut running = 0_i64;
        let mut visible = false;
        for (round, count) in &self.cells {
            running += count;
            let now = running > 0;
            if now != visible {
                out.insert(*round, if now { 1 } else { -1 });
                visible = now;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_sums() {
        let mut counts = RoundCounts::default();
        counts.add(1, 1);
        counts.add(4, -1);
        assert_eq!(counts.count_at(0), 0);
        assert_eq!(counts.count_at(1), 1);
        assert_eq!(counts.count_at(3), 1);
        assert_eq!(counts.count_at(4), 0);
        assert!(counts.visible_at(2));
        assert!(!counts.visible_at(5));
    }

    #[test]
    fn test_cell_changes() {
        let mut counts = RoundCounts::default();
        assert_eq!(counts.add(2, 1), CellChange::Created);
        assert_eq!(counts.add(2, 1), CellChange::Updated);
        assert_eq!(counts.add(2, -2), CellChange::Cleared);
        assert_eq!(counts.add(2, 0), CellChange::Unchanged);
        assert!(counts.is_empty());
    }

    #[test]
    fn test_transitions_collapse_duplicates() {
        let mut counts = RoundCounts::default();
        counts.add(0, 1);
        counts.add(1, 1);
        counts.add(3, -1);
        counts.add(5, -1);
        let transitions: Vec<_> = counts.transitions().into_iter().collect();
        assert_eq!(transitions, vec![(0, 1), (5, -1)]);
    }

    #[test]
    fn test_negative_prefix_is_invisible() {
        let mut counts = RoundCounts::default();
        counts.add(1, -1);
        counts.add(3, 2);
        assert!(!counts.visible_at(2));
        assert!(counts.visible_at(3));
        assert_eq!(counts.total(), 1);
        assert_eq!(counts.last_round(), Some(3));
    }
}
