//! Round-aware fact index.
//!
//! Stores the multiplicity of every `(e, a, v)` fact per round and answers
//! pattern scans against the state visible at a given round. Access paths
//! are `e -> a -> v` and `a -> v -> e`; both are ordered so scans are
//! deterministic.

mod counts;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::change::{Count, Eav, Round};
use crate::error::RuntimeError;
use crate::value::Id;

pub(crate) use counts::{CellChange, RoundCounts};

type Nested = BTreeMap<Id, BTreeMap<Id, BTreeSet<Id>>>;

/// Multiplicity index over facts.
#[derive(Debug, Clone, Default)]
pub struct Index {
    facts: HashMap<Eav, RoundCounts>,
    by_entity: Nested,
    by_attribute: Nested,
    /// round -> attribute -> number of non-zero cells
    round_cells: BTreeMap<Round, HashMap<Id, usize>>,
}

fn nested_insert(map: &mut Nested, first: Id, second: Id, third: Id) {
    map.entry(first)
        .or_default()
        .entry(second)
        .or_default()
        .insert(third);
}

fn nested_remove(map: &mut Nested, first: Id, second: Id, third: Id) {
    if let Some(inner) = map.get_mut(&first) {
        if let Some(set) = inner.get_mut(&second) {
            set.remove(&third);
            if set.is_empty() {
                inner.remove(&second);
            }
        }
        if inner.is_empty() {
            map.remove(&first);
        }
    }
}

impl Index {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to the multiplicity of `key` at `round`.
    ///
    /// Returns the visibility transitions this caused, as `(round, ±1)`
    /// pairs ordered by round.
    pub fn apply(&mut self, key: Eav, round: Round, count: Count) -> Vec<(Round, Count)> {
        if count == 0 {
            return Vec::new();
        }
        let counts = self.facts.entry(key).or_default();
        let was_empty = counts.is_empty();
        let before = counts.transitions();
        let cell = counts.add(round, i64::from(count));
        let after = counts.transitions();
        let now_empty = counts.is_empty();

        if now_empty {
            self.facts.remove(&key);
        }
        if was_empty && !now_empty {
            nested_insert(&mut self.by_entity, key.e, key.a, key.v);
            nested_insert(&mut self.by_attribute, key.a, key.v, key.e);
        } else if !was_empty && now_empty {
            nested_remove(&mut self.by_entity, key.e, key.a, key.v);
            nested_remove(&mut self.by_attribute, key.a, key.v, key.e);
        }

        match cell {
            CellChange::Created => {
                *self
                    .round_cells
                    .entry(round)
                    .or_default()
                    .entry(key.a)
                    .or_insert(0) += 1;
            }
            CellChange::Cleared => self.release_cell(round, key.a),
            CellChange::Updated | CellChange::Unchanged => {}
        }

        let mut delta: BTreeMap<Round, Count> = after;
        for (r, c) in before {
            *delta.entry(r).or_insert(0) -= c;
        }
        delta.into_iter().filter(|(_, c)| *c != 0).collect()
    }

    fn release_cell(&mut self, round: Round, attribute: Id) {
        if let Some(attributes) = self.round_cells.get_mut(&round) {
            if let Some(n) = attributes.get_mut(&attribute) {
                *n -= 1;
                if *n == 0 {
                    attributes.remove(&attribute);
                }
            }
            if attributes.is_empty() {
                self.round_cells.remove(&round);
            }
        }
    }

    /// Summed multiplicity of `key` up to and including `round`.
    #[must_use]
    pub fn count_at(&self, key: &Eav, round: Round) -> i64 {
        self.facts.get(key).map_or(0, |counts| counts.count_at(round))
    }

    /// Whether `key` is visible at `round`.
    #[must_use]
    pub fn contains(&self, key: &Eav, round: Round) -> bool {
        self.facts
            .get(key)
            .is_some_and(|counts| counts.visible_at(round))
    }

    /// All facts visible at `round` matching the given pattern. `None`
    /// positions are wildcards.
    #[must_use]
    pub fn scan(&self, e: Option<Id>, a: Option<Id>, v: Option<Id>, round: Round) -> Vec<Eav> {
        let mut out = Vec::new();
        let mut push = |key: Eav| {
            if self.contains(&key, round) {
                out.push(key);
            }
        };
        match (e, a, v) {
            (Some(e), Some(a), Some(v)) => push(Eav::new(e, a, v)),
            (Some(e), Some(a), None) => {
                if let Some(values) = self.by_entity.get(&e).and_then(|m| m.get(&a)) {
                    values.iter().for_each(|v| push(Eav::new(e, a, *v)));
                }
            }
            (Some(e), None, v) => {
                if let Some(attributes) = self.by_entity.get(&e) {
                    for (a, values) in attributes {
                        match v {
                            Some(v) if values.contains(&v) => push(Eav::new(e, *a, v)),
                            Some(_) => {}
                            None => values.iter().for_each(|v| push(Eav::new(e, *a, *v))),
                        }
                    }
                }
            }
            (None, Some(a), Some(v)) => {
                if let Some(entities) = self.by_attribute.get(&a).and_then(|m| m.get(&v)) {
                    entities.iter().for_each(|e| push(Eav::new(*e, a, v)));
                }
            }
            (None, Some(a), None) => {
                if let Some(values) = self.by_attribute.get(&a) {
                    for (v, entities) in values {
                        entities.iter().for_each(|e| push(Eav::new(*e, a, *v)));
                    }
                }
            }
            (None, None, v) => {
                for (a, values) in &self.by_attribute {
                    for (value, entities) in values {
                        if v.is_some_and(|v| v != *value) {
                            continue;
                        }
                        entities.iter().for_each(|e| push(Eav::new(*e, *a, *value)));
                    }
                }
            }
        }
        out
    }

    /// Whether any fact has a non-zero cell at `round`.
    #[must_use]
    pub fn has_round(&self, round: Round) -> bool {
        self.round_cells.contains_key(&round)
    }

    /// Whether any fact with `attribute` has a non-zero cell at `round`.
    #[must_use]
    pub fn touches(&self, round: Round, attribute: Id) -> bool {
        self.round_cells
            .get(&round)
            .is_some_and(|attributes| attributes.contains_key(&attribute))
    }

    /// Attributes with non-zero cells at `round`.
    pub fn attributes_at(&self, round: Round) -> impl Iterator<Item = Id> + '_ {
        self.round_cells
            .get(&round)
            .into_iter()
            .flat_map(|attributes| attributes.keys().copied())
    }

    /// Highest round holding any non-zero cell.
    #[must_use]
    pub fn max_round(&self) -> Option<Round> {
        self.round_cells.keys().next_back().copied()
    }

    /// Verify that no key's summed multiplicity is negative.
    pub fn check_distinct<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k Eav>,
    ) -> Result<(), RuntimeError> {
        for key in keys {
            let Some(counts) = self.facts.get(key) else {
                continue;
            };
            let total = counts.total();
            if total < 0 {
                return Err(RuntimeError::DistinctViolation {
                    e: key.e,
                    a: key.a,
                    v: key.v,
                    round: counts.last_round().unwrap_or_default(),
                    count: total,
                });
            }
        }
        Ok(())
    }

    /// Every fact visible at `round`, ordered by entity then attribute.
    #[must_use]
    pub fn visible(&self, round: Round) -> Vec<Eav> {
        self.by_entity
            .iter()
            .flat_map(|(e, attributes)| {
                attributes.iter().flat_map(move |(a, values)| {
                    values.iter().map(move |v| Eav::new(*e, *a, *v))
                })
            })
            .filter(|key| self.contains(key, round))
            .collect()
    }

    /// Number of facts with any recorded multiplicity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether the index holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}
