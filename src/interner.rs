//! Bidirectional interning of raw values.
//!
//! Numbers are keyed by their normalized bit pattern so `0.0` and `-0.0`
//! share an id, strings by content. The two key spaces never overlap.

use std::collections::HashMap;

use tracing::error;

use crate::value::{Id, RawValue};

/// Maps raw values to dense ids and back.
///
/// Ids are `u32`, so one interner tells apart at most `u32::MAX + 1`
/// distinct values. Values interned past that ceiling all share
/// [`Interner::MAX_ID`] and an `error!` is logged.
///
/// # Example
///
/// ```rust
/// use factflow::{Interner, RawValue};
///
/// let mut interner = Interner::new();
/// let a = interner.intern(&RawValue::from("person"));
/// let b = interner.intern(&RawValue::from("person"));
/// assert_eq!(a, b);
/// assert_eq!(interner.reverse(a), Some(&RawValue::from("person")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Interner {
    strings: HashMap<String, Id>,
    numbers: HashMap<u64, Id>,
    values: Vec<RawValue>,
}

/// Id for the value stored at `len`, saturating at the ceiling.
fn next_id(len: usize) -> Id {
    match u32::try_from(len) {
        Ok(raw) => Id::new(raw),
        Err(_) => {
            error!(values = len, "interner is full, values now share the last id");
            Interner::MAX_ID
        }
    }
}

fn number_key(n: f64) -> u64 {
    if n == 0.0 {
        0.0_f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl Interner {
    /// Largest id handed out; distinct values beyond it share this id.
    pub const MAX_ID: Id = Id::new(u32::MAX);

    /// Create an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a value, returning its existing id when already present.
    pub fn intern(&mut self, value: &RawValue) -> Id {
        if let Some(id) = self.get(value) {
            return id;
        }
        let id = next_id(self.values.len());
        match value {
            RawValue::Number(n) => {
                self.numbers.insert(number_key(*n), id);
            }
            RawValue::String(s) => {
                self.strings.insert(s.clone(), id);
            }
        }
        self.values.push(value.clone());
        id
    }

    /// Shorthand for interning a string.
    pub fn intern_str(&mut self, value: &str) -> Id {
        if let Some(id) = self.strings.get(value) {
            return *id;
        }
        self.intern(&RawValue::from(value))
    }

    /// Look up the id of a value without interning it.
    #[must_use]
    pub fn get(&self, value: &RawValue) -> Option<Id> {
        match value {
            RawValue::Number(n) => self.numbers.get(&number_key(*n)).copied(),
            RawValue::String(s) => self.strings.get(s.as_str()).copied(),
        }
    }

    /// Resolve an id back to its value.
    #[must_use]
    pub fn reverse(&self, id: Id) -> Option<&RawValue> {
        self.values.get(id.index())
    }

    /// Number of distinct values interned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
