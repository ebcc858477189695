//! Multiplicity-tagged changes to the fact index.
//!
//! A [`Change`] asserts (`count > 0`) or retracts (`count < 0`) one
//! `(e, a, v)` fact at a given round of a transaction. [`RawChange`] is the
//! un-interned form used at the edges of the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::interner::Interner;
use crate::value::{Id, RawValue};

/// Fixed-point iteration step inside a transaction.
pub type Round = u32;

/// Signed multiplicity of a change.
pub type Count = i32;

/// Transaction identifier.
pub type TransactionId = u64;

/// The key of a fact: entity, attribute, value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Eav {
    pub e: Id,
    pub a: Id,
    pub v: Id,
}

impl Eav {
    #[must_use]
    pub const fn new(e: Id, a: Id, v: Id) -> Self {
        Self { e, a, v }
    }
}

/// An interned change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub e: Id,
    pub a: Id,
    pub v: Id,
    /// Producing node, or the interned `"input"` marker for external input.
    pub node: Id,
    pub transaction: TransactionId,
    pub round: Round,
    pub count: Count,
}

impl Change {
    #[must_use]
    pub const fn key(&self) -> Eav {
        Eav::new(self.e, self.a, self.v)
    }

    #[must_use]
    pub const fn from_key(
        key: Eav,
        node: Id,
        transaction: TransactionId,
        round: Round,
        count: Count,
    ) -> Self {
        Self {
            e: key.e,
            a: key.a,
            v: key.v,
            node,
            transaction,
            round,
            count,
        }
    }

    /// Resolve the ids back to raw values.
    #[must_use]
    pub fn to_raw(&self, interner: &Interner) -> Option<RawChange> {
        Some(RawChange {
            e: interner.reverse(self.e)?.clone(),
            a: interner.reverse(self.a)?.clone(),
            v: interner.reverse(self.v)?.clone(),
            round: self.round,
            count: self.count,
        })
    }
}

fn default_count() -> Count {
    1
}

/// A change expressed with raw values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub e: RawValue,
    pub a: RawValue,
    pub v: RawValue,
    #[serde(default)]
    pub round: Round,
    #[serde(default = "default_count")]
    pub count: Count,
}

impl RawChange {
    /// Intern this change for the given producing node and transaction.
    pub fn intern(
        &self,
        interner: &mut Interner,
        node: Id,
        transaction: TransactionId,
    ) -> Change {
        Change {
            e: interner.intern(&self.e),
            a: interner.intern(&self.a),
            v: interner.intern(&self.v),
            node,
            transaction,
            round: self.round,
            count: self.count,
        }
    }
}

impl fmt::Display for RawChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.count > 0 { "+" } else { "" };
        write!(
            f,
            "[{}, {}, {}] round {} {sign}{}",
            self.e, self.a, self.v, self.round, self.count
        )
    }
}

/// An assertion at round 0 with count 1.
pub fn eav(e: impl Into<RawValue>, a: impl Into<RawValue>, v: impl Into<RawValue>) -> RawChange {
    eavrc(e, a, v, 0, 1)
}

/// A change with an explicit round and count.
pub fn eavrc(
    e: impl Into<RawValue>,
    a: impl Into<RawValue>,
    v: impl Into<RawValue>,
    round: Round,
    count: Count,
) -> RawChange {
    RawChange {
        e: e.into(),
        a: a.into(),
        v: v.into(),
        round,
        count,
    }
}
