//! Program configuration.

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

/// Limits and switches for a [`Program`](crate::Program).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgramConfig {
    /// Rounds a transaction may run before it is abandoned.
    pub max_rounds: u32,
    /// Check that no fact ends a transaction with a negative multiplicity.
    pub distinct_check: bool,
    /// Buffered batches per diff stream.
    pub stream_capacity: usize,
    /// Equality passes per scope before unification gives up. Derived from
    /// the number of equalities when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_unify_rounds: Option<usize>,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10_000,
            distinct_check: true,
            stream_capacity: 1024,
            max_unify_rounds: None,
        }
    }
}

impl ProgramConfig {
    /// Parse a JSON config document. Missing keys take their defaults.
    pub fn from_json(document: &str) -> FlowResult<Self> {
        serde_json::from_str(document).map_err(|e| FlowError::Config {
            message: e.to_string(),
        })
    }
}
