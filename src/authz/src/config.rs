//! Engine configuration

use serde::{Deserialize, Serialize};

/// Default bound on parent-chain walks
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 64;

/// Engine configuration shared by every entity built from one schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of parents visited when looking up an ancestor.
    /// Walks that exceed it report no ancestor.
    pub max_ancestor_depth: usize,

    /// Maximum in-flight element authorizations for one array.
    /// `None` authorizes every element at once.
    pub array_concurrency: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
            array_concurrency: None,
        }
    }
}

impl EngineConfig {
    /// Concurrency to use for an array of `len` elements
    pub(crate) fn concurrency_for(&self, len: usize) -> usize {
        match self.array_concurrency {
            Some(limit) if limit > 0 => limit.min(len.max(1)),
            _ => len.max(1),
        }
    }
}
