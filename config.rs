//! Analysis configuration (SPEC_FULL.md §2, "Configuration").
//!
//! Mirrors how the pack's service crates externalize tunables via `serde`
//! rather than compiled-in constants: a host tool can deserialize this from a
//! JSON config file to tune k-CFA depth or the widening/narrowing schedule
//! without recompiling.

use crate::fixpoint::FixpointConfig;
use serde::{Deserialize, Serialize};

/// Top-level tunables for a whole-program run: how deep the call-string
/// context goes, and how the fixpoint driver schedules widen/narrow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// k-CFA bound: how many call sites [`crate::oracles::CallingContext`]
    /// retains before truncating (spec.md §5).
    #[serde(default = "default_k")]
    pub k: usize,

    /// Plain joins a loop header gets before the fixpoint driver starts
    /// widening it (spec.md §4.3).
    #[serde(default)]
    pub widening_delay: u32,

    /// Upper bound on descending narrowing passes after the ascending phase
    /// settles; `0` disables narrowing.
    #[serde(default = "default_max_narrowing_iters")]
    pub max_narrowing_iters: u32,
}

fn default_k() -> usize {
    1
}

fn default_max_narrowing_iters() -> u32 {
    3
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            widening_delay: 0,
            max_narrowing_iters: default_max_narrowing_iters(),
        }
    }
}

impl AnalysisConfig {
    /// Parse from a JSON document (spec.md's "tune without recompiling").
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn fixpoint_config(&self) -> FixpointConfig {
        FixpointConfig {
            widening_delay: self.widening_delay,
            max_narrowing_iters: self.max_narrowing_iters,
        }
    }
}
