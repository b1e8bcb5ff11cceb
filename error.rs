//! Error taxonomy (spec.md §7).
//!
//! Only *invariant violations* are real errors here. Everything else §7
//! describes (missing oracle data, context truncation, unaliased joins) is
//! absorbed into the lattice by conservative widening and never surfaces as
//! an `Err` — turning those into `Result`s would contradict the spec's
//! explicit "never raised" / "not an error" language.

use crate::ids::ObjectId;
use std::sync::atomic::{AtomicU64, Ordering};

/// A programming-bug-level invariant violation. The only operation that can
/// produce one is [`crate::state::AbstractState::store`] being called with an
/// address that is not a virtual memory address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    #[error("store called with non-virtual address 0x{raw:08x} (object {object:?} inferred)")]
    NotAVirtualAddress { raw: u32, object: Option<ObjectId> },
}

/// Counts how many times a lattice operation silently skipped a variant
/// mismatch (interval vs. address-set on the same key), per spec.md §9's
/// Open Question: "it may hide real imprecision ... document and surface a
/// diagnostic counter."
///
/// This does not change behavior (the skip is still a documented no-op); it
/// just makes the imprecision observable instead of invisible.
#[derive(Debug, Default)]
pub struct ImprecisionCounter {
    count: AtomicU64,
}

impl ImprecisionCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Record one variant-mismatch skip, logging the first occurrence at a
    /// given call site at `warn` level and staying silent (but still
    /// counting) afterward so a hot loop doesn't spam the log.
    pub fn record(&self, site: &'static str) {
        let prev = self.count.fetch_add(1, Ordering::Relaxed);
        if prev == 0 {
            tracing::warn!(site, "variant mismatch in lattice operation; value left unchanged");
        } else {
            tracing::trace!(site, total = prev + 1, "variant mismatch (repeated)");
        }
    }

    pub fn total(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
