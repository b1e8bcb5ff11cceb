//! MHP facade (spec.md §4.5, "Queries").
//!
//! A thin, cached query surface over [`crate::interleaving::InterleavingResults`].
//! Grounded on `MHP::mayHappenInParallel`/`mayHappenInParallelCache`/
//! `executedByTheSameThread` in `examples/original_source/svf/include/MTA/
//! MHP.h`, with the cache itself shaped around spec.md §9's "Fixed-point
//! caching" note: a pair can only ever go from not-yet-known to `true`, so a
//! cache entry is safe to populate lazily and never needs invalidating.

use crate::commons::Map;
use crate::ids::NodeId;
use crate::interleaving::InterleavingResults;
use std::cell::RefCell;

/// Unordered pair key so `(i1, i2)` and `(i2, i1)` share one cache slot.
fn pair_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Facade combining C2a/C2b's raw results with a query cache. Holds its
/// inputs by reference — this crate never mutates analysis results once
/// computed, only answers questions about them.
pub struct Mhp<'a> {
    interleaving: &'a InterleavingResults,
    mhp_cache: RefCell<Map<(NodeId, NodeId), bool>>,
    same_thread_cache: RefCell<Map<(NodeId, NodeId), bool>>,
    pub num_total_queries: RefCell<u64>,
    pub num_mhp_queries: RefCell<u64>,
}

impl<'a> Mhp<'a> {
    pub fn new(interleaving: &'a InterleavingResults) -> Self {
        Self {
            interleaving,
            mhp_cache: RefCell::new(Map::new()),
            same_thread_cache: RefCell::new(Map::new()),
            num_total_queries: RefCell::new(0),
            num_mhp_queries: RefCell::new(0),
        }
    }

    /// `may_happen_in_parallel(i1, i2)`: some `CxtThreadStmt` reaching `i1`
    /// has a tid in the interleaving set of some `CxtThreadStmt` reaching
    /// `i2` (or vice versa). Conservative default: an instruction with no
    /// recorded `CxtThreadStmt` at all (never visited by C2b) answers `true`
    /// (spec.md §4.6, "missing oracle datum → conservative widening").
    pub fn may_happen_in_parallel(&self, i1: NodeId, i2: NodeId) -> bool {
        *self.num_total_queries.borrow_mut() += 1;
        let key = pair_key(i1, i2);
        if let Some(&cached) = self.mhp_cache.borrow().get(&key) {
            if cached {
                *self.num_mhp_queries.borrow_mut() += 1;
            }
            return cached;
        }

        let answer = self.may_happen_in_parallel_uncached(i1, i2);
        self.mhp_cache.borrow_mut().insert(key, answer);
        if answer {
            *self.num_mhp_queries.borrow_mut() += 1;
        }
        answer
    }

    fn may_happen_in_parallel_uncached(&self, i1: NodeId, i2: NodeId) -> bool {
        let (Some(cts1_set), Some(cts2_set)) = (
            self.interleaving.inst_to_cts.get(&i1),
            self.interleaving.inst_to_cts.get(&i2),
        ) else {
            return true;
        };

        for cts1 in cts1_set {
            let Some(interleav1) = self.interleaving.interleav.get(cts1) else {
                continue;
            };
            for cts2 in cts2_set {
                if interleav1.contains(&cts2.tid) {
                    return true;
                }
                if let Some(interleav2) = self.interleaving.interleav.get(cts2) {
                    if interleav2.contains(&cts1.tid) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// `executed_by_same_thread(i1, i2)`: some `CxtThreadStmt` reaching `i1`
    /// and some reaching `i2` share a thread id.
    pub fn executed_by_same_thread(&self, i1: NodeId, i2: NodeId) -> bool {
        let key = pair_key(i1, i2);
        if let Some(&cached) = self.same_thread_cache.borrow().get(&key) {
            return cached;
        }

        let answer = match (
            self.interleaving.inst_to_cts.get(&i1),
            self.interleaving.inst_to_cts.get(&i2),
        ) {
            (Some(s1), Some(s2)) => s1.iter().any(|c1| s2.iter().any(|c2| c1.tid == c2.tid)),
            _ => true,
        };
        self.same_thread_cache.borrow_mut().insert(key, answer);
        answer
    }
}
