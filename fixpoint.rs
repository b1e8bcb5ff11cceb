//! Generic forward worklist fixpoint driver (spec.md §4.3).
//!
//! Generalizes `forward_analysis` in `middle_end/analysis.rs` from a
//! single basic-block-granularity domain to any [`AbstractEnv`] over any
//! [`Icfg`] node. Where the teacher's driver picks the join/widen operation
//! with a `join_type: i64` flag recomputed at every edge, this one tracks an
//! explicit [`Phase`] per loop header so "widen only after at least one
//! join" is a state-machine invariant instead of a convention the caller has
//! to get right every time.

use crate::commons::Map;
use crate::ids::NodeId;
use crate::oracles::Icfg;
use std::collections::VecDeque;

/// The abstract environment a fixpoint computation operates over. Unlike the
/// teacher's `AbstractEnv`, transfer functions are not a method on this trait
/// — they are supplied to [`forward_analysis`] as a closure, so the same
/// environment type (e.g. [`crate::state::AbstractState`]) can be driven by
/// different per-node semantics without re-deriving the trait.
pub trait AbstractEnv: Clone + PartialEq {
    fn join_with(&mut self, rhs: &Self) -> bool;
    fn widen_with(&mut self, rhs: &Self) -> bool;
    fn narrow_with(&mut self, rhs: &Self) -> bool;
}

/// Tuning knobs for the ascend/widen/narrow schedule (spec.md §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixpointConfig {
    /// How many plain joins a loop header gets before the driver starts
    /// widening it. `0` widens on the very first back-edge join.
    pub widening_delay: u32,
    /// Upper bound on narrowing passes after the ascending phase settles.
    /// `0` disables narrowing entirely.
    pub max_narrowing_iters: u32,
}

impl Default for FixpointConfig {
    fn default() -> Self {
        Self {
            widening_delay: 0,
            max_narrowing_iters: 3,
        }
    }
}

/// Per-loop-header state. A header starts `Ascending`, accumulating plain
/// joins; once `joins_since_widen` reaches `widening_delay` the *next*
/// back-edge update widens instead, moving the header to `Widened`. Only a
/// node that has been `Widened` is eligible for the narrowing pass — a
/// header the ascending phase never widened has no over-approximation to
/// narrow away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Ascending { joins_since_widen: u32 },
    Widened,
}

/// Run a forward dataflow analysis from `entry` until fixpoint, then (if
/// `config.max_narrowing_iters > 0`) run narrowing passes to recover
/// precision lost to widening.
///
/// `transfer(node, pre_state)` computes the post-state for `node`; the
/// driver takes care of propagating that post-state to every successor and
/// picking join vs. widen vs. narrow per the current [`Phase`].
///
/// Returns the pre-state computed for every node reached from `entry`.
#[tracing::instrument(skip_all, fields(%entry))]
pub fn forward_analysis<A, I>(
    icfg: &I,
    entry: NodeId,
    entry_state: A,
    bottom: &A,
    transfer: impl Fn(NodeId, &A) -> A,
    config: &FixpointConfig,
) -> Map<NodeId, A>
where
    A: AbstractEnv,
    I: Icfg,
{
    let mut pre: Map<NodeId, A> = Map::new();
    let mut phase: Map<NodeId, Phase> = Map::new();
    let mut worklist: VecDeque<NodeId> = VecDeque::new();

    pre.insert(entry, entry_state);
    worklist.push_back(entry);

    while let Some(node) = worklist.pop_front() {
        tracing::trace!(%node, "fixpoint worklist pop");
        let state = pre.get(&node).cloned().unwrap_or_else(|| bottom.clone());
        let post = transfer(node, &state);

        for succ in icfg.succs(node) {
            let is_header = icfg.is_loop_header(succ);
            let changed = match pre.get_mut(&succ) {
                None => {
                    pre.insert(succ, post.clone());
                    if is_header {
                        phase.insert(succ, Phase::Ascending { joins_since_widen: 0 });
                    }
                    true
                }
                Some(cur) => {
                    if is_header {
                        let ph = phase
                            .entry(succ)
                            .or_insert(Phase::Ascending { joins_since_widen: 0 });
                        match ph {
                            Phase::Ascending { joins_since_widen }
                                if *joins_since_widen < config.widening_delay =>
                            {
                                *joins_since_widen += 1;
                                cur.join_with(&post)
                            }
                            _ => {
                                *ph = Phase::Widened;
                                cur.widen_with(&post)
                            }
                        }
                    } else {
                        cur.join_with(&post)
                    }
                }
            };
            if changed {
                worklist.push_back(succ);
            }
        }
    }

    if config.max_narrowing_iters > 0 {
        narrow_until_stable(icfg, &mut pre, &phase, &transfer, config.max_narrowing_iters);
    }

    pre
}

/// Descending iteration: for every node, recompute the confluence of all its
/// predecessors' transferred post-states (the same join used in the
/// ascending phase) and narrow the node's current state toward it. Runs for
/// up to `max_iters` rounds or until nothing changes, whichever is first.
///
/// Narrowing one predecessor edge at a time (rather than joining all
/// predecessors first) would let an earlier edge's narrow throw away
/// information a later edge still needed — joining the predecessors before
/// narrowing is what keeps this sound.
fn narrow_until_stable<A, I>(
    icfg: &I,
    pre: &mut Map<NodeId, A>,
    phase: &Map<NodeId, Phase>,
    transfer: &impl Fn(NodeId, &A) -> A,
    max_iters: u32,
) where
    A: AbstractEnv,
    I: Icfg,
{
    let any_widened = phase.values().any(|p| matches!(p, Phase::Widened));
    if !any_widened {
        return;
    }

    let nodes: Vec<NodeId> = pre.keys().copied().collect();
    for _ in 0..max_iters {
        let mut changed_any = false;
        for &node in &nodes {
            let preds = icfg.preds(node);
            if preds.is_empty() {
                continue;
            }
            let mut combined: Option<A> = None;
            for p in preds {
                let Some(pstate) = pre.get(&p) else { continue };
                let post = transfer(p, pstate);
                combined = Some(match combined {
                    None => post,
                    Some(mut acc) => {
                        acc.join_with(&post);
                        acc
                    }
                });
            }
            if let Some(combined) = combined {
                if let Some(cur) = pre.get_mut(&node) {
                    if cur.narrow_with(&combined) {
                        changed_any = true;
                    }
                }
            }
        }
        if !changed_any {
            break;
        }
    }
}
