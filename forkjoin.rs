//! C2a — Fork/Join Analysis (spec.md §4.4).
//!
//! For each forked thread, a context-sensitive forward traversal from its
//! fork site over a 3-point aliveness lattice, classifying every thread pair
//! as happens-before or may-happen-in-parallel at the parent's join point.
//! Grounded on `ForkJoinAnalysis` in `examples/original_source/svf/include/
//! MTA/MHP.h` (`ValDomain`, `directJoinMap`, `HBPair`/`HPPair`,
//! `fullJoin`/`partialJoin`, `cxtJoinInLoop`), with the worklist/merge idiom
//! taken from the teacher's `forward_analysis` in `middle_end/analysis.rs`.

use crate::commons::{Map, Set};
use crate::ids::{CallSiteId, NodeId, ThreadId};
use crate::oracles::{
    step_successors, CallingContext, CxtStmt, Icfg, PointerAnalysis, ScalarEvolution, Tct,
    ThreadCallGraph,
};
use std::collections::VecDeque;

/// The 3-point semilattice `Empty < Dead < Alive` (spec.md §4.4). Declared in
/// this order so the derived `Ord` gives exactly that ranking; `join` is
/// then just `max`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AliveFlag {
    Empty,
    Dead,
    Alive,
}

impl AliveFlag {
    pub fn join(self, other: AliveFlag) -> AliveFlag {
        self.max(other)
    }
}

/// Everything C2a produces, indexed so C2b (`interleaving.rs`) and the MHP
/// facade (`mhp.rs`) can consult it without re-running the traversal.
#[derive(Clone, Debug, Default)]
pub struct ForkJoinResults {
    pub flags: Map<CxtStmt, AliveFlag>,
    pub direct_join: Map<CxtStmt, Set<ThreadId>>,
    pub hb: Set<(ThreadId, ThreadId)>,
    pub hp: Set<(ThreadId, ThreadId)>,
    pub full_join: Set<(ThreadId, ThreadId)>,
    pub partial_join: Set<(ThreadId, ThreadId)>,
    pub cxt_join_in_loop: Set<CxtStmt>,
}

impl ForkJoinResults {
    pub fn is_hb(&self, t1: ThreadId, t2: ThreadId) -> bool {
        self.hb.contains(&(t1, t2))
    }

    pub fn is_hp(&self, t1: ThreadId, t2: ThreadId) -> bool {
        self.hp.contains(&(t1, t2)) || self.hp.contains(&(t2, t1))
    }

    pub fn is_full_join(&self, t1: ThreadId, t2: ThreadId) -> bool {
        self.full_join.contains(&(t1, t2)) && !self.partial_join.contains(&(t1, t2))
    }

    /// Transitive closure of `direct_join[cs]` under `full_join` (spec.md
    /// §4.4): if `t'` is (directly or indirectly) joined at `cs` and `t'`
    /// fully joins `t''`, then `t''` is indirectly joined at `cs` too.
    pub fn dir_and_ind_joined_tid(&self, cs: &CxtStmt) -> Set<ThreadId> {
        let mut result: Set<ThreadId> = self.direct_join.get(cs).cloned().unwrap_or_default();
        loop {
            let mut grew = false;
            let frontier: Vec<ThreadId> = result.iter().copied().collect();
            for t_prime in frontier {
                for &(a, b) in &self.full_join {
                    if a == t_prime && result.insert(b) {
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }
        result
    }
}

fn merge(
    flags: &mut Map<CxtStmt, AliveFlag>,
    worklist: &mut VecDeque<CxtStmt>,
    cs: CxtStmt,
    incoming: AliveFlag,
) {
    let slot = flags.entry(cs.clone()).or_insert(AliveFlag::Empty);
    let joined = slot.join(incoming);
    if joined != *slot {
        *slot = joined;
        worklist.push_back(cs);
    }
}

/// Whether the handle joined at `join_cs` may alias the handle forked at
/// `fork_cs` (spec.md §4.4, "Alias check"). Unknown handles are treated as
/// not aliasing — the conservative direction for a join, since a join that
/// might not actually be joining this thread must not remove it from
/// aliveness.
fn handles_may_alias(
    tcg: &impl ThreadCallGraph,
    pta: &impl PointerAnalysis,
    fork_cs: CallSiteId,
    join_cs: CallSiteId,
) -> bool {
    match (tcg.fork_handle_object(fork_cs), tcg.join_handle_object(join_cs)) {
        (Some(f), Some(j)) => pta.may_alias(f, j),
        _ => false,
    }
}

/// Same-trip-count check gating whether an aliased join is a *symmetric-loop*
/// join (spec.md §4.4, "Alias check"): both fork and join sit in loops with
/// the same trip count. Callers must have already established that the
/// handles alias.
fn is_symmetric_loop_join(
    icfg: &impl Icfg,
    fork_cs: CallSiteId,
    join_cs: CallSiteId,
    scev: &impl ScalarEvolution,
) -> bool {
    let join_node = NodeId(join_cs.0);
    let Some(join_loop) = icfg.enclosing_loop_header(join_node) else {
        // Not inside a loop at all, so "symmetric loop" does not apply.
        return false;
    };
    let fork_node = NodeId(fork_cs.0);
    match icfg.enclosing_loop_header(fork_node) {
        Some(fork_loop) => scev.same_trip_count(fork_loop, join_loop),
        None => false,
    }
}

/// Every thread id the TCT reports as forked (i.e. every node but the root),
/// collected by walking child links from `main`.
fn forked_thread_ids(tct: &impl Tct) -> Vec<ThreadId> {
    let mut out = Vec::new();
    let mut stack = vec![tct.main_thread()];
    let mut seen = Set::new();
    seen.insert(tct.main_thread());
    while let Some(tid) = stack.pop() {
        for child in tct.children(tid) {
            if seen.insert(child) {
                out.push(child);
                stack.push(child);
            }
        }
    }
    out
}

/// Run the fork/join analysis over every forked thread.
#[tracing::instrument(skip_all, fields(k))]
pub fn analyze(
    icfg: &impl Icfg,
    tcg: &impl ThreadCallGraph,
    tct: &impl Tct,
    pta: &impl PointerAnalysis,
    scev: &impl ScalarEvolution,
    k: usize,
) -> ForkJoinResults {
    tracing::Span::current().record("k", k);
    let mut results = ForkJoinResults::default();

    for t in forked_thread_ids(tct) {
        tracing::debug!(thread = t.0, "seeding fork/join worklist at fork site");
        let parent = tct
            .parent(t)
            .expect("forked_thread_ids only yields threads with a parent");
        let fork_cs = tct
            .fork_site(t)
            .expect("forked thread must have a fork site");
        let fork_node = NodeId(fork_cs.0);

        let mut flags: Map<CxtStmt, AliveFlag> = Map::new();
        let mut worklist: VecDeque<CxtStmt> = VecDeque::new();
        let seed = CxtStmt::new(CallingContext::empty(k), fork_node);
        flags.insert(seed.clone(), AliveFlag::Alive);
        worklist.push_back(seed);

        while let Some(cs) = worklist.pop_front() {
            let flag = flags[&cs];
            tracing::trace!(%cs, ?flag, "fork/join worklist pop");
            if flag == AliveFlag::Empty {
                continue;
            }

            let join_call = icfg.is_call(cs.node).filter(|&call| {
                tcg.is_join_site(call)
                    && tcg.joined_thread_candidates(call).contains(&t)
                    && handles_may_alias(tcg, pta, fork_cs, call)
            });

            if let Some(join_cs) = join_call {
                results
                    .direct_join
                    .entry(cs.clone())
                    .or_default()
                    .insert(t);
                if is_symmetric_loop_join(icfg, fork_cs, join_cs, scev) {
                    results.cxt_join_in_loop.insert(cs.clone());
                }
                for (ncxt, nnode) in step_successors(icfg, &cs.cxt, cs.node) {
                    merge(&mut flags, &mut worklist, CxtStmt::new(ncxt, nnode), AliveFlag::Dead);
                }
            } else {
                for (ncxt, nnode) in step_successors(icfg, &cs.cxt, cs.node) {
                    merge(&mut flags, &mut worklist, CxtStmt::new(ncxt, nnode), flag);
                }
            }
        }

        let exit_node = icfg.exit(tct.start_routine(parent));
        let exit_cs = CxtStmt::new(CallingContext::empty(k), exit_node);
        let exit_flag = flags.get(&exit_cs).copied().unwrap_or(AliveFlag::Alive);

        if exit_flag == AliveFlag::Alive {
            results.hp.insert((parent, t));
            results.hp.insert((t, parent));
        } else {
            results.hb.insert((parent, t));
        }

        if exit_flag == AliveFlag::Dead {
            results.full_join.insert((parent, t));
        } else {
            results.partial_join.insert((parent, t));
        }

        results.flags.extend(flags);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FuncId, ObjectId};
    use std::collections::BTreeMap as StdMap;

    /// `main` (func 0) forks thread 1 at node 1, which runs func 1 (entry 10,
    /// exit 11) and is joined at node 2 in func 0, which then falls through
    /// to the exit of func 0 at node 3.
    struct Toy {
        succs: StdMap<NodeId, Vec<NodeId>>,
    }

    impl Icfg for Toy {
        fn succs(&self, node: NodeId) -> Vec<NodeId> {
            self.succs.get(&node).cloned().unwrap_or_default()
        }
        fn preds(&self, _node: NodeId) -> Vec<NodeId> {
            vec![]
        }
        fn is_loop_header(&self, _node: NodeId) -> bool {
            false
        }
        fn enclosing_loop_header(&self, _node: NodeId) -> Option<NodeId> {
            None
        }
        fn entry(&self, func: FuncId) -> NodeId {
            if func == FuncId(1) {
                NodeId(10)
            } else {
                NodeId(0)
            }
        }
        fn exit(&self, func: FuncId) -> NodeId {
            if func == FuncId(1) {
                NodeId(11)
            } else {
                NodeId(3)
            }
        }
        fn func_of(&self, node: NodeId) -> FuncId {
            if node.0 >= 10 {
                FuncId(1)
            } else {
                FuncId(0)
            }
        }
        fn is_call(&self, _node: NodeId) -> Option<CallSiteId> {
            None
        }
        fn is_return(&self, _node: NodeId) -> Option<CallSiteId> {
            None
        }
        fn callees(&self, _call_site: CallSiteId) -> Vec<FuncId> {
            vec![]
        }
    }

    struct ToyTcg;
    impl ThreadCallGraph for ToyTcg {
        fn is_fork_site(&self, call_site: CallSiteId) -> bool {
            call_site == CallSiteId(1)
        }
        fn is_join_site(&self, call_site: CallSiteId) -> bool {
            call_site == CallSiteId(2)
        }
        fn fork_start_routine(&self, call_site: CallSiteId) -> Option<FuncId> {
            (call_site == CallSiteId(1)).then_some(FuncId(1))
        }
        fn spawned_thread(&self, call_site: CallSiteId) -> Option<ThreadId> {
            (call_site == CallSiteId(1)).then_some(ThreadId(1))
        }
        fn joined_thread_candidates(&self, call_site: CallSiteId) -> Vec<ThreadId> {
            if call_site == CallSiteId(2) {
                vec![ThreadId(1)]
            } else {
                vec![]
            }
        }
        fn fork_handle_object(&self, _call_site: CallSiteId) -> Option<ObjectId> {
            Some(ObjectId(1))
        }
        fn join_handle_object(&self, _call_site: CallSiteId) -> Option<ObjectId> {
            Some(ObjectId(1))
        }
    }

    struct ToyTct;
    impl Tct for ToyTct {
        fn main_thread(&self) -> ThreadId {
            ThreadId(0)
        }
        fn parent(&self, tid: ThreadId) -> Option<ThreadId> {
            (tid == ThreadId(1)).then_some(ThreadId(0))
        }
        fn children(&self, tid: ThreadId) -> Vec<ThreadId> {
            if tid == ThreadId(0) {
                vec![ThreadId(1)]
            } else {
                vec![]
            }
        }
        fn siblings(&self, _tid: ThreadId) -> Vec<ThreadId> {
            vec![]
        }
        fn is_multi_forked(&self, _tid: ThreadId) -> bool {
            false
        }
        fn fork_site(&self, tid: ThreadId) -> Option<CallSiteId> {
            (tid == ThreadId(1)).then_some(CallSiteId(1))
        }
        fn start_routine(&self, tid: ThreadId) -> FuncId {
            if tid == ThreadId(1) {
                FuncId(1)
            } else {
                FuncId(0)
            }
        }
    }

    struct AlwaysAlias;
    impl PointerAnalysis for AlwaysAlias {
        fn may_alias(&self, _a: ObjectId, _b: ObjectId) -> bool {
            true
        }
    }
    struct NoLoops;
    impl ScalarEvolution for NoLoops {
        fn same_trip_count(&self, _loop_a: NodeId, _loop_b: NodeId) -> bool {
            true
        }
    }

    #[test]
    fn joined_thread_is_happens_before_and_full_join() {
        let mut succs = StdMap::new();
        succs.insert(NodeId(1), vec![NodeId(2)]);
        succs.insert(NodeId(2), vec![NodeId(3)]);
        succs.insert(NodeId(3), vec![]);
        succs.insert(NodeId(10), vec![NodeId(11)]);
        succs.insert(NodeId(11), vec![]);
        let icfg = Toy { succs };

        // Pretend node 2 is a call (the join call).
        struct ToyWithCalls(Toy);
        impl Icfg for ToyWithCalls {
            fn succs(&self, node: NodeId) -> Vec<NodeId> {
                self.0.succs(node)
            }
            fn preds(&self, node: NodeId) -> Vec<NodeId> {
                self.0.preds(node)
            }
            fn is_loop_header(&self, node: NodeId) -> bool {
                self.0.is_loop_header(node)
            }
            fn enclosing_loop_header(&self, node: NodeId) -> Option<NodeId> {
                self.0.enclosing_loop_header(node)
            }
            fn entry(&self, func: FuncId) -> NodeId {
                self.0.entry(func)
            }
            fn exit(&self, func: FuncId) -> NodeId {
                self.0.exit(func)
            }
            fn func_of(&self, node: NodeId) -> FuncId {
                self.0.func_of(node)
            }
            fn is_call(&self, node: NodeId) -> Option<CallSiteId> {
                (node == NodeId(2)).then_some(CallSiteId(2))
            }
            fn is_return(&self, _node: NodeId) -> Option<CallSiteId> {
                None
            }
            fn callees(&self, _call_site: CallSiteId) -> Vec<FuncId> {
                vec![]
            }
        }

        let icfg = ToyWithCalls(icfg);
        let results = analyze(&icfg, &ToyTcg, &ToyTct, &AlwaysAlias, &NoLoops, 2);

        assert!(results.is_hb(ThreadId(0), ThreadId(1)));
        assert!(!results.is_hp(ThreadId(0), ThreadId(1)));
        assert!(results.is_full_join(ThreadId(0), ThreadId(1)));

        let join_cs = CxtStmt::new(CallingContext::empty(2), NodeId(2));
        assert!(results.direct_join[&join_cs].contains(&ThreadId(1)));
        assert_eq!(
            results.dir_and_ind_joined_tid(&join_cs),
            Set::from([ThreadId(1)])
        );
    }
}
