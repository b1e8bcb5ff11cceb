//! End-to-end MHP scenarios from spec.md §8 ("End-to-end scenarios" 4-6),
//! wiring C2a (`forkjoin`), C2b (`interleaving`), and the `Mhp` facade
//! together the way a real driver would, rather than unit-testing each
//! analysis against the other's results in isolation.

use valueflow_core::forkjoin;
use valueflow_core::ids::{CallSiteId, FuncId, NodeId, ObjectId, ThreadId};
use valueflow_core::interleaving;
use valueflow_core::mhp::Mhp;
use valueflow_core::oracles::{Icfg, PointerAnalysis, ScalarEvolution, Tct, ThreadCallGraph};
use std::collections::BTreeMap as StdMap;

/// `main` (func 0) has a loop header at node 1: the body forks thread 1 at
/// node 2 and joins it at node 3 every iteration, then the loop exits to
/// node 4. Thread 1 runs func 1 (entry 10, exit 11).
struct LoopIcfg {
    succs: StdMap<NodeId, Vec<NodeId>>,
}

impl Icfg for LoopIcfg {
    fn succs(&self, node: NodeId) -> Vec<NodeId> {
        self.succs.get(&node).cloned().unwrap_or_default()
    }
    fn preds(&self, _node: NodeId) -> Vec<NodeId> {
        vec![]
    }
    fn is_loop_header(&self, node: NodeId) -> bool {
        node == NodeId(1)
    }
    fn enclosing_loop_header(&self, node: NodeId) -> Option<NodeId> {
        matches!(node, NodeId(2) | NodeId(3)).then_some(NodeId(1))
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
            NodeId(4)
        }
    }
    fn func_of(&self, node: NodeId) -> FuncId {
        if node.0 >= 10 {
            FuncId(1)
        } else {
            FuncId(0)
        }
    }
    fn is_call(&self, node: NodeId) -> Option<CallSiteId> {
        match node {
            NodeId(2) => Some(CallSiteId(2)),
            NodeId(3) => Some(CallSiteId(3)),
            _ => None,
        }
    }
    fn is_return(&self, _node: NodeId) -> Option<CallSiteId> {
        None
    }
    fn callees(&self, _call_site: CallSiteId) -> Vec<FuncId> {
        vec![]
    }
}

fn loop_icfg() -> LoopIcfg {
    let mut succs = StdMap::new();
    succs.insert(NodeId(0), vec![NodeId(1)]);
    succs.insert(NodeId(1), vec![NodeId(2), NodeId(4)]);
    succs.insert(NodeId(2), vec![NodeId(3)]);
    succs.insert(NodeId(3), vec![NodeId(1)]);
    succs.insert(NodeId(4), vec![]);
    succs.insert(NodeId(10), vec![NodeId(11)]);
    succs.insert(NodeId(11), vec![]);
    LoopIcfg { succs }
}

struct ForkAndJoinSite;
impl ThreadCallGraph for ForkAndJoinSite {
    fn is_fork_site(&self, call_site: CallSiteId) -> bool {
        call_site == CallSiteId(2)
    }
    fn is_join_site(&self, call_site: CallSiteId) -> bool {
        call_site == CallSiteId(3)
    }
    fn fork_start_routine(&self, call_site: CallSiteId) -> Option<FuncId> {
        (call_site == CallSiteId(2)).then_some(FuncId(1))
    }
    fn spawned_thread(&self, call_site: CallSiteId) -> Option<ThreadId> {
        (call_site == CallSiteId(2)).then_some(ThreadId(1))
    }
    fn joined_thread_candidates(&self, call_site: CallSiteId) -> Vec<ThreadId> {
        if call_site == CallSiteId(3) {
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

struct OneThread;
impl Tct for OneThread {
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
        (tid == ThreadId(1)).then_some(CallSiteId(2))
    }
    fn start_routine(&self, tid: ThreadId) -> FuncId {
        if tid == ThreadId(1) {
            FuncId(1)
        } else {
            FuncId(0)
        }
    }
}

struct ExactAlias;
impl PointerAnalysis for ExactAlias {
    fn may_alias(&self, a: ObjectId, b: ObjectId) -> bool {
        a == b
    }
}

struct SameLoop;
impl ScalarEvolution for SameLoop {
    fn same_trip_count(&self, loop_a: NodeId, loop_b: NodeId) -> bool {
        loop_a == loop_b
    }
}

/// Scenario 4: fork and join of the same handle inside one loop iteration,
/// alias holds and the loops match (trivially: it's the same loop). The join
/// is recognized as the symmetric-loop pattern, so it happens-before (rather
/// than may-happen-in-parallel with) the code after the loop.
#[test]
fn symmetric_loop_fork_join_is_happens_before() {
    let icfg = loop_icfg();
    let tcg = ForkAndJoinSite;
    let tct = OneThread;

    let fj = forkjoin::analyze(&icfg, &tcg, &tct, &ExactAlias, &SameLoop, 2);
    assert!(fj.is_hb(ThreadId(0), ThreadId(1)));
    assert!(!fj.is_hp(ThreadId(0), ThreadId(1)));
    assert!(fj.is_full_join(ThreadId(0), ThreadId(1)));

    let il = interleaving::analyze(&icfg, &tcg, &tct, &fj, 2);
    let query = Mhp::new(&il);

    let body_of_t2 = NodeId(10);
    let after_loop_in_t1 = NodeId(4);
    assert!(!query.may_happen_in_parallel(body_of_t2, after_loop_in_t1));
}

/// Scenario 5: a fork inside a loop that is never joined flags the spawned
/// thread as multi-forked (an oracle fact here, asserted directly); every
/// statement in it interleaves with itself.
#[test]
fn unjoined_loop_fork_is_self_parallel() {
    struct NeverJoins;
    impl ThreadCallGraph for NeverJoins {
        fn is_fork_site(&self, call_site: CallSiteId) -> bool {
            call_site == CallSiteId(2)
        }
        fn is_join_site(&self, _call_site: CallSiteId) -> bool {
            false
        }
        fn fork_start_routine(&self, call_site: CallSiteId) -> Option<FuncId> {
            (call_site == CallSiteId(2)).then_some(FuncId(1))
        }
        fn spawned_thread(&self, call_site: CallSiteId) -> Option<ThreadId> {
            (call_site == CallSiteId(2)).then_some(ThreadId(1))
        }
        fn joined_thread_candidates(&self, _call_site: CallSiteId) -> Vec<ThreadId> {
            vec![]
        }
        fn fork_handle_object(&self, _call_site: CallSiteId) -> Option<ObjectId> {
            None
        }
        fn join_handle_object(&self, _call_site: CallSiteId) -> Option<ObjectId> {
            None
        }
    }
    struct MultiForked;
    impl Tct for MultiForked {
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
        fn is_multi_forked(&self, tid: ThreadId) -> bool {
            tid == ThreadId(1)
        }
        fn fork_site(&self, tid: ThreadId) -> Option<CallSiteId> {
            (tid == ThreadId(1)).then_some(CallSiteId(2))
        }
        fn start_routine(&self, tid: ThreadId) -> FuncId {
            if tid == ThreadId(1) {
                FuncId(1)
            } else {
                FuncId(0)
            }
        }
    }

    let icfg = loop_icfg();
    let tcg = NeverJoins;
    let tct = MultiForked;
    assert!(tct.is_multi_forked(ThreadId(1)));

    let fj = forkjoin::analyze(&icfg, &tcg, &tct, &ExactAlias, &SameLoop, 2);
    let il = interleaving::analyze(&icfg, &tcg, &tct, &fj, 2);
    let query = Mhp::new(&il);

    let body_of_t2 = NodeId(10);
    assert!(query.may_happen_in_parallel(body_of_t2, body_of_t2));
}

/// Scenario 6: the call graph reports thread 1 as a join candidate at the
/// join site, but the join's handle object does not alias the forked
/// handle object, so `forkjoin::analyze`'s own alias check rejects it.
/// `direct_join` stays empty and the thread is never removed from the
/// interleaving set, so the conservative `true` answer survives past the
/// join.
#[test]
fn unaliased_join_leaves_interleaving_conservative() {
    struct UnaliasedJoin;
    impl ThreadCallGraph for UnaliasedJoin {
        fn is_fork_site(&self, call_site: CallSiteId) -> bool {
            call_site == CallSiteId(2)
        }
        fn is_join_site(&self, call_site: CallSiteId) -> bool {
            call_site == CallSiteId(3)
        }
        fn fork_start_routine(&self, call_site: CallSiteId) -> Option<FuncId> {
            (call_site == CallSiteId(2)).then_some(FuncId(1))
        }
        fn spawned_thread(&self, call_site: CallSiteId) -> Option<ThreadId> {
            (call_site == CallSiteId(2)).then_some(ThreadId(1))
        }
        // The call graph itself reports thread 1 as a join candidate here;
        // it is the handle objects below that fail to alias, which is what
        // `forkjoin::analyze` must catch on its own.
        fn joined_thread_candidates(&self, call_site: CallSiteId) -> Vec<ThreadId> {
            if call_site == CallSiteId(3) {
                vec![ThreadId(1)]
            } else {
                vec![]
            }
        }
        fn fork_handle_object(&self, _call_site: CallSiteId) -> Option<ObjectId> {
            Some(ObjectId(1))
        }
        fn join_handle_object(&self, _call_site: CallSiteId) -> Option<ObjectId> {
            Some(ObjectId(2))
        }
    }

    let icfg = loop_icfg();
    let tcg = UnaliasedJoin;
    let tct = OneThread;

    let fj = forkjoin::analyze(&icfg, &tcg, &tct, &ExactAlias, &SameLoop, 2);
    assert!(fj.direct_join.is_empty());

    let il = interleaving::analyze(&icfg, &tcg, &tct, &fj, 2);
    let query = Mhp::new(&il);

    let after_join = NodeId(1);
    let body_of_t2 = NodeId(10);
    assert!(query.may_happen_in_parallel(after_join, body_of_t2));
}
