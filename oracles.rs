//! External collaborator interfaces (spec.md §6).
//!
//! This crate is the analysis core only: it never builds an ICFG, a call
//! graph, a thread creation tree, points-to sets, or loop trip counts itself.
//! Those all come from a host compiler and are exposed here as traits so the
//! core can be driven by a test double in unit tests and by the real thing in
//! production — grounded on the oracle-style split in spec.md §6 and on how
//! `examples/original_source/svf/include/MTA/MHP.h` leans on `SVFIR`,
//! `ThreadCallGraph`, `TCT`, and `PTAStat` as given collaborators rather than
//! recomputing them.

use crate::ids::{CallSiteId, FuncId, NodeId, ObjectId, ThreadId};
use std::fmt;

/// The interprocedural control-flow graph. Every traversal in this crate
/// (the generic fixpoint driver, fork/join, interleaving) walks this graph,
/// never a concrete CFG type.
pub trait Icfg {
    /// Successor nodes of `node` (branch/fallthrough/call/return edges all
    /// folded together; callers distinguish via [`Icfg::is_call`]/
    /// [`Icfg::is_return`]).
    fn succs(&self, node: NodeId) -> Vec<NodeId>;

    fn preds(&self, node: NodeId) -> Vec<NodeId>;

    /// Whether `node` is a loop header for widening purposes (spec.md §4.3).
    fn is_loop_header(&self, node: NodeId) -> bool;

    /// The innermost loop header enclosing `node`, if any. Consulted by the
    /// symmetric-loop-join check (spec.md §4.4) to compare a fork's loop
    /// against a join's loop.
    fn enclosing_loop_header(&self, node: NodeId) -> Option<NodeId>;

    fn entry(&self, func: FuncId) -> NodeId;
    fn exit(&self, func: FuncId) -> NodeId;
    fn func_of(&self, node: NodeId) -> FuncId;

    /// `Some(call_site)` iff `node` is a call instruction.
    fn is_call(&self, node: NodeId) -> Option<CallSiteId>;

    /// `Some(call_site)` iff `node` is the return site that resumes right
    /// after `call_site` in the caller.
    fn is_return(&self, node: NodeId) -> Option<CallSiteId>;

    /// Every function a call site might dispatch to (more than one under
    /// imprecise points-to info for an indirect call).
    fn callees(&self, call_site: CallSiteId) -> Vec<FuncId>;
}

/// Thread-creation edges layered on top of the call graph (spec.md §6):
/// which call sites spawn threads, and which join them.
pub trait ThreadCallGraph {
    fn is_fork_site(&self, call_site: CallSiteId) -> bool;
    fn is_join_site(&self, call_site: CallSiteId) -> bool;

    /// The routine a fork site starts running in the new thread, if known.
    fn fork_start_routine(&self, call_site: CallSiteId) -> Option<FuncId>;

    /// The thread id a fork site spawns. One fork site corresponds to
    /// exactly one synthetic thread id even when it is multi-forked (spec.md
    /// §5's thread-creation-tree model collapses a loop-forked site to one
    /// node flagged `multi_forked`, not one node per dynamic instance).
    fn spawned_thread(&self, call_site: CallSiteId) -> Option<ThreadId>;

    /// Which thread(s) a join site might join. More than one entry means the
    /// handle being joined is not uniquely resolved (spec.md §7, "unaliased
    /// handle" — the analysis must treat every candidate conservatively).
    fn joined_thread_candidates(&self, call_site: CallSiteId) -> Vec<ThreadId>;

    /// The memory object backing the `pthread_t`-like handle a fork site
    /// writes, if the pointer analysis tracks it as address-taken.
    fn fork_handle_object(&self, call_site: CallSiteId) -> Option<ObjectId>;

    /// The memory object backing the handle a join site reads.
    fn join_handle_object(&self, call_site: CallSiteId) -> Option<ObjectId>;
}

/// The thread creation tree (spec.md §5).
pub trait Tct {
    fn main_thread(&self) -> ThreadId;
    fn parent(&self, tid: ThreadId) -> Option<ThreadId>;
    fn children(&self, tid: ThreadId) -> Vec<ThreadId>;
    fn siblings(&self, tid: ThreadId) -> Vec<ThreadId>;

    /// True iff the fork site that spawned `tid` is inside a loop or
    /// recursive call (spec.md §5) — every dynamic instance collapses onto
    /// this one static thread id, so joins against it must stay conservative.
    fn is_multi_forked(&self, tid: ThreadId) -> bool;

    fn fork_site(&self, tid: ThreadId) -> Option<CallSiteId>;

    /// The function `tid` starts executing in (the fork's start-routine
    /// argument, or `main` for the main thread).
    fn start_routine(&self, tid: ThreadId) -> FuncId;

    /// True iff `ancestor` is `tid` or a transitive parent of `tid`.
    fn is_ancestor_of(&self, ancestor: ThreadId, tid: ThreadId) -> bool {
        let mut cur = tid;
        loop {
            if cur == ancestor {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }
}

/// Points-to facts, consulted only to decide whether two `pthread_t` handles
/// (or fork/join sites) can refer to the same dynamic thread.
pub trait PointerAnalysis {
    fn may_alias(&self, a: ObjectId, b: ObjectId) -> bool;
}

/// Loop trip-count facts, consulted only by the symmetric-loop-join check
/// (spec.md §5, C2a): a fork and a join inside the same loop body join every
/// iteration's thread to itself, rather than the whole set to the whole set,
/// when the loop's trip count on both paths provably matches.
pub trait ScalarEvolution {
    fn same_trip_count(&self, loop_a: NodeId, loop_b: NodeId) -> bool;
}

/// A k-bounded call string (spec.md §5, "k-CFA context sensitivity").
/// Pushing past `k` silently drops the oldest call site rather than erroring
/// — truncation is the whole point of bounding k, not a failure mode.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallingContext {
    k: usize,
    cs: Vec<CallSiteId>,
}

impl CallingContext {
    pub fn empty(k: usize) -> Self {
        Self { k, cs: Vec::new() }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn sites(&self) -> &[CallSiteId] {
        &self.cs
    }

    /// Push `site` onto the context, truncating to the oldest `k` entries.
    pub fn push(&self, site: CallSiteId) -> CallingContext {
        let mut cs = self.cs.clone();
        cs.push(site);
        if cs.len() > self.k {
            cs.remove(0);
        }
        CallingContext { k: self.k, cs }
    }

    /// Pop the most recent call site (the inverse of [`Self::push`]), used
    /// when stepping a return edge back to the caller's context. A context
    /// truncated by `k` cannot always be popped back exactly; `None` means
    /// the call string is empty (already at the top-level context).
    pub fn pop(&self) -> Option<CallingContext> {
        if self.cs.is_empty() {
            return None;
        }
        let mut cs = self.cs.clone();
        cs.pop();
        Some(CallingContext { k: self.k, cs })
    }

    /// Two contexts are compatible call/return partners iff they are equal —
    /// under truncation this is an approximation (a context beyond the `k`
    /// horizon is indistinguishable from any other with the same suffix),
    /// which is exactly the imprecision k-CFA accepts by construction.
    pub fn matches(&self, other: &CallingContext) -> bool {
        self == other
    }
}

impl fmt::Display for CallingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, cs) in self.cs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{cs}")?;
        }
        write!(f, "]")
    }
}

/// A context-qualified ICFG node (spec.md §5).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CxtStmt {
    pub cxt: CallingContext,
    pub node: NodeId,
}

impl CxtStmt {
    pub fn new(cxt: CallingContext, node: NodeId) -> Self {
        Self { cxt, node }
    }
}

impl fmt::Display for CxtStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node, self.cxt)
    }
}

/// A context- and thread-qualified ICFG node (spec.md §5) — the unit the
/// interleaving analysis (C2b) propagates facts over.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CxtThreadStmt {
    pub cxt: CallingContext,
    pub tid: ThreadId,
    pub node: NodeId,
}

impl CxtThreadStmt {
    pub fn new(cxt: CallingContext, tid: ThreadId, node: NodeId) -> Self {
        Self { cxt, tid, node }
    }

    pub fn as_cxt_stmt(&self) -> CxtStmt {
        CxtStmt::new(self.cxt.clone(), self.node)
    }
}

impl fmt::Display for CxtThreadStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.node, self.tid, self.cxt)
    }
}

/// Step `node` one ICFG edge forward under context sensitivity, shared by
/// both C2a (`forkjoin.rs`) and C2b (`interleaving.rs`) — they differ only
/// in what they propagate along these edges and how fork/join sites are
/// special-cased on top, not in how the call string is threaded (spec.md
/// §4.4/§4.5, "context must match").
///
/// - A call edge into a callee's entry pushes `call_site` onto the context.
/// - An edge from a function's exit back to the matching return site pops
///   the context, but only when the popped context's most recent call site
///   agrees with this return's call site; a context already truncated to
///   empty by the `k` bound is treated as matching anything (conservative).
/// - Every other edge carries the context unchanged.
pub fn step_successors<I: Icfg>(
    icfg: &I,
    cxt: &CallingContext,
    node: NodeId,
) -> Vec<(CallingContext, NodeId)> {
    let call_here = icfg.is_call(node);
    let at_exit = icfg.exit(icfg.func_of(node)) == node;
    let mut out = Vec::new();

    for succ in icfg.succs(node) {
        if let Some(call_site) = call_here {
            let callees = icfg.callees(call_site);
            if callees.iter().any(|&f| icfg.entry(f) == succ) {
                out.push((cxt.push(call_site), succ));
                continue;
            }
        }
        if at_exit {
            if let Some(call_site) = icfg.is_return(succ) {
                if icfg.callees(call_site).contains(&icfg.func_of(node)) {
                    match cxt.sites().last() {
                        Some(&last) if last == call_site => {
                            out.push((cxt.pop().expect("non-empty context"), succ));
                        }
                        Some(_) => {}
                        None => out.push((cxt.clone(), succ)),
                    }
                    continue;
                }
            }
        }
        out.push((cxt.clone(), succ));
    }
    out
}
