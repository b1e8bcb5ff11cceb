//! C2b — Interleaving Analysis (spec.md §4.5).
//!
//! Propagates, for every context- and thread-qualified ICFG node, the set of
//! thread ids that may be alive concurrently with it. Grounded on `MHP` in
//! `examples/original_source/svf/include/MTA/MHP.h` (`threadStmtToTheadInterLeav`,
//! `instToTSMap`, `handleFork`/`handleJoin`/`updateAncestorThreads`/
//! `updateSiblingThreads`, `updateNonCandidateFunInterleaving`), consuming
//! C2a's [`crate::forkjoin::ForkJoinResults`] for the `is_must_join` gate.

use crate::commons::{Map, Set};
use crate::forkjoin::ForkJoinResults;
use crate::ids::{NodeId, ThreadId};
use crate::oracles::{step_successors, CallingContext, CxtThreadStmt, Icfg, Tct, ThreadCallGraph};
use std::collections::VecDeque;

/// Output of C2b: per-`CxtThreadStmt` interleaving sets plus the reverse
/// index from a plain ICFG node to every `CxtThreadStmt` that reaches it —
/// the shape [`crate::mhp::Mhp`] queries against.
#[derive(Clone, Debug, Default)]
pub struct InterleavingResults {
    pub interleav: Map<CxtThreadStmt, Set<ThreadId>>,
    pub inst_to_cts: Map<NodeId, Set<CxtThreadStmt>>,
}

fn record(results: &mut InterleavingResults, cts: &CxtThreadStmt) {
    results
        .inst_to_cts
        .entry(cts.node)
        .or_default()
        .insert(cts.clone());
}

fn merge_into(
    results: &mut InterleavingResults,
    worklist: &mut VecDeque<CxtThreadStmt>,
    cts: CxtThreadStmt,
    incoming: &Set<ThreadId>,
) {
    let slot = results.interleav.entry(cts.clone()).or_default();
    let before = slot.len();
    slot.extend(incoming.iter().copied());
    let changed = slot.len() != before;
    if changed {
        record(results, &cts);
        worklist.push_back(cts);
    }
}

/// `is_must_join` (spec.md §4.5): the join's directly+indirectly joined set
/// contains `t'`, AND the join is not inside an asymmetric loop (either it
/// is outside any loop, or C2a recorded it as the symmetric-loop pattern —
/// the alias/SCEV predicate from §4.4 is folded into that recording).
fn is_must_join(
    icfg: &impl Icfg,
    forkjoin: &ForkJoinResults,
    join_cts: &CxtThreadStmt,
    tid: ThreadId,
) -> bool {
    let join_cs = join_cts.as_cxt_stmt();
    if !forkjoin.dir_and_ind_joined_tid(&join_cs).contains(&tid) {
        return false;
    }
    icfg.enclosing_loop_header(join_cts.node).is_none() || forkjoin.cxt_join_in_loop.contains(&join_cs)
}

/// Every thread id known to the TCT (main plus every forked thread),
/// collected by walking child links from `main`.
fn all_thread_ids(tct: &impl Tct) -> Vec<ThreadId> {
    let mut out = vec![tct.main_thread()];
    let mut stack = vec![tct.main_thread()];
    let mut seen: Set<ThreadId> = Set::new();
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

/// Run the interleaving analysis, given C2a's results.
#[tracing::instrument(skip_all, fields(k))]
pub fn analyze(
    icfg: &impl Icfg,
    tcg: &impl ThreadCallGraph,
    tct: &impl Tct,
    forkjoin: &ForkJoinResults,
    k: usize,
) -> InterleavingResults {
    tracing::Span::current().record("k", k);
    let mut results = InterleavingResults::default();
    let mut worklist: VecDeque<CxtThreadStmt> = VecDeque::new();

    for t in all_thread_ids(tct) {
        let entry_node = icfg.entry(tct.start_routine(t));
        let seed = CxtThreadStmt::new(CallingContext::empty(k), t, entry_node);
        let seed_set: Set<ThreadId> = Set::from([t]);
        tracing::debug!(thread = t.0, %entry_node, "seeding interleaving worklist at thread entry");
        merge_into(&mut results, &mut worklist, seed, &seed_set);
    }

    while let Some(cts) = worklist.pop_front() {
        let current = results.interleav.get(&cts).cloned().unwrap_or_default();
        tracing::trace!(%cts, set_size = current.len(), "interleaving worklist pop");
        if current.is_empty() {
            continue;
        }

        let fork_call = icfg
            .is_call(cts.node)
            .filter(|&call| tcg.is_fork_site(call) && tcg.spawned_thread(call).is_some());

        if let Some(call_site) = fork_call {
            let child = tcg.spawned_thread(call_site).expect("checked above");
            for (ncxt, nnode) in step_successors(icfg, &cts.cxt, cts.node) {
                let succ_cts = CxtThreadStmt::new(ncxt, cts.tid, nnode);
                let mut to_add = current.clone();
                to_add.insert(child);

                for ancestor in ancestors_of(tct, cts.tid) {
                    if tct.is_multi_forked(ancestor) {
                        to_add.insert(ancestor);
                    }
                }
                for sibling in tct.siblings(cts.tid) {
                    if !forkjoin.is_hb(sibling, cts.tid) || forkjoin.is_hp(sibling, cts.tid) {
                        to_add.insert(sibling);
                    }
                }
                merge_into(&mut results, &mut worklist, succ_cts, &to_add);
            }
            continue;
        }

        let join_call = icfg.is_call(cts.node).filter(|&call| tcg.is_join_site(call));

        if join_call.is_some() {
            let joined: Set<ThreadId> = current
                .iter()
                .copied()
                .filter(|&t| is_must_join(icfg, forkjoin, &cts, t))
                .collect();
            let remaining: Set<ThreadId> = current.difference(&joined).copied().collect();
            for (ncxt, nnode) in step_successors(icfg, &cts.cxt, cts.node) {
                let succ_cts = CxtThreadStmt::new(ncxt, cts.tid, nnode);
                merge_into(&mut results, &mut worklist, succ_cts, &remaining);
            }
            continue;
        }

        for (ncxt, nnode) in step_successors(icfg, &cts.cxt, cts.node) {
            let succ_cts = CxtThreadStmt::new(ncxt, cts.tid, nnode);
            merge_into(&mut results, &mut worklist, succ_cts, &current);
        }
    }

    results
}

fn ancestors_of(tct: &impl Tct, tid: ThreadId) -> Vec<ThreadId> {
    let mut out = Vec::new();
    let mut cur = tid;
    while let Some(p) = tct.parent(cur) {
        out.push(p);
        cur = p;
    }
    out
}

/// Non-candidate functions (spec.md §4.5): functions unreachable from any
/// thread entry via forkable edges skip the worklist entirely — their
/// interleaving is whatever reaches their entry, copied to every node in one
/// pass.
pub fn propagate_non_candidate_function(
    results: &mut InterleavingResults,
    entry: &CxtThreadStmt,
    internal_nodes: impl IntoIterator<Item = NodeId>,
) {
    let entry_set = results.interleav.get(entry).cloned().unwrap_or_default();
    for node in internal_nodes {
        let cts = CxtThreadStmt::new(entry.cxt.clone(), entry.tid, node);
        results.interleav.insert(cts.clone(), entry_set.clone());
        record(results, &cts);
    }
}
