//! C1 — Abstract State (spec.md §3, §4.2).
//!
//! Two maps (variable → value, memory object → value), plus a process-wide
//! global state with the same shape. Grounded on `IntervalExeState`/
//! `IntervalESBase` in `examples/original_source/svf/include/AE/Core/
//! IntervalExeState.h` (`_varToAbsVal`/`_locToAbsVal`, the local-then-global
//! lookup cascade, `joinWith`/`meetWith`/`widenWith`/`narrowWith`/`>=`), with
//! the global singleton re-architected per spec.md §9's design note into an
//! explicit [`GlobalState`] the caller threads alongside each local state
//! rather than a hidden `static`.

use crate::commons::{hash_one, hash_sorted, mix_hash, Map, Set};
use crate::error::{AbortError, ImprecisionCounter};
use crate::ids::{ObjectId, VarId};
use crate::value::{is_null, is_virtual, internal_id, AbstractValue, LatticeOutcome};
use std::fmt;

/// Content hash of a `(v, m)` pair, independent of the `BTreeMap`'s internal
/// layout — only of the sorted `(key, value)` entries it iterates in.
/// Mirrors `IntervalESBase::hash()`: hash `_varToAbsVal`, then `_locToAbsVal`,
/// then pair-hash the two (spec.md §9, "Iteration-order determinism").
fn content_hash_of(v: &Map<VarId, AbstractValue>, m: &Map<ObjectId, AbstractValue>) -> u64 {
    let v_hash = hash_sorted(v.iter().map(|entry| hash_one(&entry)));
    let m_hash = hash_sorted(m.iter().map(|entry| hash_one(&entry)));
    mix_hash(v_hash, m_hash)
}

/// The process-wide store: facts about globals and address-taken objects
/// observed across every function analyzed so far. Logically singular per
/// analysis run (spec.md §5), but represented here as an ordinary value the
/// top-level driver owns and passes by `&mut` — never a global/thread-local.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlobalState {
    pub v: Map<VarId, AbstractValue>,
    pub m: Map<ObjectId, AbstractValue>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic content hash of this state (spec.md §9).
    pub fn content_hash(&self) -> u64 {
        content_hash_of(&self.v, &self.m)
    }
}

/// A local abstract state for one program point. Reads cascade local → `G`;
/// writes go to the local map (spec.md §4.2's "key design point").
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbstractState {
    pub v: Map<VarId, AbstractValue>,
    pub m: Map<ObjectId, AbstractValue>,
}

impl AbstractState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(v: Map<VarId, AbstractValue>, m: Map<ObjectId, AbstractValue>) -> Self {
        Self { v, m }
    }

    /// Deterministic content hash of this state, independent of the order
    /// entries were inserted in (spec.md §9, "Iteration-order determinism").
    pub fn content_hash(&self) -> u64 {
        content_hash_of(&self.v, &self.m)
    }

    /// `load(addr)`: `addr` must be a virtual memory address. Local store
    /// wins; falling back to `G.m`; absent in both installs ⊤ into `G.m` and
    /// returns it (spec.md §4.2, §8 scenario 2).
    pub fn load(&self, global: &mut GlobalState, addr: u32) -> Result<AbstractValue, AbortError> {
        if !is_virtual(addr) {
            return Err(AbortError::NotAVirtualAddress {
                raw: addr,
                object: None,
            });
        }
        let oid = ObjectId(internal_id(addr));
        if let Some(v) = self.m.get(&oid) {
            return Ok(v.clone());
        }
        if let Some(v) = global.m.get(&oid) {
            return Ok(v.clone());
        }
        let top = AbstractValue::top_interval();
        global.m.insert(oid, top.clone());
        Ok(top)
    }

    /// `store(addr, v)`: a no-op on the null virtual address, otherwise
    /// overwrites the local slot for `internal_id(addr)`.
    pub fn store(&mut self, addr: u32, val: AbstractValue) -> Result<(), AbortError> {
        if !is_virtual(addr) {
            return Err(AbortError::NotAVirtualAddress {
                raw: addr,
                object: Some(ObjectId(internal_id(addr))),
            });
        }
        if is_null(addr) {
            return Ok(());
        }
        let oid = ObjectId(internal_id(addr));
        self.m.insert(oid, val);
        Ok(())
    }

    /// Local-then-global variable read. Absent in both installs an empty
    /// address set into `G.v` (spec.md §4.2) — not ⊤, matching the source's
    /// default for a never-seen variable id (it starts life as a pointer
    /// with no known targets, not an unconstrained integer).
    pub fn lookup_var(&self, global: &mut GlobalState, id: VarId) -> AbstractValue {
        if let Some(v) = self.v.get(&id) {
            return v.clone();
        }
        if let Some(v) = global.v.get(&id) {
            return v.clone();
        }
        let default = AbstractValue::bottom_addr();
        global.v.insert(id, default.clone());
        default
    }

    /// If `id` is address-taken and only lives in `G` so far, copy it into
    /// the local map so subsequent local writes do not alias the global
    /// entry (spec.md §8 scenario 3).
    pub fn copy_global_to_local(&mut self, global: &GlobalState, id: VarId) {
        if self.v.contains_key(&id) {
            return;
        }
        if let Some(v) = global.v.get(&id) {
            self.v.insert(id, v.clone());
        }
    }

    /// True iff any *interval*-typed entry in `v` or `m` is ⊥ (spec.md §4.2).
    pub fn has_bottom(&self) -> bool {
        self.v
            .values()
            .chain(self.m.values())
            .any(|val| val.as_interval().is_some_and(|i| i.is_bottom()))
    }

    /// Project this state down to a subset of variable ids.
    pub fn slice(&self, ids: &Set<VarId>) -> AbstractState {
        let v = self
            .v
            .iter()
            .filter(|(k, _)| ids.contains(k))
            .map(|(k, val)| (*k, val.clone()))
            .collect();
        AbstractState {
            v,
            m: Map::new(),
        }
    }

    fn merge_maps<K: Ord + Copy>(
        lhs: &mut Map<K, AbstractValue>,
        rhs: &Map<K, AbstractValue>,
        insert_new: bool,
        op: impl Fn(&mut AbstractValue, &AbstractValue) -> LatticeOutcome,
        imprecision: &ImprecisionCounter,
        site: &'static str,
    ) -> bool {
        let mut changed = false;
        for (key, rhs_val) in rhs {
            match lhs.get_mut(key) {
                Some(lhs_val) => match op(lhs_val, rhs_val) {
                    LatticeOutcome::Changed => changed = true,
                    LatticeOutcome::Unchanged => {}
                    LatticeOutcome::VariantMismatch => imprecision.record(site),
                },
                None if insert_new => {
                    lhs.insert(*key, rhs_val.clone());
                    changed = true;
                }
                None => {}
            }
        }
        changed
    }

    /// `join_with(other)`: pointwise join; keys only in `other` are inserted.
    pub fn join_with(&mut self, other: &AbstractState, imprecision: &ImprecisionCounter) -> bool {
        let v_changed = Self::merge_maps(
            &mut self.v,
            &other.v,
            true,
            AbstractValue::join_with,
            imprecision,
            "state::join_with(v)",
        );
        let m_changed = Self::merge_maps(
            &mut self.m,
            &other.m,
            true,
            AbstractValue::join_with,
            imprecision,
            "state::join_with(m)",
        );
        v_changed || m_changed
    }

    /// `meet_with(other)`: pointwise meet over keys present in *both*; keys
    /// absent in `self` stay absent (spec.md §4.2).
    pub fn meet_with(&mut self, other: &AbstractState, imprecision: &ImprecisionCounter) -> bool {
        let v_changed = Self::merge_maps(
            &mut self.v,
            &other.v,
            false,
            AbstractValue::meet_with,
            imprecision,
            "state::meet_with(v)",
        );
        let m_changed = Self::merge_maps(
            &mut self.m,
            &other.m,
            false,
            AbstractValue::meet_with,
            imprecision,
            "state::meet_with(m)",
        );
        v_changed || m_changed
    }

    /// `widen_with(other)`: for each key in `self` present in `other`, widen
    /// (interval) or join (address set, per spec.md §4.1). Never inserts new
    /// keys — widening narrows attention to what was already being tracked.
    pub fn widen_with(&mut self, other: &AbstractState, imprecision: &ImprecisionCounter) -> bool {
        let v_changed = Self::merge_maps(
            &mut self.v,
            &other.v,
            false,
            AbstractValue::widen_with,
            imprecision,
            "state::widen_with(v)",
        );
        let m_changed = Self::merge_maps(
            &mut self.m,
            &other.m,
            false,
            AbstractValue::widen_with,
            imprecision,
            "state::widen_with(m)",
        );
        v_changed || m_changed
    }

    pub fn narrow_with(&mut self, other: &AbstractState, imprecision: &ImprecisionCounter) -> bool {
        let v_changed = Self::merge_maps(
            &mut self.v,
            &other.v,
            false,
            AbstractValue::narrow_with,
            imprecision,
            "state::narrow_with(v)",
        );
        let m_changed = Self::merge_maps(
            &mut self.m,
            &other.m,
            false,
            AbstractValue::narrow_with,
            imprecision,
            "state::narrow_with(m)",
        );
        v_changed || m_changed
    }

    /// Map sizes equal and every key agrees on variant and value (spec.md
    /// §4.2).
    pub fn equals(&self, other: &AbstractState) -> bool {
        fn maps_equal<K: Ord>(a: &Map<K, AbstractValue>, b: &Map<K, AbstractValue>) -> bool {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|ov| ov.equals(v)))
        }
        maps_equal(&self.v, &other.v) && maps_equal(&self.m, &other.m)
    }

    /// `self ⊒ other`: for every key in `other`, `self` has it and is `≥`.
    pub fn geq(&self, other: &AbstractState) -> bool {
        fn map_geq<K: Ord>(lhs: &Map<K, AbstractValue>, rhs: &Map<K, AbstractValue>) -> bool {
            rhs.iter()
                .all(|(k, rv)| lhs.get(k).is_some_and(|lv| lv.geq(rv)))
        }
        map_geq(&self.v, &other.v) && map_geq(&self.m, &other.m)
    }

    /// Strict `<`, defined as `¬(≥)` (spec.md §9 — do not reproduce the
    /// source's looser `lessThanVarToValMap`).
    pub fn lt(&self, other: &AbstractState) -> bool {
        !self.geq(other)
    }
}

impl fmt::Display for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (var, val) in &self.v {
            if !val.is_bottom() {
                writeln!(f, "{var} -> {val}")?;
            }
        }
        for (obj, val) in &self.m {
            if !val.is_bottom() {
                writeln!(f, "*{obj} -> {val}")?;
            }
        }
        Ok(())
    }
}
