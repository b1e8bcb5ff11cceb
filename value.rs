//! C1 — Abstract Value (spec.md §3, §4.1).
//!
//! A tagged union of an interval over the extended integers and a set of
//! symbolic object addresses. Grounded on `AbstractValue`/`IntervalValue`/
//! `AddressValue` in `examples/original_source/svf/include/AE/Core/
//! IntervalExeState.h`, with the Rust encoding style (a `Copy` enum over
//! extended bounds) taken from `middle_end/analysis/integer_interval.rs`'s
//! `Value` in the teacher crate.

use crate::commons::Set;
use std::cmp::{max, min};
use std::fmt;

/// An integer extended with ±∞, ordered so that `NegInf < Finite(n) <
/// PosInf` for every `n` (derived `Ord` relies on declaration order giving
/// exactly this discriminant ranking).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtendedI64 {
    NegInf,
    Finite(i64),
    PosInf,
}

impl ExtendedI64 {
    pub fn as_finite(self) -> Option<i64> {
        match self {
            ExtendedI64::Finite(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for ExtendedI64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtendedI64::NegInf => write!(f, "-inf"),
            ExtendedI64::Finite(n) => write!(f, "{n}"),
            ExtendedI64::PosInf => write!(f, "+inf"),
        }
    }
}

/// The interval domain (spec.md §4.1). `Bottom` is the empty interval (⊥);
/// `Range(NegInf, PosInf)` is ⊤.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Interval {
    Bottom,
    Range(ExtendedI64, ExtendedI64),
}

impl Interval {
    pub const BOTTOM: Interval = Interval::Bottom;

    pub fn top() -> Interval {
        Interval::Range(ExtendedI64::NegInf, ExtendedI64::PosInf)
    }

    pub fn constant(n: i64) -> Interval {
        Interval::Range(ExtendedI64::Finite(n), ExtendedI64::Finite(n))
    }

    pub fn range(lb: ExtendedI64, ub: ExtendedI64) -> Interval {
        if lb > ub {
            Interval::Bottom
        } else {
            Interval::Range(lb, ub)
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Interval::Bottom)
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Interval::Range(ExtendedI64::NegInf, ExtendedI64::PosInf))
    }

    pub fn set_to_bottom(&mut self) {
        *self = Interval::Bottom;
    }

    pub fn set_to_top(&mut self) {
        *self = Interval::top();
    }

    /// True iff this interval denotes exactly one concrete value.
    pub fn is_numeral(&self) -> bool {
        matches!(self, Interval::Range(ExtendedI64::Finite(a), ExtendedI64::Finite(b)) if a == b)
    }

    pub fn numeral(&self) -> Option<i64> {
        match self {
            Interval::Range(ExtendedI64::Finite(a), ExtendedI64::Finite(b)) if a == b => Some(*a),
            _ => None,
        }
    }

    /// Interval hull (join). ⊥ is the identity.
    pub fn join(&self, rhs: &Interval) -> Interval {
        match (self, rhs) {
            (Interval::Bottom, _) => *rhs,
            (_, Interval::Bottom) => *self,
            (Interval::Range(l1, u1), Interval::Range(l2, u2)) => {
                Interval::Range(min(*l1, *l2), max(*u1, *u2))
            }
        }
    }

    pub fn join_with(&mut self, rhs: &Interval) -> bool {
        let joined = self.join(rhs);
        let changed = joined != *self;
        *self = joined;
        changed
    }

    /// Interval intersection (meet). An empty intersection collapses to ⊥.
    pub fn meet(&self, rhs: &Interval) -> Interval {
        match (self, rhs) {
            (Interval::Bottom, _) | (_, Interval::Bottom) => Interval::Bottom,
            (Interval::Range(l1, u1), Interval::Range(l2, u2)) => {
                Interval::range(max(*l1, *l2), min(*u1, *u2))
            }
        }
    }

    pub fn meet_with(&mut self, rhs: &Interval) -> bool {
        let met = self.meet(rhs);
        let changed = met != *self;
        *self = met;
        changed
    }

    /// Cousot widening: drop a bound to infinity the moment `rhs` would move
    /// it outward. Must only be applied after a join (spec.md §4.3) — the
    /// caller, not this function, enforces that via the fixpoint phase
    /// machine in `fixpoint.rs`.
    pub fn widen(&self, rhs: &Interval) -> Interval {
        match (self, rhs) {
            (Interval::Bottom, _) => *rhs,
            (_, Interval::Bottom) => *self,
            (Interval::Range(l1, u1), Interval::Range(l2, u2)) => {
                let lb = if l2 < l1 { ExtendedI64::NegInf } else { *l1 };
                let ub = if u2 > u1 { ExtendedI64::PosInf } else { *u1 };
                Interval::Range(lb, ub)
            }
        }
    }

    pub fn widen_with(&mut self, rhs: &Interval) -> bool {
        let widened = self.widen(rhs);
        let changed = widened != *self;
        *self = widened;
        changed
    }

    /// Narrowing: only ever tightens an infinite bound toward `rhs`'s finite
    /// one; never moves a bound that is already finite.
    pub fn narrow(&self, rhs: &Interval) -> Interval {
        match (self, rhs) {
            (Interval::Bottom, _) => Interval::Bottom,
            (_, Interval::Bottom) => Interval::Bottom,
            (Interval::Range(l1, u1), Interval::Range(l2, u2)) => {
                let lb = if *l1 == ExtendedI64::NegInf { *l2 } else { *l1 };
                let ub = if *u1 == ExtendedI64::PosInf { *u2 } else { *u1 };
                Interval::range(lb, ub)
            }
        }
    }

    pub fn narrow_with(&mut self, rhs: &Interval) -> bool {
        let narrowed = self.narrow(rhs);
        let changed = narrowed != *self;
        *self = narrowed;
        changed
    }

    /// `self ⊇ rhs` as sets of concrete integers.
    pub fn geq(&self, rhs: &Interval) -> bool {
        match (self, rhs) {
            (_, Interval::Bottom) => true,
            (Interval::Bottom, _) => false,
            (Interval::Range(l1, u1), Interval::Range(l2, u2)) => l1 <= l2 && u1 >= u2,
        }
    }

    pub fn equals(&self, rhs: &Interval) -> bool {
        self == rhs
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Bottom => write!(f, "bottom"),
            Interval::Range(lb, ub) => write!(f, "[{lb}, {ub}]"),
        }
    }
}

/// The address domain (spec.md §4.1): a finite set of symbolic object ids.
/// Join = union, meet = intersection; widen and narrow both reduce to join,
/// since the universe of object ids the pointer analysis can ever hand us is
/// finite, so the ascending chain is already bounded without an accelerator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct AddressSet(pub Set<u32>);

impl AddressSet {
    pub const fn empty() -> AddressSet {
        AddressSet(Set::new())
    }

    pub fn singleton(addr: u32) -> AddressSet {
        let mut s = Set::new();
        s.insert(addr);
        AddressSet(s)
    }

    pub fn is_bottom(&self) -> bool {
        self.0.is_empty()
    }

    pub fn set_to_bottom(&mut self) {
        self.0.clear();
    }

    pub fn join(&self, rhs: &AddressSet) -> AddressSet {
        AddressSet(self.0.union(&rhs.0).copied().collect())
    }

    pub fn join_with(&mut self, rhs: &AddressSet) -> bool {
        let joined = self.join(rhs);
        let changed = joined != *self;
        *self = joined;
        changed
    }

    pub fn meet(&self, rhs: &AddressSet) -> AddressSet {
        AddressSet(self.0.intersection(&rhs.0).copied().collect())
    }

    pub fn meet_with(&mut self, rhs: &AddressSet) -> bool {
        let met = self.meet(rhs);
        let changed = met != *self;
        *self = met;
        changed
    }

    /// widen = narrow = join for the address-set variant (spec.md §4.1).
    pub fn widen_with(&mut self, rhs: &AddressSet) -> bool {
        self.join_with(rhs)
    }

    pub fn narrow_with(&mut self, rhs: &AddressSet) -> bool {
        self.join_with(rhs)
    }

    /// `self ⊇ rhs`.
    pub fn geq(&self, rhs: &AddressSet) -> bool {
        rhs.0.is_subset(&self.0)
    }
}

impl fmt::Display for AddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, a) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "0x{a:08x}")?;
        }
        write!(f, "}}")
    }
}

/// The top byte of a virtual memory address (spec.md §6, "Virtual-address
/// wire format").
pub const VIRTUAL_ADDR_TAG: u32 = 0x7F00_0000;
const VIRTUAL_ADDR_MASK: u32 = 0xFF00_0000;
const INTERNAL_ID_MASK: u32 = 0x00FF_FFFF;

/// Build a virtual memory address for object-id `idx` (low 24 bits).
pub fn virtual_address(idx: u32) -> u32 {
    VIRTUAL_ADDR_TAG | (idx & INTERNAL_ID_MASK)
}

/// Whether `addr`'s high byte marks it as a virtual memory address.
pub fn is_virtual(addr: u32) -> bool {
    (addr & VIRTUAL_ADDR_MASK) == VIRTUAL_ADDR_TAG
}

/// The low 24 bits: the internal object id a virtual address encodes.
pub fn internal_id(addr: u32) -> u32 {
    addr & INTERNAL_ID_MASK
}

/// A virtual address is null iff its internal id is zero.
pub fn is_null(addr: u32) -> bool {
    internal_id(addr) == 0
}

/// What happened when two [`AbstractValue`]s of differing variants (interval
/// vs. address-set) were combined. spec.md §9 documents this as a no-op but
/// asks implementers to surface a diagnostic rather than silently drop it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LatticeOutcome {
    Changed,
    Unchanged,
    VariantMismatch,
}

impl LatticeOutcome {
    pub fn changed(self) -> bool {
        matches!(self, LatticeOutcome::Changed)
    }
}

/// The tagged union described in spec.md §3/§4.1: every key in an abstract
/// state map carries either an interval or an address set, never both at
/// once.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AbstractValue {
    Interval(Interval),
    Addr(AddressSet),
}

impl AbstractValue {
    pub fn bottom_interval() -> AbstractValue {
        AbstractValue::Interval(Interval::Bottom)
    }

    pub fn top_interval() -> AbstractValue {
        AbstractValue::Interval(Interval::top())
    }

    pub fn bottom_addr() -> AbstractValue {
        AbstractValue::Addr(AddressSet::empty())
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, AbstractValue::Interval(_))
    }

    pub fn is_addr(&self) -> bool {
        matches!(self, AbstractValue::Addr(_))
    }

    pub fn as_interval(&self) -> Option<&Interval> {
        match self {
            AbstractValue::Interval(i) => Some(i),
            AbstractValue::Addr(_) => None,
        }
    }

    pub fn as_addr(&self) -> Option<&AddressSet> {
        match self {
            AbstractValue::Addr(a) => Some(a),
            AbstractValue::Interval(_) => None,
        }
    }

    pub fn is_bottom(&self) -> bool {
        match self {
            AbstractValue::Interval(i) => i.is_bottom(),
            AbstractValue::Addr(a) => a.is_bottom(),
        }
    }

    pub fn is_top(&self) -> bool {
        match self {
            AbstractValue::Interval(i) => i.is_top(),
            AbstractValue::Addr(_) => false,
        }
    }

    pub fn is_numeral(&self) -> bool {
        match self {
            AbstractValue::Interval(i) => i.is_numeral(),
            AbstractValue::Addr(_) => false,
        }
    }

    pub fn set_to_bottom(&mut self) {
        match self {
            AbstractValue::Interval(i) => i.set_to_bottom(),
            AbstractValue::Addr(a) => a.set_to_bottom(),
        }
    }

    pub fn set_to_top(&mut self) {
        match self {
            AbstractValue::Interval(i) => i.set_to_top(),
            AbstractValue::Addr(_) => {
                // No finite top for address sets; a widen-to-⊤ request on an
                // address key is itself only ever issued by code that is
                // agnostic to the variant, so this is a documented no-op.
            }
        }
    }

    /// `self ⊇ rhs`. Mixed variants are defined to be `false` rather than
    /// mirroring the original implementation's unconditional interval
    /// projection — see DESIGN.md, "geq on mixed variants".
    pub fn geq(&self, rhs: &AbstractValue) -> bool {
        match (self, rhs) {
            (AbstractValue::Interval(a), AbstractValue::Interval(b)) => a.geq(b),
            (AbstractValue::Addr(a), AbstractValue::Addr(b)) => a.geq(b),
            _ => false,
        }
    }

    /// Strict `<`, defined as `¬(≥)` — spec.md explicitly calls out not to
    /// reproduce the source's weaker comparator here.
    pub fn lt(&self, rhs: &AbstractValue) -> bool {
        !self.geq(rhs)
    }

    pub fn equals(&self, rhs: &AbstractValue) -> bool {
        self == rhs
    }

    fn combine(
        &mut self,
        rhs: &AbstractValue,
        on_interval: impl FnOnce(&mut Interval, &Interval) -> bool,
        on_addr: impl FnOnce(&mut AddressSet, &AddressSet) -> bool,
    ) -> LatticeOutcome {
        match (self, rhs) {
            (AbstractValue::Interval(a), AbstractValue::Interval(b)) => {
                if on_interval(a, b) {
                    LatticeOutcome::Changed
                } else {
                    LatticeOutcome::Unchanged
                }
            }
            (AbstractValue::Addr(a), AbstractValue::Addr(b)) => {
                if on_addr(a, b) {
                    LatticeOutcome::Changed
                } else {
                    LatticeOutcome::Unchanged
                }
            }
            _ => LatticeOutcome::VariantMismatch,
        }
    }

    pub fn join_with(&mut self, rhs: &AbstractValue) -> LatticeOutcome {
        self.combine(
            rhs,
            Interval::join_with,
            AddressSet::join_with,
        )
    }

    pub fn meet_with(&mut self, rhs: &AbstractValue) -> LatticeOutcome {
        self.combine(
            rhs,
            Interval::meet_with,
            AddressSet::meet_with,
        )
    }

    pub fn widen_with(&mut self, rhs: &AbstractValue) -> LatticeOutcome {
        self.combine(
            rhs,
            Interval::widen_with,
            AddressSet::widen_with,
        )
    }

    pub fn narrow_with(&mut self, rhs: &AbstractValue) -> LatticeOutcome {
        self.combine(
            rhs,
            Interval::narrow_with,
            AddressSet::narrow_with,
        )
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Interval(i) => write!(f, "{i}"),
            AbstractValue::Addr(a) => write!(f, "{a}"),
        }
    }
}
