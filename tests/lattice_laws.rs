//! Property-based checks of the interval lattice laws (spec.md §8,
//! "Lattice laws (C1)"). Hand-rolled round-trip grids are avoided in favor of
//! asserting the algebraic laws directly over arbitrary intervals, the way
//! `bytecodealliance-wasmtime` and `tokamak-network-ethrex` use `proptest`.

use proptest::prelude::*;
use valueflow_core::value::{ExtendedI64, Interval};

fn arb_bound() -> impl Strategy<Value = ExtendedI64> {
    prop_oneof![
        Just(ExtendedI64::NegInf),
        Just(ExtendedI64::PosInf),
        (-1000i64..1000i64).prop_map(ExtendedI64::Finite),
    ]
}

fn arb_interval() -> impl Strategy<Value = Interval> {
    prop_oneof![
        1 => Just(Interval::BOTTOM),
        4 => (arb_bound(), arb_bound()).prop_map(|(a, b)| Interval::range(a.min(b), a.max(b))),
    ]
}

proptest! {
    #[test]
    fn join_is_idempotent(a in arb_interval()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn meet_is_idempotent(a in arb_interval()) {
        prop_assert_eq!(a.meet(&a), a);
    }

    #[test]
    fn join_is_commutative(a in arb_interval(), b in arb_interval()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn meet_is_commutative(a in arb_interval(), b in arb_interval()) {
        prop_assert_eq!(a.meet(&b), b.meet(&a));
    }

    #[test]
    fn absorption(a in arb_interval(), b in arb_interval()) {
        prop_assert_eq!(a.join(&a.meet(&b)), a);
    }

    #[test]
    fn widening_covers_join(a in arb_interval(), b in arb_interval()) {
        let joined = a.join(&b);
        let widened = a.widen(&b);
        prop_assert!(widened.geq(&joined));
    }

    #[test]
    fn narrowing_refines(a in arb_interval(), b in arb_interval()) {
        let narrowed = a.narrow(&b);
        prop_assert!(a.geq(&narrowed));
        prop_assert!(narrowed.geq(&a.meet(&b)));
    }

    /// `x := x ⊔ f(x)` for a monotone, bound-respecting `f` reaches a
    /// fixpoint in a bounded number of steps (spec.md §8, "Termination").
    /// `f` here saturates at a fixed ceiling so the ascending chain is
    /// finite without needing widening.
    #[test]
    fn join_iteration_terminates(start in -50i64..50i64, ceiling in 0i64..200i64) {
        let ceiling = start + ceiling;
        let mut x = Interval::constant(start);
        let f = |cur: &Interval| match cur {
            Interval::Bottom => Interval::Bottom,
            Interval::Range(_, ub) => {
                let next = match ub {
                    ExtendedI64::Finite(n) if *n < ceiling => ExtendedI64::Finite(*n + 1),
                    other => *other,
                };
                Interval::range(ExtendedI64::Finite(start), next)
            }
        };
        let mut steps = 0;
        loop {
            let next = x.join(&f(&x));
            if next == x {
                break;
            }
            x = next;
            steps += 1;
            prop_assert!(steps <= (ceiling - start + 2) as usize, "did not converge in bounded steps");
        }
    }
}
