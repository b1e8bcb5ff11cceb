//! Whole-program static value-flow analysis core.
//!
//! Two independent analyses share one crate: C1 is an abstract-interpretation
//! state (intervals and symbolic addresses, joined/widened/narrowed to a
//! fixpoint by the driver in [`fixpoint`]), and C2 is a may-happen-in-parallel
//! analysis over a thread-creation tree ([`forkjoin`] for fork/join flags,
//! [`interleaving`] for the interleaving worklist, [`mhp`] for the query
//! facade tying both together). Everything this crate does not itself compute
//! — ICFG construction, pointer analysis, the thread call graph, loop trip
//! counts — is consumed through the [`oracles`] traits.

pub mod commons;
pub mod config;
pub mod error;
pub mod fixpoint;
pub mod forkjoin;
pub mod ids;
pub mod interleaving;
pub mod mhp;
pub mod oracles;
pub mod state;
pub mod value;

#[cfg(test)]
pub fn init_tracing_for_tests() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
