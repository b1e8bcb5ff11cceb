//! Shared aliases and small helpers used across the crate.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// All maps in this crate are sorted-key maps: spec.md §9 requires iteration
/// order to be deterministic anywhere it is externally observable (printing,
/// hashing, equality).
pub type Map<K, V> = BTreeMap<K, V>;
pub type Set<T> = BTreeSet<T>;

/// FNV-flavored pairwise mix, used to combine the per-entry hashes of the two
/// state maps into a single content hash (spec.md §9, "Iteration-order
/// determinism"). Mirrors the constant used by the source implementation this
/// core was distilled from (`0x9e3779b9`, the golden-ratio Fibonacci hashing
/// constant also used by Boost's `hash_combine`).
pub fn mix_hash(acc: u64, item: u64) -> u64 {
    acc ^ (item
        .wrapping_add(0x9e3779b9)
        .wrapping_add(acc << 6)
        .wrapping_add(acc >> 2))
}

/// Hash an iterator of items (each already reduced to a `u64`) into a single
/// deterministic value, independent of the iteration order the caller used to
/// build the underlying collection, as long as the caller iterates in sorted
/// key order (which every `Map`/`Set` in this crate guarantees).
pub fn hash_sorted<I: IntoIterator<Item = u64>>(items: I) -> u64 {
    let mut acc = 0u64;
    for item in items {
        acc = mix_hash(acc, item);
    }
    acc
}

/// Hash a single `Hash` value down to a `u64` using the standard library's
/// default hasher, for feeding into [`mix_hash`]/[`hash_sorted`].
pub fn hash_one<T: Hash>(value: &T) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
