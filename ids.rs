//! Newtype identifiers shared by the lattice (C1) and MHP (C2) cores.
//!
//! These are opaque handles into data owned by the host analysis (the ICFG,
//! the thread creation tree, ...); this crate never constructs them from
//! anything but a `u32`/`u64` the oracle gave it (spec.md §5, "back-references
//! ... stored as ids, not owning references").

use derive_more::Display;

/// A source-level variable (local, parameter, or global).
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "v{}", _0)]
pub struct VarId(pub u32);

/// A memory object (the target of an `AddrOf`/`Alloc`-like instruction, or any
/// other address-taken location the host's pointer analysis tracks).
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "o{}", _0)]
pub struct ObjectId(pub u32);

/// A thread identifier, as assigned by the thread creation tree (TCT). Thread
/// 0 is conventionally `main`.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "t{}", _0)]
pub struct ThreadId(pub u32);

/// A function in the host's interprocedural CFG.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "f{}", _0)]
pub struct FuncId(pub u32);

/// A node in the interprocedural control-flow graph (ICFG).
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "n{}", _0)]
pub struct NodeId(pub u32);

/// A call-site node, used to build [`crate::oracles::CallingContext`]s. Every
/// call site is also an [`NodeId`]; this newtype exists so the context-string
/// API cannot be confused with an arbitrary ICFG node.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "cs{}", _0)]
pub struct CallSiteId(pub u32);

impl From<NodeId> for CallSiteId {
    fn from(n: NodeId) -> Self {
        CallSiteId(n.0)
    }
}
