//! Spatial node tree.
//!
//! One arena of nodes forms one or more rooted trees, each lineage owned by
//! a single data source. The tree owns node storage outright; parent links
//! are non-owning id lookups, so there are no cyclic ownership graphs and an
//! evicted subtree frees in one pass. Node ids are monotonic and never
//! reused — a stale id held by a late async completion simply fails its
//! lookup instead of touching a recycled slot.
//!
//! All mutation happens on the refinement-pass thread (completions are
//! drained there before the pass reads any state), which is why nothing in
//! this module needs a lock.

mod node;
mod store;

pub use node::{BoundingSphere, DataSourceId, Node, NodeId, NodeState, RefinementMode};
pub use store::{NodeTree, RootDescriptor, TreeError};
