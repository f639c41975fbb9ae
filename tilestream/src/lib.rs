//! Tilestream - hierarchical geospatial content streaming core
//!
//! This library decides *what* content exists and *when* it is swapped for a
//! hierarchical tile/node streaming host. It maintains a tree of spatial
//! nodes tagged with content types, resolves each node's content
//! asynchronously through pluggable loaders, chooses per tick which nodes to
//! load, keep or evict from a geometric-error metric, and merges or replaces
//! a parent's content with its children's as level-of-detail transitions
//! occur. Rendering, file formats and I/O belong to the host's loaders.
//!
//! # Architecture
//!
//! - [`content`] — content-type identity and the loader registry
//! - [`loader`] — the loader capability trait and URI-scheme dispatch
//! - [`tree`] — the arena of spatial nodes
//! - [`schedule`] — async load issue/cancel/complete, one in flight per node
//! - [`refine`] — the per-tick refinement pass and render set
//! - [`engine`] — the embedding facade tying the pieces together

pub mod content;
pub mod engine;
pub mod loader;
pub mod refine;
pub mod schedule;
pub mod tree;

pub use content::{ContentType, ContentTypeGenerator, LoaderRegistry, RegistryError};
pub use engine::{EngineError, EngineStats, StreamingEngine, TickStats};
pub use loader::{
    BoxFuture, ChildDescriptor, DuplicateScheme, LoadError, LoadOutcome, LoadRequest, NodeLoader,
    SchemeLoader, Uri,
};
pub use refine::{PassStats, RefinePolicy, RenderEntry, RenderSet, ViewParameters};
pub use schedule::{LoadFailure, LoadScheduler, ScheduleError};
pub use tree::{
    BoundingSphere, DataSourceId, Node, NodeId, NodeState, NodeTree, RefinementMode,
    RootDescriptor, TreeError,
};
