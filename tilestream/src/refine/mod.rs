//! Refinement: deciding what to show, load and release each tick.
//!
//! Once per update tick the engine runs a single-threaded refinement pass
//! over every rooted tree. For each resolved node it scales the geometric
//! error into view space and compares it against the threshold: too coarse
//! means descend (requesting child loads as needed), fine enough means show
//! the node itself. Transitions never block — a node whose children are not
//! ready keeps displaying its own content, and a node whose load failed is
//! covered by its nearest loaded ancestor.
//!
//! The pass ends with grace-period eviction: subtrees that have gone
//! unvisited for a configurable number of ticks are released deepest-first.

mod pass;
mod policy;
mod view;

pub(crate) use pass::run_pass;
pub use pass::{PassStats, RenderEntry, RenderSet};
pub use policy::RefinePolicy;
pub use view::ViewParameters;
