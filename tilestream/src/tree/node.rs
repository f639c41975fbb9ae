//! Node identity, state and per-node data.

use std::fmt;
use std::sync::Arc;

use glam::{DMat4, DVec3};

use crate::content::ContentType;
use crate::loader::Uri;

/// Stable identifier of a node in the tree.
///
/// Ids are issued monotonically by [`NodeTree`](super::NodeTree) and never
/// reused, so holding an id across eviction is safe: lookups just fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Wraps a raw id value. Intended for tests and diagnostics; real ids
    /// come from tree insertion.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    pub(crate) fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Identifier of one data source sharing the engine instance.
///
/// Supplied by the host, never generated by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSourceId(u64);

impl DataSourceId {
    /// Wraps a host-supplied id value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source:{}", self.0)
    }
}

/// How children's content relates to their parent's during refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefinementMode {
    /// Children's content supersedes the parent's once all of them are
    /// loaded; the parent's payload is retained but not displayed.
    #[default]
    Replace,
    /// Children's content is layered atop the parent's; both render.
    Add,
}

/// Load-lifecycle state of a node.
///
/// Legal transitions: `Unloaded → Loading → Loaded → {Refined, Evicting}`,
/// `Refined → Loaded` (fall-back), `Loading → Evicting` (cancel) and
/// `{Loaded, Evicting} → Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    /// No content, no in-flight request.
    #[default]
    Unloaded,
    /// Exactly one load request outstanding.
    Loading,
    /// Payload available (possibly `None` for structure nodes); candidate
    /// for display.
    Loaded,
    /// Children are displayed instead of this node; its payload is retained
    /// for fall-back. Only reachable under [`RefinementMode::Replace`].
    Refined,
    /// Being released: payload dropped, outstanding request cancelled.
    /// Transitions to `Unloaded` once the cancellation is observed.
    Evicting,
}

/// Bounding sphere of a node's content, in the node's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center in local coordinates.
    pub center: DVec3,
    /// Sphere radius; zero collapses the volume to a point.
    pub radius: f64,
}

impl BoundingSphere {
    /// A point volume at the local origin.
    pub const POINT: Self = Self {
        center: DVec3::ZERO,
        radius: 0.0,
    };

    /// Creates a sphere at `center` with `radius`.
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Returns the sphere center in world space under `transform`.
    pub fn world_center(&self, transform: &DMat4) -> DVec3 {
        transform.transform_point3(self.center)
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::POINT
    }
}

/// One element of the spatial tree.
///
/// Nodes are created by tree insertion — top-level via data-source
/// registration, descendants via loader outcomes once a parent's content
/// resolves — and destroyed when evicted or when their data source is
/// unregistered.
pub struct Node<P> {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) data_source: DataSourceId,
    pub(crate) content_type: ContentType,
    pub(crate) uri: Uri,
    pub(crate) transform: DMat4,
    pub(crate) bounds: BoundingSphere,
    pub(crate) geometric_error: f64,
    pub(crate) detail_multiplier: f64,
    pub(crate) refinement_mode: RefinementMode,
    pub(crate) state: NodeState,
    pub(crate) payload: Option<Arc<P>>,
    pub(crate) last_visible_tick: u64,
}

impl<P> Node<P> {
    /// Returns the node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the parent id, or `None` for a root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns the ordered child ids.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Returns the owning data source.
    pub fn data_source(&self) -> DataSourceId {
        self.data_source
    }

    /// Returns the node's content type.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Returns the node's content address.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the world transform.
    pub fn transform(&self) -> &DMat4 {
        &self.transform
    }

    /// Returns the local-space bounding volume.
    pub fn bounds(&self) -> &BoundingSphere {
        &self.bounds
    }

    /// Returns the geometric error bound for rendering this node instead of
    /// its full-resolution data. Always non-negative.
    pub fn geometric_error(&self) -> f64 {
        self.geometric_error
    }

    /// Returns the per-source detail multiplier applied to the error.
    pub fn detail_multiplier(&self) -> f64 {
        self.detail_multiplier
    }

    /// Returns the refinement mode in effect for this node.
    pub fn refinement_mode(&self) -> RefinementMode {
        self.refinement_mode
    }

    /// Returns the current load state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Returns the payload reference, if content has resolved.
    pub fn payload(&self) -> Option<&Arc<P>> {
        self.payload.as_ref()
    }

    /// Returns true if this node has renderable content of its own.
    pub(crate) fn is_displayable(&self) -> bool {
        matches!(self.state, NodeState::Loaded | NodeState::Refined) && self.payload.is_some()
    }
}

impl<P> fmt::Debug for Node<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("data_source", &self.data_source)
            .field("state", &self.state)
            .field("geometric_error", &self.geometric_error)
            .field("uri", &self.uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering_and_display() {
        let a = NodeId::from_raw(1);
        let b = a.next();
        assert!(b > a);
        assert_eq!(b.to_string(), "node:2");
    }

    #[test]
    fn test_bounding_sphere_world_center() {
        let sphere = BoundingSphere::new(DVec3::new(1.0, 0.0, 0.0), 5.0);
        let transform = DMat4::from_translation(DVec3::new(0.0, 2.0, 0.0));
        let center = sphere.world_center(&transform);
        assert_eq!(center, DVec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_default_state_is_unloaded() {
        assert_eq!(NodeState::default(), NodeState::Unloaded);
    }

    #[test]
    fn test_default_refinement_is_replace() {
        assert_eq!(RefinementMode::default(), RefinementMode::Replace);
    }
}
