//! Arena storage for the node tree.

use std::collections::HashMap;

use glam::DMat4;
use thiserror::Error;
use tracing::debug;

use super::{BoundingSphere, DataSourceId, Node, NodeId, NodeState, RefinementMode};
use crate::content::ContentType;
use crate::loader::{ChildDescriptor, Uri};

/// Structural misuse of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The named parent no longer exists (already evicted, or its data
    /// source was removed while the caller held the id).
    #[error("invalid parent {0}: node no longer exists")]
    InvalidParent(NodeId),
}

/// Everything needed to insert a data source's top-level node.
#[derive(Debug, Clone)]
pub struct RootDescriptor {
    /// Address of the root content.
    pub uri: Uri,
    /// Content type selecting the loader family.
    pub content_type: ContentType,
    /// World transform of the root.
    pub transform: DMat4,
    /// Per-source detail multiplier, inherited by all descendants.
    pub detail_multiplier: f64,
    /// Refinement mode, inherited by descendants unless overridden.
    pub refinement_mode: RefinementMode,
    /// Geometric error of the root's simplified representation. The default
    /// is infinite, which makes a structure-only root always refine.
    pub geometric_error: f64,
    /// Local-space bounding volume of the root.
    pub bounds: BoundingSphere,
}

impl RootDescriptor {
    /// Creates a descriptor with identity transform, unit detail multiplier,
    /// [`RefinementMode::Replace`], infinite geometric error and point
    /// bounds. Override fields as needed.
    pub fn new(uri: impl Into<Uri>, content_type: ContentType) -> Self {
        Self {
            uri: uri.into(),
            content_type,
            transform: DMat4::IDENTITY,
            detail_multiplier: 1.0,
            refinement_mode: RefinementMode::Replace,
            geometric_error: f64::INFINITY,
            bounds: BoundingSphere::POINT,
        }
    }
}

/// Arena of spatial nodes forming one or more rooted trees.
///
/// The tree exclusively owns node storage. Every non-root node has exactly
/// one parent, there are no cycles (children are only ever created under an
/// existing parent), and a subtree always belongs to exactly one data-source
/// lineage.
pub struct NodeTree<P> {
    nodes: HashMap<NodeId, Node<P>>,
    roots: Vec<NodeId>,
    source_roots: HashMap<DataSourceId, Vec<NodeId>>,
    next_id: NodeId,
}

impl<P> NodeTree<P> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            source_roots: HashMap::new(),
            next_id: NodeId::from_raw(1),
        }
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    /// Inserts a data source's top-level node.
    pub fn insert_root(&mut self, data_source: DataSourceId, descriptor: RootDescriptor) -> NodeId {
        let id = self.allocate_id();
        let node = Node {
            id,
            parent: None,
            children: Vec::new(),
            data_source,
            content_type: descriptor.content_type,
            uri: descriptor.uri,
            transform: descriptor.transform,
            bounds: descriptor.bounds,
            geometric_error: descriptor.geometric_error.max(0.0),
            detail_multiplier: descriptor.detail_multiplier,
            refinement_mode: descriptor.refinement_mode,
            state: NodeState::Unloaded,
            payload: None,
            last_visible_tick: 0,
        };
        debug!(node = %id, source = %data_source, uri = %node.uri, "inserted root node");
        self.nodes.insert(id, node);
        self.roots.push(id);
        self.source_roots.entry(data_source).or_default().push(id);
        id
    }

    /// Attaches loader-produced children under `parent`.
    ///
    /// Children inherit the parent's data source and detail multiplier, and
    /// its refinement mode unless the descriptor overrides it. A child's
    /// geometric error is clamped to its parent's so refinement stays
    /// monotonic down every lineage.
    ///
    /// Fails with [`TreeError::InvalidParent`] if the parent was evicted
    /// between load issue and completion.
    pub fn attach_children(
        &mut self,
        parent: NodeId,
        descriptors: Vec<ChildDescriptor>,
    ) -> Result<Vec<NodeId>, TreeError> {
        let (data_source, detail_multiplier, parent_mode, parent_error, parent_tick) =
            match self.nodes.get(&parent) {
                Some(node) => (
                    node.data_source,
                    node.detail_multiplier,
                    node.refinement_mode,
                    node.geometric_error,
                    node.last_visible_tick,
                ),
                None => return Err(TreeError::InvalidParent(parent)),
            };

        let mut ids = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = self.allocate_id();
            let node = Node {
                id,
                parent: Some(parent),
                children: Vec::new(),
                data_source,
                content_type: descriptor.content_type,
                uri: descriptor.uri,
                transform: descriptor.transform,
                bounds: descriptor.bounds,
                geometric_error: descriptor.geometric_error.max(0.0).min(parent_error),
                detail_multiplier,
                refinement_mode: descriptor.refinement_mode.unwrap_or(parent_mode),
                state: NodeState::Unloaded,
                payload: None,
                // Inherit recency so a freshly attached child is not an
                // immediate eviction candidate.
                last_visible_tick: parent_tick,
            };
            self.nodes.insert(id, node);
            ids.push(id);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.extend_from_slice(&ids);
        }
        Ok(ids)
    }

    /// Recursively detaches and frees the subtree rooted at `id`.
    ///
    /// A no-op on an already-evicted id, so eviction is idempotent. Returns
    /// the number of nodes removed.
    pub fn evict(&mut self, id: NodeId) -> usize {
        if !self.nodes.contains_key(&id) {
            return 0;
        }

        // Detach from the parent (or the root lists) first so the subtree
        // is unreachable before any node is freed.
        if let Some(parent) = self.nodes[&id].parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != id);
            }
        } else {
            self.roots.retain(|r| *r != id);
            let source = self.nodes[&id].data_source;
            if let Some(roots) = self.source_roots.get_mut(&source) {
                roots.retain(|r| *r != id);
                if roots.is_empty() {
                    self.source_roots.remove(&source);
                }
            }
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        debug!(node = %id, removed, "evicted subtree");
        removed
    }

    /// Evicts every root (and therefore every descendant) owned by
    /// `data_source`. Returns the number of nodes removed.
    pub fn remove_data_source(&mut self, data_source: DataSourceId) -> usize {
        let roots = self.source_roots.remove(&data_source).unwrap_or_default();
        let mut removed = 0;
        for root in roots {
            removed += self.evict(root);
        }
        if removed > 0 {
            debug!(source = %data_source, removed, "removed data source nodes");
        }
        removed
    }

    /// Returns the node for `id`, if it still exists.
    pub fn get(&self, id: NodeId) -> Option<&Node<P>> {
        self.nodes.get(&id)
    }

    /// Returns the node for `id` mutably, if it still exists.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<P>> {
        self.nodes.get_mut(&id)
    }

    /// Returns true if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Returns the number of live nodes across all trees.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the top-level node ids, in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Returns the root ids owned by `data_source`.
    pub fn source_roots(&self, data_source: DataSourceId) -> &[NodeId] {
        self.source_roots
            .get(&data_source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns an iterator over all live node ids, in arbitrary order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Returns the ids of `id`'s subtree (itself included), or an empty
    /// list if the node is gone.
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                ids.push(current);
                stack.extend(node.children.iter().copied());
            }
        }
        ids
    }

    /// Returns the depth of `id` (roots are at depth zero), or `None` if
    /// the node is gone.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        let mut depth = 0;
        let mut current = self.nodes.get(&id)?;
        while let Some(parent) = current.parent {
            current = self.nodes.get(&parent)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Marks `id` as visited by the pass running at `tick`.
    pub(crate) fn touch(&mut self, id: NodeId, tick: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.last_visible_tick = tick;
        }
    }
}

impl<P> Default for NodeTree<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for NodeTree<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots.len())
            .field("sources", &self.source_roots.len())
            .finish()
    }
}
