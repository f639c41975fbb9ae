//! The per-tick refinement pass.

use std::sync::Arc;

use glam::DMat4;
use tracing::{debug, warn};

use super::policy::RefinePolicy;
use super::view::ViewParameters;
use crate::content::LoaderRegistry;
use crate::loader::{LoadError, LoadRequest};
use crate::schedule::{LoadFailure, LoadScheduler};
use crate::tree::{DataSourceId, NodeId, NodeState, NodeTree, RefinementMode};

/// One renderable node for the current tick.
#[derive(Debug, Clone)]
pub struct RenderEntry<P> {
    /// Node being displayed.
    pub node_id: NodeId,
    /// Data source the node belongs to.
    pub data_source: DataSourceId,
    /// World transform to render the payload under.
    pub transform: DMat4,
    /// The content payload reference.
    pub payload: Arc<P>,
}

/// The set of nodes to render this tick, in traversal order.
#[derive(Debug)]
pub struct RenderSet<P> {
    entries: Vec<RenderEntry<P>>,
}

impl<P> RenderSet<P> {
    /// Returns the render entries in traversal order (parents before
    /// children under additive refinement).
    pub fn entries(&self) -> &[RenderEntry<P>] {
        &self.entries
    }

    /// Returns the number of rendered nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is renderable this tick.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `node_id` is rendered this tick.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.entries.iter().any(|entry| entry.node_id == node_id)
    }

    /// Consumes the set, yielding its entries.
    pub fn into_entries(self) -> Vec<RenderEntry<P>> {
        self.entries
    }
}

/// Counts from one refinement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Load requests issued this pass.
    pub loads_issued: usize,
    /// Nodes placed in the render set.
    pub rendered: usize,
    /// Nodes newly transitioned to `Refined`.
    pub refined: usize,
    /// Nodes whose content was released by grace-period eviction.
    pub unloaded: usize,
    /// Descendant nodes removed from the tree by grace-period eviction.
    pub evicted_nodes: usize,
}

/// Runs one refinement pass and the trailing grace-period eviction.
///
/// Single-threaded and non-blocking: reads current node states, issues and
/// cancels requests, and collects the render set. Completions must have been
/// drained before this runs.
pub(crate) fn run_pass<P: Send + Sync + 'static>(
    tree: &mut NodeTree<P>,
    scheduler: &mut LoadScheduler<P>,
    registry: &LoaderRegistry<P>,
    policy: &RefinePolicy,
    view: &ViewParameters,
    tick: u64,
) -> (RenderSet<P>, PassStats, Vec<LoadFailure>) {
    let mut pass = Pass {
        tree,
        scheduler,
        registry,
        policy,
        view,
        tick,
        render: Vec::new(),
        stats: PassStats::default(),
        failures: Vec::new(),
    };

    for root in pass.tree.roots().to_vec() {
        pass.visit(root);
    }
    pass.evict_expired();

    (
        RenderSet {
            entries: pass.render,
        },
        pass.stats,
        pass.failures,
    )
}

struct Pass<'a, P> {
    tree: &'a mut NodeTree<P>,
    scheduler: &'a mut LoadScheduler<P>,
    registry: &'a LoaderRegistry<P>,
    policy: &'a RefinePolicy,
    view: &'a ViewParameters,
    tick: u64,
    render: Vec<RenderEntry<P>>,
    stats: PassStats,
    failures: Vec<LoadFailure>,
}

impl<P: Send + Sync + 'static> Pass<'_, P> {
    fn visit(&mut self, id: NodeId) {
        self.tree.touch(id, self.tick);
        let Some(node) = self.tree.get(id) else {
            return;
        };
        match node.state() {
            NodeState::Unloaded => self.request_load(id),
            // Nothing to show yet; an ancestor with content covers us.
            NodeState::Loading | NodeState::Evicting => {}
            NodeState::Loaded | NodeState::Refined => self.visit_resolved(id),
        }
    }

    fn visit_resolved(&mut self, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        let state = node.state();
        let mode = node.refinement_mode();
        let has_payload = node.payload().is_some();
        let children = node.children().to_vec();
        let error = self.view.scaled_error(node);

        // A node with no payload of its own (a structure node) has nothing
        // to display at any error, so it always descends.
        let wants_refine = !children.is_empty()
            && (!has_payload || self.policy.should_refine(error, self.view.threshold));

        if !wants_refine {
            if state == NodeState::Refined {
                // Coarsened: show this node again. Its children stop being
                // visited and age toward grace-period eviction.
                self.set_state(id, NodeState::Loaded);
            }
            self.display(id);
            return;
        }

        // Keep children alive and request any that have no content yet.
        let mut all_ready = true;
        for child in &children {
            self.tree.touch(*child, self.tick);
            match self.tree.get(*child).map(|c| c.state()) {
                Some(NodeState::Unloaded) => {
                    self.request_load(*child);
                    all_ready = false;
                }
                Some(NodeState::Loading) | Some(NodeState::Evicting) | None => {
                    all_ready = false;
                }
                Some(NodeState::Loaded) | Some(NodeState::Refined) => {}
            }
        }

        match mode {
            RefinementMode::Replace if has_payload => {
                if all_ready {
                    if state != NodeState::Refined {
                        self.set_state(id, NodeState::Refined);
                        self.stats.refined += 1;
                    }
                    for child in children {
                        self.visit(child);
                    }
                } else {
                    // Children missing or failed: fall back to this node's
                    // own content until they arrive.
                    if state == NodeState::Refined {
                        self.set_state(id, NodeState::Loaded);
                    }
                    self.display(id);
                }
            }
            RefinementMode::Replace => {
                // Structure node: children stand alone, each shown as soon
                // as it resolves.
                for child in children {
                    self.visit(child);
                }
            }
            RefinementMode::Add => {
                // Additive refinement layers children atop the parent; the
                // parent keeps rendering and is never suppressed.
                self.display(id);
                for child in children {
                    self.visit(child);
                }
            }
        }
    }

    fn display(&mut self, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        if !node.is_displayable() {
            return;
        }
        if let Some(payload) = node.payload() {
            self.render.push(RenderEntry {
                node_id: id,
                data_source: node.data_source(),
                transform: *node.transform(),
                payload: Arc::clone(payload),
            });
            self.stats.rendered += 1;
        }
    }

    fn request_load(&mut self, id: NodeId) {
        if self.scheduler.is_loading(id) {
            return;
        }
        let Some(node) = self.tree.get(id) else {
            return;
        };
        let loader = match self.registry.resolve(node.content_type()) {
            Ok(loader) => loader,
            Err(error) => {
                // Loader-produced children can carry a type nobody
                // registered; that is a per-node failure, not a panic.
                warn!(node = %id, uri = %node.uri(), %error, "cannot load node");
                self.failures.push(LoadFailure {
                    node_id: id,
                    uri: node.uri().clone(),
                    error: LoadError::failed(error),
                });
                return;
            }
        };
        let request = LoadRequest {
            node_id: id,
            content_type: node.content_type(),
            data_source: node.data_source(),
            uri: node.uri().clone(),
            transform: *node.transform(),
            detail_multiplier: node.detail_multiplier(),
            refinement_mode: node.refinement_mode(),
        };
        if self.scheduler.request_load(loader, request).is_ok() {
            if let Some(node) = self.tree.get_mut(id) {
                node.state = NodeState::Loading;
            }
            self.stats.loads_issued += 1;
        }
    }

    fn set_state(&mut self, id: NodeId, state: NodeState) {
        if let Some(node) = self.tree.get_mut(id) {
            if node.state != state {
                debug!(node = %id, from = ?node.state, to = ?state, "state transition");
                node.state = state;
            }
        }
    }

    /// Releases subtrees that have outlived the grace period, deepest-first.
    fn evict_expired(&mut self) {
        let mut candidates: Vec<(usize, NodeId)> = self
            .tree
            .node_ids()
            .filter_map(|id| {
                let node = self.tree.get(id)?;
                // Roots are visited every pass; only descendants age out.
                node.parent()?;
                if !self.policy.expired(node.last_visible_tick, self.tick) {
                    return None;
                }
                Some((self.tree.depth(id)?, id))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, id) in candidates {
            self.release(id);
        }
    }

    fn release(&mut self, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            // Already removed as part of an ancestor's release.
            return;
        };
        // Never unload a node its parent is currently refined onto.
        if let Some(parent) = node.parent() {
            if self
                .tree
                .get(parent)
                .map(|p| p.state() == NodeState::Refined)
                .unwrap_or(false)
            {
                return;
            }
        }

        match node.state() {
            NodeState::Loading => {
                // Cooperative cancel; the node reaches Unloaded once its
                // cancellation completion drains.
                self.scheduler.cancel(id);
                self.set_state(id, NodeState::Evicting);
                self.stats.unloaded += 1;
            }
            NodeState::Loaded | NodeState::Refined => {
                let children = node.children().to_vec();
                self.set_state(id, NodeState::Evicting);
                for child in children {
                    for sub in self.tree.subtree_ids(child) {
                        self.scheduler.forget(sub);
                    }
                    self.stats.evicted_nodes += self.tree.evict(child);
                }
                if let Some(node) = self.tree.get_mut(id) {
                    node.payload = None;
                    node.state = NodeState::Unloaded;
                }
                self.stats.unloaded += 1;
                debug!(node = %id, "released by grace-period eviction");
            }
            NodeState::Unloaded | NodeState::Evicting => {}
        }
    }
}
