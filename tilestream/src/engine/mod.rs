//! The embedding surface: one engine instance per host.
//!
//! A host wires the engine up at setup time (issue content types, register
//! loaders, register data sources) and then drives it with one
//! [`tick`](StreamingEngine::tick) per update, receiving the render set for
//! that update. Everything stateful — the node tree, the scheduler, the
//! loader registry — lives inside the engine and is torn down with it.
//!
//! # Example
//!
//! ```ignore
//! use tilestream::{RootDescriptor, StreamingEngine, ViewParameters};
//!
//! let mut engine = StreamingEngine::new();
//! let content_type = engine.content_types().generate();
//! engine.register_loader(content_type, my_loader)?;
//!
//! let mut root = RootDescriptor::new("file:///terrain.json", content_type);
//! root.geometric_error = 64.0;
//! engine.register_data_source(source_id, root)?;
//!
//! loop {
//!     let render_set = engine.tick(&view);
//!     // hand render_set to the renderer...
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::content::{ContentType, ContentTypeGenerator, LoaderRegistry, RegistryError};
use crate::loader::NodeLoader;
use crate::refine::{run_pass, PassStats, RefinePolicy, RenderSet, ViewParameters};
use crate::schedule::{DrainReport, LoadFailure, LoadScheduler};
use crate::tree::{DataSourceId, NodeId, NodeState, NodeTree, RootDescriptor};

/// Engine-level configuration mistakes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A data source with this id is already registered.
    #[error("data source {0} is already registered")]
    DuplicateDataSource(DataSourceId),

    /// Loader registration/resolution failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Per-tick activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// The tick these counters describe.
    pub tick: u64,
    /// Completions applied as successful loads.
    pub loads_completed: usize,
    /// Completions that ended in reportable failure.
    pub loads_failed: usize,
    /// Cancellations observed.
    pub loads_cancelled: usize,
    /// Stale completions dropped.
    pub completions_dropped: usize,
    /// Load requests issued by the pass.
    pub loads_issued: usize,
    /// Nodes placed in the render set.
    pub rendered: usize,
    /// Nodes newly refined.
    pub refined: usize,
    /// Nodes released by grace-period eviction.
    pub unloaded: usize,
    /// Nodes removed from the tree by grace-period eviction.
    pub evicted_nodes: usize,
}

impl TickStats {
    fn merge(tick: u64, report: DrainReport, pass: PassStats) -> Self {
        Self {
            tick,
            loads_completed: report.loaded,
            loads_failed: report.failed,
            loads_cancelled: report.cancelled,
            completions_dropped: report.dropped,
            loads_issued: pass.loads_issued,
            rendered: pass.rendered,
            refined: pass.refined,
            unloaded: pass.unloaded,
            evicted_nodes: pass.evicted_nodes,
        }
    }
}

/// Snapshot of engine state for host display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Live nodes across all data sources.
    pub nodes: usize,
    /// Outstanding load operations.
    pub in_flight: usize,
    /// Nodes per state.
    pub unloaded: usize,
    pub loading: usize,
    pub loaded: usize,
    pub refined: usize,
    pub evicting: usize,
    /// Counters from the most recent tick.
    pub last_tick: TickStats,
}

/// Hierarchical content streaming engine.
///
/// Owns the node tree, the loader registry and the load scheduler. All tree
/// mutation happens on the thread calling [`tick`](Self::tick); loads run
/// asynchronously on the tokio runtime captured at construction.
pub struct StreamingEngine<P> {
    content_types: ContentTypeGenerator,
    registry: LoaderRegistry<P>,
    tree: NodeTree<P>,
    scheduler: LoadScheduler<P>,
    policy: RefinePolicy,
    sources: HashMap<DataSourceId, NodeId>,
    tick: u64,
    failures: Vec<LoadFailure>,
    last_tick: TickStats,
}

impl<P: Send + Sync + 'static> StreamingEngine<P> {
    /// Creates an engine with the default [`RefinePolicy`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context (the scheduler
    /// spawns its load tasks there).
    pub fn new() -> Self {
        Self::with_policy(RefinePolicy::default())
    }

    /// Creates an engine with an explicit policy.
    pub fn with_policy(policy: RefinePolicy) -> Self {
        Self {
            content_types: ContentTypeGenerator::new(),
            registry: LoaderRegistry::new(),
            tree: NodeTree::new(),
            scheduler: LoadScheduler::new(),
            policy,
            sources: HashMap::new(),
            tick: 0,
            failures: Vec::new(),
            last_tick: TickStats::default(),
        }
    }

    /// Returns the engine's content-type generator.
    pub fn content_types(&self) -> &ContentTypeGenerator {
        &self.content_types
    }

    /// Binds a loader to a content type.
    pub fn register_loader(
        &mut self,
        content_type: ContentType,
        loader: Arc<dyn NodeLoader<P>>,
    ) -> Result<(), RegistryError> {
        self.registry.register(content_type, loader)
    }

    /// Registers a data source, inserting its top-level node.
    ///
    /// The descriptor's content type must already have a loader bound;
    /// missing loaders are configuration mistakes and fail here rather than
    /// at first load.
    pub fn register_data_source(
        &mut self,
        data_source: DataSourceId,
        descriptor: RootDescriptor,
    ) -> Result<NodeId, EngineError> {
        if self.sources.contains_key(&data_source) {
            return Err(EngineError::DuplicateDataSource(data_source));
        }
        self.registry.resolve(descriptor.content_type)?;

        let root = self.tree.insert_root(data_source, descriptor);
        self.sources.insert(data_source, root);
        info!(source = %data_source, root = %root, "registered data source");
        Ok(root)
    }

    /// Unregisters a data source, cancelling its in-flight loads and
    /// evicting all of its nodes. Idempotent; returns the number of nodes
    /// removed.
    ///
    /// Late completions for the removed nodes are dropped at the next
    /// drain, so this is race-free with outstanding loads.
    pub fn unregister_data_source(&mut self, data_source: DataSourceId) -> usize {
        self.sources.remove(&data_source);
        for root in self.tree.source_roots(data_source).to_vec() {
            for id in self.tree.subtree_ids(root) {
                self.scheduler.forget(id);
            }
        }
        let removed = self.tree.remove_data_source(data_source);
        if removed > 0 {
            info!(source = %data_source, removed, "unregistered data source");
        }
        removed
    }

    /// Runs one refinement pass and returns the nodes to render.
    ///
    /// Drains load completions first, so every state transition and child
    /// attachment from finished loads is visible to this pass — never to a
    /// concurrent one.
    pub fn tick(&mut self, view: &ViewParameters) -> RenderSet<P> {
        self.tick += 1;
        let (report, mut drain_failures) = self.scheduler.drain(&mut self.tree);
        self.failures.append(&mut drain_failures);

        let (render, pass_stats, mut pass_failures) = run_pass(
            &mut self.tree,
            &mut self.scheduler,
            &self.registry,
            &self.policy,
            view,
            self.tick,
        );
        self.failures.append(&mut pass_failures);
        self.last_tick = TickStats::merge(self.tick, report, pass_stats);
        render
    }

    /// Awaits every outstanding load, so the next tick observes all of
    /// them. Intended for tests and orderly shutdown.
    pub async fn flush(&mut self) {
        self.scheduler.flush().await;
    }

    /// Drains the load failures recorded since the last call.
    pub fn take_load_failures(&mut self) -> Vec<LoadFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Returns a snapshot of engine state.
    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            nodes: self.tree.len(),
            in_flight: self.scheduler.in_flight_count(),
            last_tick: self.last_tick,
            ..Default::default()
        };
        for id in self.tree.node_ids() {
            if let Some(node) = self.tree.get(id) {
                match node.state() {
                    NodeState::Unloaded => stats.unloaded += 1,
                    NodeState::Loading => stats.loading += 1,
                    NodeState::Loaded => stats.loaded += 1,
                    NodeState::Refined => stats.refined += 1,
                    NodeState::Evicting => stats.evicting += 1,
                }
            }
        }
        stats
    }

    /// Returns the node tree, for host inspection.
    pub fn tree(&self) -> &NodeTree<P> {
        &self.tree
    }

    /// Returns the refinement policy in effect.
    pub fn policy(&self) -> &RefinePolicy {
        &self.policy
    }

    /// Replaces the refinement policy from the next tick on.
    pub fn set_policy(&mut self, policy: RefinePolicy) {
        self.policy = policy;
    }
}

impl<P: Send + Sync + 'static> Default for StreamingEngine<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for StreamingEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingEngine")
            .field("tick", &self.tick)
            .field("nodes", &self.tree.len())
            .field("sources", &self.sources.len())
            .finish()
    }
}
