//! Load scheduler: at-most-one in-flight operation per node.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::completion::{Completion, CompletionQueue, RequestId};
use crate::loader::{LoadError, LoadRequest, NodeLoader, Uri};
use crate::tree::{NodeId, NodeState, NodeTree};

/// Violation of the at-most-one-in-flight invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// A load request is already outstanding for this node.
    #[error("a load is already in flight for {0}")]
    AlreadyLoading(NodeId),
}

/// A load that ended in a reportable failure.
///
/// Cancellations are expected outcomes of eviction and never appear here.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    /// Node whose load failed.
    pub node_id: NodeId,
    /// Address that failed to resolve.
    pub uri: Uri,
    /// What went wrong.
    pub error: LoadError,
}

/// Counts from one completion drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Completions applied as successful loads.
    pub loaded: usize,
    /// Completions that ended in failure (node reverted to unloaded).
    pub failed: usize,
    /// Cancellations observed (node reverted to unloaded, not a failure).
    pub cancelled: usize,
    /// Stale or unknown completions dropped without effect.
    pub dropped: usize,
}

struct InFlight {
    request_id: RequestId,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Issues, tracks, cancels and completes asynchronous loads.
///
/// The scheduler holds non-owning node ids, never node references, so it
/// can outlast any individual node; completions for ids that have left the
/// tree are dropped at drain time.
pub struct LoadScheduler<P> {
    runtime: Handle,
    queue: CompletionQueue<P>,
    in_flight: HashMap<NodeId, InFlight>,
    /// Tasks for forgotten requests, kept so `flush` can still await them.
    detached: Vec<JoinHandle<()>>,
    next_request: u64,
}

impl<P: Send + Sync + 'static> LoadScheduler<P> {
    /// Creates a scheduler on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context; use
    /// [`with_handle`](Self::with_handle) to supply one explicitly.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Creates a scheduler spawning its load tasks on `runtime`.
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            queue: CompletionQueue::new(),
            in_flight: HashMap::new(),
            detached: Vec::new(),
            next_request: 1,
        }
    }

    /// Issues an asynchronous load for `request.node_id` through `loader`.
    ///
    /// Fails with [`ScheduleError::AlreadyLoading`] if a request is still
    /// outstanding for that node — including one that has been cancelled but
    /// whose completion has not yet been drained.
    pub fn request_load(
        &mut self,
        loader: Arc<dyn NodeLoader<P>>,
        request: LoadRequest,
    ) -> Result<RequestId, ScheduleError> {
        let node_id = request.node_id;
        if self.in_flight.contains_key(&node_id) {
            return Err(ScheduleError::AlreadyLoading(node_id));
        }

        let request_id = RequestId(self.next_request);
        self.next_request += 1;

        let token = CancellationToken::new();
        let task_token = token.clone();
        let tx = self.queue.sender();
        debug!(node = %node_id, request = %request_id, uri = %request.uri, "issuing load");
        let future = loader.load(request);
        let handle = self.runtime.spawn(async move {
            let result = tokio::select! {
                _ = task_token.cancelled() => Err(LoadError::Cancelled),
                result = future => result,
            };
            // The receiver only closes on engine teardown; a send failure
            // then is harmless.
            let _ = tx.send(Completion {
                node_id,
                request_id,
                result,
            });
        });

        self.in_flight.insert(
            node_id,
            InFlight {
                request_id,
                token,
                handle: Some(handle),
            },
        );
        Ok(request_id)
    }

    /// Requests cooperative cancellation of the node's in-flight load.
    ///
    /// The entry stays tracked until its completion (usually `Cancelled`)
    /// drains, keeping the at-most-one invariant airtight. Returns true if
    /// there was a load to cancel.
    pub fn cancel(&mut self, node_id: NodeId) -> bool {
        match self.in_flight.get(&node_id) {
            Some(entry) => {
                debug!(node = %node_id, request = %entry.request_id, "cancelling load");
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels and forgets the node's in-flight load.
    ///
    /// Used when the node is leaving the tree entirely (eviction, data
    /// source removal): with the entry gone, the eventual completion no
    /// longer matches anything and drains as a drop.
    pub fn forget(&mut self, node_id: NodeId) -> bool {
        match self.in_flight.remove(&node_id) {
            Some(mut entry) => {
                entry.token.cancel();
                if let Some(handle) = entry.handle.take() {
                    self.detached.push(handle);
                }
                true
            }
            None => false,
        }
    }

    /// Returns true if a load is outstanding for `node_id`.
    pub fn is_loading(&self, node_id: NodeId) -> bool {
        self.in_flight.contains_key(&node_id)
    }

    /// Returns the number of outstanding loads.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Awaits every outstanding load task.
    ///
    /// After this returns, every issued completion sits in the queue and
    /// the next [`drain`](Self::drain) observes all of them — which makes
    /// load timing deterministic for tests and orderly for shutdown.
    pub async fn flush(&mut self) {
        let mut handles: Vec<_> = self
            .in_flight
            .values_mut()
            .filter_map(|entry| entry.handle.take())
            .collect();
        handles.append(&mut self.detached);
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Drains pending completions into the tree.
    ///
    /// Called at the start of each refinement pass, on the pass thread. For
    /// every live completion the node's state transition and its children's
    /// attachment are applied together, so the pass never observes a loaded
    /// node whose children are missing. Returns what was applied plus any
    /// reportable failures.
    pub fn drain(&mut self, tree: &mut NodeTree<P>) -> (DrainReport, Vec<LoadFailure>) {
        let mut report = DrainReport::default();
        let mut failures = Vec::new();

        while let Some(completion) = self.queue.pop() {
            let live = self
                .in_flight
                .get(&completion.node_id)
                .map(|entry| entry.request_id == completion.request_id)
                .unwrap_or(false);
            if !live {
                report.dropped += 1;
                continue;
            }
            self.in_flight.remove(&completion.node_id);
            self.apply(tree, completion, &mut report, &mut failures);
        }
        (report, failures)
    }

    fn apply(
        &mut self,
        tree: &mut NodeTree<P>,
        completion: Completion<P>,
        report: &mut DrainReport,
        failures: &mut Vec<LoadFailure>,
    ) {
        let node_id = completion.node_id;
        let Some(node) = tree.get_mut(node_id) else {
            report.dropped += 1;
            return;
        };

        match node.state {
            NodeState::Loading => match completion.result {
                Ok(outcome) => {
                    node.payload = outcome.payload;
                    node.state = NodeState::Loaded;
                    report.loaded += 1;
                    if !outcome.children.is_empty() {
                        // The parent was just looked up, so attachment
                        // cannot fail here.
                        let _ = tree.attach_children(node_id, outcome.children);
                    }
                }
                Err(LoadError::Cancelled) => {
                    node.payload = None;
                    node.state = NodeState::Unloaded;
                    report.cancelled += 1;
                }
                Err(error) => {
                    let uri = node.uri.clone();
                    node.payload = None;
                    node.state = NodeState::Unloaded;
                    report.failed += 1;
                    warn!(node = %node_id, %uri, %error, "load failed");
                    failures.push(LoadFailure {
                        node_id,
                        uri,
                        error,
                    });
                }
            },
            NodeState::Evicting => {
                // Cancellation raced the load; whatever the outcome was,
                // no partial content may surface.
                node.payload = None;
                node.state = NodeState::Unloaded;
                report.cancelled += 1;
            }
            _ => {
                report.dropped += 1;
            }
        }
    }
}

impl<P> std::fmt::Debug for LoadScheduler<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadScheduler")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentType, ContentTypeGenerator};
    use crate::loader::{BoxFuture, ChildDescriptor, LoadOutcome};
    use crate::tree::{BoundingSphere, DataSourceId, RefinementMode, RootDescriptor};
    use glam::DMat4;
    use std::time::Duration;

    /// Loader that resolves immediately with a payload and optional children.
    struct ImmediateLoader {
        children: usize,
        content_type: ContentType,
    }

    impl NodeLoader<String> for ImmediateLoader {
        fn load(&self, request: LoadRequest) -> BoxFuture<'static, Result<LoadOutcome<String>, LoadError>> {
            let children = (0..self.children)
                .map(|i| ChildDescriptor {
                    uri: Uri::new(format!("{}/{i}", request.uri)),
                    transform: DMat4::IDENTITY,
                    geometric_error: 1.0,
                    content_type: self.content_type,
                    bounds: BoundingSphere::POINT,
                    refinement_mode: None,
                })
                .collect();
            let payload = format!("payload:{}", request.uri);
            Box::pin(async move {
                Ok(LoadOutcome {
                    payload: Some(Arc::new(payload)),
                    children,
                })
            })
        }
    }

    /// Loader that always fails.
    struct FailingLoader;

    impl NodeLoader<String> for FailingLoader {
        fn load(&self, _request: LoadRequest) -> BoxFuture<'static, Result<LoadOutcome<String>, LoadError>> {
            Box::pin(async { Err(LoadError::failed("corrupt tile")) })
        }
    }

    /// Loader that never resolves until cancelled.
    struct HangingLoader;

    impl NodeLoader<String> for HangingLoader {
        fn load(&self, _request: LoadRequest) -> BoxFuture<'static, Result<LoadOutcome<String>, LoadError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(LoadOutcome::empty())
            })
        }
    }

    fn setup() -> (NodeTree<String>, LoadScheduler<String>, NodeId, ContentType) {
        let generator = ContentTypeGenerator::new();
        let ct = generator.generate();
        let mut tree = NodeTree::new();
        let mut descriptor = RootDescriptor::new("test://root", ct);
        descriptor.geometric_error = 10.0;
        let root = tree.insert_root(DataSourceId::new(1), descriptor);
        (tree, LoadScheduler::new(), root, ct)
    }

    fn request_for(tree: &NodeTree<String>, node_id: NodeId) -> LoadRequest {
        let node = tree.get(node_id).unwrap();
        LoadRequest {
            node_id,
            content_type: node.content_type(),
            data_source: node.data_source(),
            uri: node.uri().clone(),
            transform: *node.transform(),
            detail_multiplier: node.detail_multiplier(),
            refinement_mode: RefinementMode::Replace,
        }
    }

    #[tokio::test]
    async fn test_load_completes_and_attaches_children() {
        let (mut tree, mut scheduler, root, ct) = setup();
        tree.get_mut(root).unwrap().state = NodeState::Loading;
        let loader = Arc::new(ImmediateLoader {
            children: 2,
            content_type: ct,
        });

        scheduler.request_load(loader, request_for(&tree, root)).unwrap();
        scheduler.flush().await;
        let (report, failures) = scheduler.drain(&mut tree);

        assert_eq!(report.loaded, 1);
        assert!(failures.is_empty());
        let node = tree.get(root).unwrap();
        assert_eq!(node.state(), NodeState::Loaded);
        assert!(node.payload().is_some());
        assert_eq!(node.children().len(), 2);
        assert_eq!(tree.len(), 3);
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_second_request_is_already_loading() {
        let (mut tree, mut scheduler, root, ct) = setup();
        tree.get_mut(root).unwrap().state = NodeState::Loading;
        let loader = Arc::new(ImmediateLoader {
            children: 0,
            content_type: ct,
        });

        scheduler
            .request_load(loader.clone(), request_for(&tree, root))
            .unwrap();
        let err = scheduler
            .request_load(loader, request_for(&tree, root))
            .unwrap_err();
        assert_eq!(err, ScheduleError::AlreadyLoading(root));

        // The first request still completes normally.
        scheduler.flush().await;
        let (report, _) = scheduler.drain(&mut tree);
        assert_eq!(report.loaded, 1);
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Loaded);
    }

    #[tokio::test]
    async fn test_failure_reverts_to_unloaded() {
        let (mut tree, mut scheduler, root, _ct) = setup();
        tree.get_mut(root).unwrap().state = NodeState::Loading;

        scheduler
            .request_load(Arc::new(FailingLoader), request_for(&tree, root))
            .unwrap();
        scheduler.flush().await;
        let (report, failures) = scheduler.drain(&mut tree);

        assert_eq!(report.failed, 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].node_id, root);
        assert!(matches!(failures[0].error, LoadError::Failed { .. }));
        let node = tree.get(root).unwrap();
        assert_eq!(node.state(), NodeState::Unloaded);
        assert!(node.payload().is_none());
    }

    #[tokio::test]
    async fn test_cancel_leaves_node_unloaded() {
        let (mut tree, mut scheduler, root, _ct) = setup();
        tree.get_mut(root).unwrap().state = NodeState::Loading;

        scheduler
            .request_load(Arc::new(HangingLoader), request_for(&tree, root))
            .unwrap();
        assert!(scheduler.cancel(root));
        tree.get_mut(root).unwrap().state = NodeState::Evicting;

        scheduler.flush().await;
        let (report, failures) = scheduler.drain(&mut tree);

        // Cancellation is an expected outcome, never a reported failure.
        assert_eq!(report.cancelled, 1);
        assert!(failures.is_empty());
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Unloaded);
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_for_evicted_node_is_dropped() {
        let (mut tree, mut scheduler, root, ct) = setup();
        tree.get_mut(root).unwrap().state = NodeState::Loading;
        let loader = Arc::new(ImmediateLoader {
            children: 1,
            content_type: ct,
        });

        scheduler.request_load(loader, request_for(&tree, root)).unwrap();
        scheduler.forget(root);
        tree.evict(root);

        scheduler.flush().await;
        let (report, failures) = scheduler.drain(&mut tree);

        assert_eq!(report.dropped, 1);
        assert_eq!(report.loaded, 0);
        assert!(failures.is_empty());
        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_without_in_flight_is_noop() {
        let (_tree, mut scheduler, root, _ct) = setup();
        assert!(!scheduler.cancel(root));
        assert!(!scheduler.forget(root));
    }
}
