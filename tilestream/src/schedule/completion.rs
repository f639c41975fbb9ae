//! Completion channel between load tasks and the refinement pass.

use std::fmt;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::loader::{LoadError, LoadOutcome};
use crate::tree::NodeId;

/// Identity of one load request.
///
/// Issued monotonically per scheduler. A completion whose request id no
/// longer matches the node's live request is stale and gets dropped, which
/// is how late results are kept away from re-requested or evicted nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request:{}", self.0)
    }
}

/// Result of one finished load task.
pub struct Completion<P> {
    /// Node the load was issued for.
    pub node_id: NodeId,
    /// Identity of the request that produced this completion.
    pub request_id: RequestId,
    /// The loader's outcome, or the error it ended with.
    pub result: Result<LoadOutcome<P>, LoadError>,
}

impl<P> fmt::Debug for Completion<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("node_id", &self.node_id)
            .field("request_id", &self.request_id)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

/// Multi-producer, single-consumer completion queue.
///
/// Producers are the spawned load tasks; the sole consumer is the
/// refinement pass. Draining never blocks — the pass picks up whatever has
/// arrived since the previous tick.
pub struct CompletionQueue<P> {
    tx: UnboundedSender<Completion<P>>,
    rx: UnboundedReceiver<Completion<P>>,
}

impl<P> CompletionQueue<P> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Returns a sender handle for a load task.
    pub fn sender(&self) -> UnboundedSender<Completion<P>> {
        self.tx.clone()
    }

    /// Removes and returns the next pending completion, if any.
    pub fn pop(&mut self) -> Option<Completion<P>> {
        self.rx.try_recv().ok()
    }
}

impl<P> Default for CompletionQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pop_is_fifo() {
        let mut queue: CompletionQueue<String> = CompletionQueue::new();
        let tx = queue.sender();
        for raw in 1..=3 {
            tx.send(Completion {
                node_id: NodeId::from_raw(raw),
                request_id: RequestId(raw),
                result: Ok(LoadOutcome::empty()),
            })
            .unwrap();
        }

        assert_eq!(queue.pop().unwrap().node_id, NodeId::from_raw(1));
        assert_eq!(queue.pop().unwrap().node_id, NodeId::from_raw(2));
        assert_eq!(queue.pop().unwrap().node_id, NodeId::from_raw(3));
        assert!(queue.pop().is_none());
    }

    #[tokio::test]
    async fn test_pop_on_empty_returns_none() {
        let mut queue: CompletionQueue<String> = CompletionQueue::new();
        assert!(queue.pop().is_none());
    }

    #[tokio::test]
    async fn test_senders_from_multiple_producers() {
        let mut queue: CompletionQueue<String> = CompletionQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|raw| {
                let tx = queue.sender();
                tokio::spawn(async move {
                    tx.send(Completion {
                        node_id: NodeId::from_raw(raw),
                        request_id: RequestId(raw),
                        result: Err(LoadError::Cancelled),
                    })
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut seen = 0;
        while queue.pop().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 4);
    }
}
