//! Loader trait and the request/outcome types it exchanges with the engine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use glam::DMat4;
use thiserror::Error;

use super::Uri;
use crate::content::ContentType;
use crate::tree::{BoundingSphere, DataSourceId, NodeId, RefinementMode};

/// Boxed future type for dyn-compatible async loader methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-node runtime load outcomes.
///
/// Unlike registry errors these are recovered locally: the node reverts to
/// its prior state, the failure is reported to the host, and the pass keeps
/// rendering the nearest loaded ancestor. [`LoadError::Cancelled`] is an
/// expected outcome of eviction, not a failure, and is never reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// No sub-loader is registered for the URI's scheme.
    #[error("unsupported URI '{uri}': no loader for scheme '{scheme}'")]
    UnsupportedUri { uri: String, scheme: String },

    /// The loader could not produce content.
    #[error("load failed: {reason}")]
    Failed { reason: String },

    /// The request was cancelled before completion.
    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Builds an [`UnsupportedUri`](LoadError::UnsupportedUri) for `uri`,
    /// reporting its scheme or `(none)` when absent.
    pub fn unsupported(uri: &Uri) -> Self {
        LoadError::UnsupportedUri {
            uri: uri.as_str().to_string(),
            scheme: uri.scheme().unwrap_or("(none)").to_string(),
        }
    }

    /// Builds a [`Failed`](LoadError::Failed) from any displayable reason.
    pub fn failed(reason: impl ToString) -> Self {
        LoadError::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Everything a loader needs to resolve one node's content.
///
/// Owned by the scheduler for the request's lifetime and destroyed on
/// completion, cancellation or failure. The detail multiplier is captured at
/// request time so a later data-source change cannot retroactively alter an
/// in-flight request.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Node whose content is being resolved.
    pub node_id: NodeId,
    /// Content type the target node was inserted with.
    pub content_type: ContentType,
    /// Data source the node belongs to.
    pub data_source: DataSourceId,
    /// Address of the content.
    pub uri: Uri,
    /// World transform of the node.
    pub transform: DMat4,
    /// Detail multiplier at request time.
    pub detail_multiplier: f64,
    /// Refinement mode of the node.
    pub refinement_mode: RefinementMode,
}

/// Description of a child node produced by a parent's load.
///
/// Children inherit the parent's data source and detail multiplier; the
/// refinement mode is inherited too unless overridden here.
#[derive(Debug, Clone)]
pub struct ChildDescriptor {
    /// Address of the child's content.
    pub uri: Uri,
    /// World transform of the child.
    pub transform: DMat4,
    /// Geometric error of the child's simplified representation.
    pub geometric_error: f64,
    /// Content type of the child (children may switch loader families,
    /// e.g. a tileset node whose children are mesh tiles).
    pub content_type: ContentType,
    /// Bounding volume of the child, in local space.
    pub bounds: BoundingSphere,
    /// Refinement mode override; `None` inherits the parent's mode.
    pub refinement_mode: Option<RefinementMode>,
}

/// Result of a successful load: an optional payload plus child descriptors.
pub struct LoadOutcome<P> {
    /// Renderable content, if the node has any of its own. `None` marks a
    /// pure structure node (a tileset index, say) that only exists to
    /// introduce children.
    pub payload: Option<Arc<P>>,
    /// Children discovered while resolving the node.
    pub children: Vec<ChildDescriptor>,
}

impl<P> LoadOutcome<P> {
    /// An outcome with no payload and no children (an empty leaf).
    pub fn empty() -> Self {
        Self {
            payload: None,
            children: Vec::new(),
        }
    }

    /// An outcome carrying only a payload.
    pub fn leaf(payload: P) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            children: Vec::new(),
        }
    }

    /// An outcome carrying a payload and children.
    pub fn with_children(payload: P, children: Vec<ChildDescriptor>) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            children,
        }
    }

    /// An outcome with children but no payload of its own.
    pub fn structure(children: Vec<ChildDescriptor>) -> Self {
        Self {
            payload: None,
            children,
        }
    }
}

impl<P> std::fmt::Debug for LoadOutcome<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOutcome")
            .field("has_payload", &self.payload.is_some())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Resolves a node's content from its URI, asynchronously.
///
/// Implementations must be cheap to call: `load` should capture what it
/// needs and return a future, leaving the actual I/O and decoding to the
/// future itself, which the scheduler runs on the async runtime. The future
/// is raced against a cancellation token, so long-running loaders get
/// dropped at the next await point once their node is evicted.
pub trait NodeLoader<P>: Send + Sync + 'static {
    /// Starts resolving `request`, returning the eventual outcome.
    fn load(&self, request: LoadRequest) -> BoxFuture<'static, Result<LoadOutcome<P>, LoadError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_error_names_scheme() {
        let err = LoadError::unsupported(&Uri::new("magnet:?xt=abc"));
        let msg = err.to_string();
        assert!(msg.contains("magnet"));
    }

    #[test]
    fn test_unsupported_error_without_scheme() {
        let err = LoadError::unsupported(&Uri::new("relative/path.tile"));
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn test_outcome_constructors() {
        let empty: LoadOutcome<String> = LoadOutcome::empty();
        assert!(empty.payload.is_none());
        assert!(empty.children.is_empty());

        let leaf = LoadOutcome::leaf("mesh".to_string());
        assert!(leaf.payload.is_some());
        assert!(leaf.children.is_empty());

        let structure: LoadOutcome<String> = LoadOutcome::structure(Vec::new());
        assert!(structure.payload.is_none());
    }
}
