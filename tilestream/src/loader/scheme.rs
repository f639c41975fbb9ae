//! Scheme-dispatching loader layer.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{BoxFuture, LoadError, LoadOutcome, LoadRequest, NodeLoader};

/// A sub-loader is already registered for this URI scheme.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a loader is already registered for URI scheme '{0}'")]
pub struct DuplicateScheme(pub String);

/// A loader that dispatches to sub-loaders by URI scheme.
///
/// This is the layering described by the tileset-family loaders: a single
/// content type is served by one `SchemeLoader`, which selects a local-file
/// or remote sub-loader per request. Requests whose scheme has no registered
/// sub-loader fail with [`LoadError::UnsupportedUri`]; that failure is
/// per-node and recovered like any other load failure.
pub struct SchemeLoader<P> {
    sub_loaders: HashMap<String, Arc<dyn NodeLoader<P>>>,
}

impl<P> SchemeLoader<P> {
    /// Creates a dispatcher with no registered schemes.
    pub fn new() -> Self {
        Self {
            sub_loaders: HashMap::new(),
        }
    }

    /// Registers `loader` for `scheme`.
    ///
    /// Registration happens at setup time, before the dispatcher is handed
    /// to the registry, which is why this takes `&mut self`.
    pub fn register_scheme(
        &mut self,
        scheme: impl Into<String>,
        loader: Arc<dyn NodeLoader<P>>,
    ) -> Result<(), DuplicateScheme> {
        let scheme = scheme.into();
        if self.sub_loaders.contains_key(&scheme) {
            return Err(DuplicateScheme(scheme));
        }
        debug!(%scheme, "registered scheme sub-loader");
        self.sub_loaders.insert(scheme, loader);
        Ok(())
    }

    /// Returns the registered scheme names, in arbitrary order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.sub_loaders.keys().map(String::as_str)
    }
}

impl<P> Default for SchemeLoader<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync + 'static> NodeLoader<P> for SchemeLoader<P> {
    fn load(&self, request: LoadRequest) -> BoxFuture<'static, Result<LoadOutcome<P>, LoadError>> {
        let sub = request
            .uri
            .scheme()
            .and_then(|scheme| self.sub_loaders.get(scheme));
        match sub {
            Some(loader) => loader.load(request),
            None => {
                let err = LoadError::unsupported(&request.uri);
                Box::pin(async move { Err(err) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentTypeGenerator;
    use crate::loader::Uri;
    use crate::tree::{DataSourceId, NodeId, RefinementMode};
    use glam::DMat4;

    /// Sub-loader that records which scheme family answered.
    struct TagLoader(&'static str);

    impl NodeLoader<&'static str> for TagLoader {
        fn load(
            &self,
            _request: LoadRequest,
        ) -> BoxFuture<'static, Result<LoadOutcome<&'static str>, LoadError>> {
            let tag = self.0;
            Box::pin(async move { Ok(LoadOutcome::leaf(tag)) })
        }
    }

    fn make_request(uri: &str) -> LoadRequest {
        LoadRequest {
            node_id: NodeId::from_raw(1),
            content_type: ContentTypeGenerator::new().generate(),
            data_source: DataSourceId::new(7),
            uri: Uri::new(uri),
            transform: DMat4::IDENTITY,
            detail_multiplier: 1.0,
            refinement_mode: RefinementMode::Replace,
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_scheme() {
        let mut dispatcher: SchemeLoader<&'static str> = SchemeLoader::new();
        dispatcher
            .register_scheme("file", Arc::new(TagLoader("local")))
            .unwrap();
        dispatcher
            .register_scheme("http", Arc::new(TagLoader("remote")))
            .unwrap();

        let outcome = dispatcher.load(make_request("file:///a.tile")).await.unwrap();
        assert_eq!(*outcome.payload.unwrap(), "local");

        let outcome = dispatcher.load(make_request("http://x/a.tile")).await.unwrap();
        assert_eq!(*outcome.payload.unwrap(), "remote");
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_unsupported() {
        let dispatcher: SchemeLoader<&'static str> = SchemeLoader::new();
        let err = dispatcher.load(make_request("ftp://x/a.tile")).await.unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedUri { .. }));
    }

    #[tokio::test]
    async fn test_missing_scheme_is_unsupported() {
        let mut dispatcher: SchemeLoader<&'static str> = SchemeLoader::new();
        dispatcher
            .register_scheme("file", Arc::new(TagLoader("local")))
            .unwrap();
        let err = dispatcher.load(make_request("a/relative/path")).await.unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedUri { .. }));
    }

    #[test]
    fn test_duplicate_scheme_fails() {
        let mut dispatcher: SchemeLoader<&'static str> = SchemeLoader::new();
        dispatcher
            .register_scheme("file", Arc::new(TagLoader("a")))
            .unwrap();
        let err = dispatcher
            .register_scheme("file", Arc::new(TagLoader("b")))
            .unwrap_err();
        assert_eq!(err, DuplicateScheme("file".to_string()));
    }
}
