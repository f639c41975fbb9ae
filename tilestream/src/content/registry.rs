//! Loader registry: one loader per content type per engine instance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::ContentType;
use crate::loader::NodeLoader;

/// Errors raised by loader registration and resolution.
///
/// Both variants are configuration mistakes: fatal at setup time, surfaced
/// immediately, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A loader is already bound to this content type.
    #[error("a loader is already registered for {0}")]
    DuplicateRegistration(ContentType),

    /// No loader is bound to this content type.
    #[error("no loader registered for {0}")]
    UnknownContentType(ContentType),
}

/// Maps content types to their loaders.
///
/// Registration happens at setup time only; resolution may run concurrently
/// with other reads (single-writer-then-many-readers discipline, enforced
/// here with a read-write lock so misuse degrades to blocking rather than
/// corruption).
pub struct LoaderRegistry<P> {
    loaders: RwLock<HashMap<ContentType, Arc<dyn NodeLoader<P>>>>,
}

impl<P> LoaderRegistry<P> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            loaders: RwLock::new(HashMap::new()),
        }
    }

    /// Binds `loader` to `content_type`.
    ///
    /// Exactly one loader may be bound per type; a second registration for
    /// the same type fails with [`RegistryError::DuplicateRegistration`].
    pub fn register(
        &self,
        content_type: ContentType,
        loader: Arc<dyn NodeLoader<P>>,
    ) -> Result<(), RegistryError> {
        let mut loaders = self.loaders.write();
        if loaders.contains_key(&content_type) {
            return Err(RegistryError::DuplicateRegistration(content_type));
        }
        debug!(%content_type, "registered loader");
        loaders.insert(content_type, loader);
        Ok(())
    }

    /// Resolves the loader bound to `content_type`.
    pub fn resolve(&self, content_type: ContentType) -> Result<Arc<dyn NodeLoader<P>>, RegistryError> {
        self.loaders
            .read()
            .get(&content_type)
            .cloned()
            .ok_or(RegistryError::UnknownContentType(content_type))
    }

    /// Returns the number of registered loaders.
    pub fn len(&self) -> usize {
        self.loaders.read().len()
    }

    /// Returns true if no loader has been registered.
    pub fn is_empty(&self) -> bool {
        self.loaders.read().is_empty()
    }
}

impl<P> Default for LoaderRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for LoaderRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("len", &self.len())
            .finish()
    }
}
