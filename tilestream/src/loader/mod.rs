//! Loader abstraction and URI dispatch.
//!
//! A loader answers one question: given a URI, asynchronously produce zero
//! or more child node descriptors and zero or one renderable payload. The
//! engine never interprets payloads — it stores and forwards references —
//! so loaders are the only place a concrete format is understood.
//!
//! Loaders may be layered: a tileset-family loader can hold a nested table
//! of URI-scheme sub-loaders (local file vs remote, say) and select one at
//! dispatch time. [`SchemeLoader`] implements that layering.
//!
//! # Example
//!
//! ```ignore
//! use tilestream::loader::{NodeLoader, SchemeLoader};
//!
//! let mut tileset = SchemeLoader::new();
//! tileset.register_scheme("file", file_loader)?;
//! tileset.register_scheme("http", remote_loader)?;
//! registry.register(content_type, Arc::new(tileset))?;
//! ```

mod scheme;
mod types;
mod uri;

pub use scheme::{DuplicateScheme, SchemeLoader};
pub use types::{BoxFuture, ChildDescriptor, LoadError, LoadOutcome, LoadRequest, NodeLoader};
pub use uri::Uri;
