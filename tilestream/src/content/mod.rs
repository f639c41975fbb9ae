//! Content-type identity and loader registration.
//!
//! Every node in the tree carries a [`ContentType`] tag identifying which
//! loader family understands its payload format. Content types are issued by
//! a [`ContentTypeGenerator`] owned by the engine (created at engine init,
//! torn down with it — never a hidden global), and bound to loaders through
//! the [`LoaderRegistry`].
//!
//! # Example
//!
//! ```ignore
//! use tilestream::content::{ContentTypeGenerator, LoaderRegistry};
//!
//! let generator = ContentTypeGenerator::new();
//! let registry = LoaderRegistry::new();
//!
//! let content_type = generator.generate();
//! registry.register(content_type, my_loader)?;
//!
//! let loader = registry.resolve(content_type)?;
//! ```

mod registry;
mod types;

pub use registry::{LoaderRegistry, RegistryError};
pub use types::{ContentType, ContentTypeGenerator};
