//! Content-type identifiers and their generator.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque tag identifying a loader family.
///
/// A content type says nothing about the payload itself; it only selects
/// which registered loader understands a node's URI. Types are unique per
/// generator instance and immutable once issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentType(u32);

impl ContentType {
    /// Returns the raw tag value, for logging and diagnostics only.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "content-type:{}", self.0)
    }
}

/// Issues process-unique [`ContentType`] values.
///
/// Owned by one engine instance with an explicit lifecycle; two generators
/// issue independent (and therefore incompatible) tag spaces, so all types
/// used with one registry must come from that registry's generator.
#[derive(Debug, Default)]
pub struct ContentTypeGenerator {
    next: AtomicU32,
}

impl ContentTypeGenerator {
    /// Creates a generator starting at tag zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh, unique content type.
    pub fn generate(&self) -> ContentType {
        ContentType(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        let generator = ContentTypeGenerator::new();
        let a = generator.generate();
        let b = generator.generate();
        let c = generator.generate();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generate_is_monotonic() {
        let generator = ContentTypeGenerator::new();
        let first = generator.generate();
        let second = generator.generate();
        assert!(second.raw() > first.raw());
    }

    #[test]
    fn test_separate_generators_start_equal() {
        let a = ContentTypeGenerator::new();
        let b = ContentTypeGenerator::new();
        assert_eq!(a.generate(), b.generate());
    }

    #[test]
    fn test_display() {
        let generator = ContentTypeGenerator::new();
        let ct = generator.generate();
        assert_eq!(ct.to_string(), "content-type:0");
    }
}
