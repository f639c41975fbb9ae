//! Lightweight URI wrapper.
//!
//! The core only needs the scheme for sub-loader dispatch; everything after
//! it is opaque and handed to the selected loader untouched. Path or network
//! resolution belongs to the host's loaders, not to this type.

use std::fmt;

/// A content address with a parsed scheme.
///
/// # Example
///
/// ```
/// use tilestream::loader::Uri;
///
/// let uri = Uri::new("file:///terrain/root.json");
/// assert_eq!(uri.scheme(), Some("file"));
/// assert_eq!(uri.as_str(), "file:///terrain/root.json");
///
/// let relative = Uri::new("tiles/0/0/0.tile");
/// assert_eq!(relative.scheme(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    raw: String,
    scheme_len: Option<usize>,
}

impl Uri {
    /// Wraps a raw URI string, detecting its scheme if present.
    ///
    /// A scheme is an ASCII-alphabetic character followed by alphanumerics,
    /// `+`, `-` or `.`, terminated by `:` (RFC 3986 syntax). Strings without
    /// one are kept verbatim and report `scheme() == None`.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let scheme_len = parse_scheme(&raw);
        Self { raw, scheme_len }
    }

    /// Returns the URI scheme, if the string has one. Schemes are matched
    /// case-sensitively, exactly as registered.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme_len.map(|len| &self.raw[..len])
    }

    /// Returns the full raw URI string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Uri {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Uri {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Returns the byte length of the scheme if `raw` starts with one.
fn parse_scheme(raw: &str) -> Option<usize> {
    let colon = raw.find(':')?;
    if colon == 0 {
        return None;
    }
    let candidate = &raw[..colon];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(colon)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parsed() {
        let uri = Uri::new("http://example.com/tileset.json");
        assert_eq!(uri.scheme(), Some("http"));
    }

    #[test]
    fn test_file_scheme() {
        let uri = Uri::new("file:///data/root.json");
        assert_eq!(uri.scheme(), Some("file"));
    }

    #[test]
    fn test_relative_path_has_no_scheme() {
        let uri = Uri::new("tiles/3/5/7.tile");
        assert_eq!(uri.scheme(), None);
    }

    #[test]
    fn test_windows_drive_is_not_a_scheme() {
        // Single letters parse as schemes under RFC 3986; callers passing
        // bare Windows paths must use the file scheme instead.
        let uri = Uri::new("C:/data/root.json");
        assert_eq!(uri.scheme(), Some("C"));
    }

    #[test]
    fn test_leading_colon_has_no_scheme() {
        let uri = Uri::new(":oops");
        assert_eq!(uri.scheme(), None);
    }

    #[test]
    fn test_scheme_with_plus_and_dot() {
        let uri = Uri::new("svn+ssh://host/repo");
        assert_eq!(uri.scheme(), Some("svn+ssh"));
    }

    #[test]
    fn test_digit_first_is_not_a_scheme() {
        let uri = Uri::new("3d://tiles");
        assert_eq!(uri.scheme(), None);
    }

    #[test]
    fn test_display_round_trips() {
        let uri = Uri::new("synthetic://tile/0/0/0");
        assert_eq!(uri.to_string(), "synthetic://tile/0/0/0");
    }
}
