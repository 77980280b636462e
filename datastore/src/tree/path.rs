use crate::Error;
use std::{fmt, str::FromStr};

/// Separator between segments of a [Path].
const SEPARATOR: char = '/';

/// An ordered sequence of segments addressing a node in the tree.
///
/// The empty path addresses the root. Paths render as `/a/b/c` and the root renders as `/`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<String>);

impl Path {
    /// The path of the root node.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a path of the form `/a/b/c`.
    ///
    /// A trailing separator is tolerated (`/a/` is `/a`), empty inner segments are not.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let Some(rest) = raw.strip_prefix(SEPARATOR) else {
            return Err(Error::InvalidPath(raw.to_string()));
        };
        let rest = rest.strip_suffix(SEPARATOR).unwrap_or(rest);
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in rest.split(SEPARATOR) {
            if segment.is_empty() {
                return Err(Error::InvalidPath(raw.to_string()));
            }
            segments.push(segment.to_string());
        }
        Ok(Self(segments))
    }

    /// Return a new path with `segment` appended.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is empty or contains the separator.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        assert!(
            !segment.is_empty() && !segment.contains(SEPARATOR),
            "invalid segment: {segment:?}"
        );
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// Return the parent of this path (or `None` for the root).
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// The top-level segment, used to route the path to a shard.
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `self` is an ancestor of (or equal to) `other`.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Return the segments of `self` below `prefix`, if `prefix` is an ancestor-or-equal.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<&[String]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "{SEPARATOR}");
        }
        for segment in &self.0 {
            write!(f, "{SEPARATOR}{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/" ; "root")]
    #[test_case("/a" ; "single")]
    #[test_case("/outer-list[0]/inner-list/inner-list[3]" ; "nested")]
    fn test_parse_display(raw: &str) {
        let path = Path::parse(raw).unwrap();
        assert_eq!(path.to_string(), raw);
    }

    #[test_case("" ; "empty")]
    #[test_case("a/b" ; "relative")]
    #[test_case("/a//b" ; "empty segment")]
    fn test_parse_invalid(raw: &str) {
        assert!(matches!(Path::parse(raw), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_trailing_separator() {
        assert_eq!(Path::parse("/a/b/").unwrap(), Path::parse("/a/b").unwrap());
    }

    #[test]
    fn test_prefix() {
        let a = Path::parse("/a").unwrap();
        let abc = Path::parse("/a/b/c").unwrap();
        let ab2 = Path::parse("/ab").unwrap();
        assert!(Path::root().is_prefix_of(&a));
        assert!(a.is_prefix_of(&a));
        assert!(a.is_prefix_of(&abc));
        assert!(!abc.is_prefix_of(&a));
        assert!(!a.is_prefix_of(&ab2));
        assert_eq!(
            abc.strip_prefix(&a).unwrap(),
            &["b".to_string(), "c".to_string()]
        );
        assert!(a.strip_prefix(&abc).is_none());
    }

    #[test]
    fn test_child_parent() {
        let path = Path::root().child("a").child("b");
        assert_eq!(path.to_string(), "/a/b");
        assert_eq!(path.first(), Some("a"));
        assert_eq!(path.parent().unwrap().to_string(), "/a");
        assert_eq!(Path::root().parent(), None);
        assert_eq!(Path::root().first(), None);
    }

    #[test]
    #[should_panic(expected = "invalid segment")]
    fn test_child_rejects_separator() {
        Path::root().child("a/b");
    }
}
