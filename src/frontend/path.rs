//! Type paths.
//!
//! A type path names a location in the global type tree, such as
//! `/obj/item` or `/mob/proc/attack`. Paths are plain values: two paths
//! are equal when their kind and segments are equal.

use serde::{Serialize, Deserialize};
use std::fmt;

/// How a path is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    /// `/a/b`
    Absolute,
    /// `a/b`
    Relative,
    /// `:a/b`
    DownwardSearch,
    /// `.a/b`
    UpwardSearch,
}

/// A path through the type tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypePath {
    /// How the path is anchored
    pub kind: PathKind,
    /// The `/`-separated segments
    pub elements: Vec<String>,
}

impl TypePath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self { kind: PathKind::Absolute, elements: Vec::new() }
    }

    /// Build a path from its parts, dropping empty segments and folding `..`.
    pub fn new(kind: PathKind, elements: Vec<String>) -> Self {
        let mut path = Self { kind, elements };
        path.normalize();
        path
    }

    /// Parse a path from text such as `/obj/item`, `:item` or `proc/foo`.
    pub fn parse(text: &str) -> Self {
        let (kind, rest) = match text.chars().next() {
            Some('/') => (PathKind::Absolute, text),
            Some(':') => (PathKind::DownwardSearch, &text[1..]),
            Some('.') if !text.starts_with("..") => (PathKind::UpwardSearch, &text[1..]),
            _ => (PathKind::Relative, text),
        };
        let mut elements: Vec<String> = rest
            .split('/')
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        // `operator/` and `operator/=` contain the separator.
        if rest.ends_with("operator/") {
            if let Some(last) = elements.last_mut() {
                *last = "operator/".to_string();
            }
        } else if rest.ends_with("operator/=") && elements.len() >= 2 {
            elements.pop();
            if let Some(last) = elements.last_mut() {
                *last = "operator/=".to_string();
            }
        }

        Self::new(kind, elements)
    }

    /// An absolute path from segments.
    pub fn absolute<S: AsRef<str>>(elements: &[S]) -> Self {
        Self::new(PathKind::Absolute, elements.iter().map(|e| e.as_ref().to_string()).collect())
    }

    fn normalize(&mut self) {
        self.elements.retain(|e| !e.is_empty());
        if !self.elements.iter().any(|e| e == "..") {
            return;
        }
        let mut normalized: Vec<String> = Vec::with_capacity(self.elements.len());
        for element in self.elements.drain(..) {
            if element == ".." {
                normalized.pop();
            } else {
                normalized.push(element);
            }
        }
        self.elements = normalized;
    }

    /// The last segment, if any.
    pub fn last_element(&self) -> Option<&str> {
        self.elements.last().map(String::as_str)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.kind == PathKind::Absolute && self.elements.is_empty()
    }

    /// Index of the first segment equal to `element`.
    pub fn find_element(&self, element: &str) -> Option<usize> {
        self.elements.iter().position(|e| e == element)
    }

    /// Absolute path made from the segments in `start..end`.
    pub fn from_elements(&self, start: usize, end: usize) -> TypePath {
        let end = end.min(self.elements.len());
        let start = start.min(end);
        Self::new(PathKind::Absolute, self.elements[start..end].to_vec())
    }

    /// Path with the segment at `index` removed, same kind.
    pub fn remove_element(&self, index: usize) -> TypePath {
        let mut elements = self.elements.clone();
        if index < elements.len() {
            elements.remove(index);
        }
        Self::new(self.kind, elements)
    }

    /// Path with `segment` (which may contain `/`) appended.
    pub fn add_to_path(&self, segment: &str) -> TypePath {
        let mut elements = self.elements.clone();
        elements.extend(segment.split('/').filter(|e| !e.is_empty()).map(str::to_string));
        Self::new(self.kind, elements)
    }

    /// Resolve `other` relative to this path.
    ///
    /// Absolute paths replace this one; relative and search paths are
    /// appended.
    pub fn combine(&self, other: &TypePath) -> TypePath {
        match other.kind {
            PathKind::Absolute => other.clone(),
            _ => {
                let mut elements = self.elements.clone();
                elements.extend(other.elements.iter().cloned());
                Self::new(self.kind, elements)
            }
        }
    }

    /// The enclosing path, or `None` at the root.
    pub fn parent(&self) -> Option<TypePath> {
        if self.elements.is_empty() {
            return None;
        }
        let mut elements = self.elements.clone();
        elements.pop();
        Some(Self { kind: self.kind, elements })
    }

    /// The same segments, anchored at the root.
    pub fn to_absolute(&self) -> TypePath {
        Self { kind: PathKind::Absolute, elements: self.elements.clone() }
    }

    /// Whether `self` is `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &TypePath) -> bool {
        self.elements.len() >= ancestor.elements.len()
            && self.elements.iter().zip(&ancestor.elements).all(|(a, b)| a == b)
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            PathKind::Absolute => "/",
            PathKind::Relative => "",
            PathKind::DownwardSearch => ":",
            PathKind::UpwardSearch => ".",
        };
        write!(f, "{}{}", prefix, self.elements.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(TypePath::parse("/obj/item").kind, PathKind::Absolute);
        assert_eq!(TypePath::parse("obj/item").kind, PathKind::Relative);
        assert_eq!(TypePath::parse(":item").kind, PathKind::DownwardSearch);
        assert_eq!(TypePath::parse(".item").kind, PathKind::UpwardSearch);
        assert_eq!(TypePath::parse("/obj/item").elements, vec!["obj", "item"]);
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["/obj/item", "proc/foo", ":item", ".sub", "/"] {
            assert_eq!(TypePath::parse(text).to_string(), text);
        }
    }

    #[test]
    fn test_normalize_parent_segments() {
        let path = TypePath::new(PathKind::Absolute, vec!["a".into(), "b".into(), "..".into(), "c".into()]);
        assert_eq!(path.to_string(), "/a/c");
    }

    #[test]
    fn test_operator_segments() {
        assert_eq!(TypePath::parse("/datum/proc/operator/").last_element(), Some("operator/"));
        assert_eq!(TypePath::parse("/datum/proc/operator/=").last_element(), Some("operator/="));
    }

    #[test]
    fn test_combine() {
        let base = TypePath::parse("/obj");
        assert_eq!(base.combine(&TypePath::parse("item")).to_string(), "/obj/item");
        assert_eq!(base.combine(&TypePath::parse("/mob")).to_string(), "/mob");
    }

    #[test]
    fn test_element_operations() {
        let path = TypePath::parse("/obj/proc/foo");
        assert_eq!(path.find_element("proc"), Some(1));
        assert_eq!(path.from_elements(0, 1).to_string(), "/obj");
        assert_eq!(path.remove_element(1).to_string(), "/obj/foo");
        assert_eq!(path.parent().map(|p| p.to_string()), Some("/obj/proc".to_string()));
        assert!(path.starts_with(&TypePath::parse("/obj")));
    }
}
