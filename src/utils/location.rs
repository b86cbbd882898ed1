//! Source location tracking for diagnostics.
//!
//! Every token, AST node and resolved expression carries a [`Span`].
//! Spans are `Copy` and tagged with a [`FileId`] so that a diagnostic
//! raised deep inside an embedded string expression still points at the
//! file it came from.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Identifies a source file registered with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// A position in source code (line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of file
    pub offset: usize,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }

    /// Create a location at the start of a file.
    pub fn start() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A range of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// File the span belongs to
    pub file: FileId,
    /// Start line (1-indexed)
    pub start_line: usize,
    /// Start column (1-indexed)
    pub start_column: usize,
    /// End line (1-indexed)
    pub end_line: usize,
    /// End column (1-indexed)
    pub end_column: usize,
    /// Byte offset of start
    pub start_offset: usize,
    /// Byte offset of end
    pub end_offset: usize,
}

impl Span {
    /// Create a new span in the default file.
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            file: FileId::default(),
            start_line,
            start_column,
            end_line,
            end_column,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a span from start and end locations.
    pub fn from_locations(file: FileId, start: SourceLocation, end: SourceLocation) -> Self {
        Self {
            file,
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
            start_offset: start.offset,
            end_offset: end.offset,
        }
    }

    /// Create a dummy span (for synthesized nodes).
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Check if this span is a dummy span.
    pub fn is_dummy(&self) -> bool {
        self.start_line == 0 && self.end_line == 0
    }

    /// Get the start location.
    pub fn start(&self) -> SourceLocation {
        SourceLocation::new(self.start_line, self.start_column, self.start_offset)
    }

    /// Get the end location.
    pub fn end(&self) -> SourceLocation {
        SourceLocation::new(self.end_line, self.end_column, self.end_offset)
    }

    /// Merge two spans to create a span covering both.
    ///
    /// Dummy spans are absorbed: merging with one returns the other span.
    pub fn merge(&self, other: &Span) -> Span {
        if self.is_dummy() {
            return *other;
        }
        if other.is_dummy() {
            return *self;
        }
        let start = if (self.start_line, self.start_column) <= (other.start_line, other.start_column) {
            self.start()
        } else {
            other.start()
        };
        let end = if (self.end_line, self.end_column) >= (other.end_line, other.end_column) {
            self.end()
        } else {
            other.end()
        };
        Span::from_locations(self.file, start, end)
    }

    /// Get the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}-{}", self.start_line, self.start_column, self.end_column)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}

/// Line index over one source file, used to render diagnostics.
#[derive(Debug, Clone)]
pub struct SourceMap {
    name: String,
    source: String,
    line_starts: Vec<usize>,
}

impl SourceMap {
    /// Create a new source map.
    pub fn new(name: impl Into<String>, source: String) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { name: name.into(), source, line_starts }
    }

    /// The display name of the file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get a line of source code.
    pub fn line(&self, line_number: usize) -> Option<&str> {
        if line_number == 0 || line_number > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line_number - 1];
        let end = self.line_starts
            .get(line_number)
            .copied()
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches(['\n', '\r']))
    }

    /// Get the number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Format a span as `file:line:column`.
    pub fn describe(&self, span: &Span) -> String {
        format!("{}:{}:{}", self.name, span.start_line, span.start_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        let span = Span::new(1, 5, 1, 10);
        assert_eq!(format!("{}", span), "1:5-10");

        let span = Span::new(1, 5, 3, 10);
        assert_eq!(format!("{}", span), "1:5-3:10");
    }

    #[test]
    fn test_span_merge() {
        let span1 = Span::new(1, 1, 1, 5);
        let span2 = Span::new(1, 10, 1, 15);
        let merged = span1.merge(&span2);
        assert_eq!(merged.start_column, 1);
        assert_eq!(merged.end_column, 15);
    }

    #[test]
    fn test_merge_with_dummy_keeps_real_span() {
        let real = Span::new(2, 3, 2, 8);
        assert_eq!(Span::dummy().merge(&real), real);
        assert_eq!(real.merge(&Span::dummy()), real);
    }

    #[test]
    fn test_source_map_lines() {
        let map = SourceMap::new("test.dm", "/obj\r\n\tvar/x\n".to_string());
        assert_eq!(map.line(1), Some("/obj"));
        assert_eq!(map.line(2), Some("\tvar/x"));
        assert_eq!(map.describe(&Span::new(2, 2, 2, 5)), "test.dm:2:2");
    }
}
