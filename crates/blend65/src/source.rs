//! Source positions, spans, and the per-compilation source registry.
//!
//! Spans are small `Copy` values; the file they point into is identified by a
//! [`SourceId`] that indexes into a [`SourceRegistry`] owned by the current
//! compilation. Diagnostic formatters resolve snippets through the registry
//! handle instead of a process-wide table, so dropping a compilation releases
//! every retained source text.

use serde::{Deserialize, Serialize};

/// Identifier of one registered source file within a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(u16);

impl SourceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("too many source files"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A position in a source file: 1-based line and column plus byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl SourcePos {
    #[must_use]
    pub const fn new(line: u32, column: u32, offset: u32) -> Self {
        Self { line, column, offset }
    }
}

/// A half-open range in one source file.
///
/// `start <= end` always holds; [`SourceSpan::new`] normalizes swapped
/// endpoints rather than panicking so a buggy front-end degrades to an odd
/// span instead of aborting the compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub source: Option<SourceId>,
    pub start: SourcePos,
    pub end: SourcePos,
}

impl SourceSpan {
    #[must_use]
    pub fn new(source: Option<SourceId>, start: SourcePos, end: SourcePos) -> Self {
        if (start.line, start.column) <= (end.line, end.column) {
            Self { source, start, end }
        } else {
            Self {
                source,
                start: end,
                end: start,
            }
        }
    }

    /// A span that points nowhere, used for synthesized nodes.
    #[must_use]
    pub const fn synthetic() -> Self {
        Self {
            source: None,
            start: SourcePos::new(0, 0, 0),
            end: SourcePos::new(0, 0, 0),
        }
    }

    /// Span covering a single line/column pair, zero width.
    #[must_use]
    pub fn at(source: Option<SourceId>, line: u32, column: u32) -> Self {
        let pos = SourcePos::new(line, column, 0);
        Self::new(source, pos, pos)
    }

    /// Smallest span covering both `self` and `other`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            source: self.source.or(other.source),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

/// One registered source file: its name, full text, and line-end offsets.
#[derive(Debug)]
struct SourceFile {
    name: String,
    text: String,
    /// Byte offset of the end of each line, used for snippet extraction.
    line_ends: Vec<usize>,
}

/// Per-compilation store of source texts.
///
/// Registered once when the front-end hands its programs over; read by
/// diagnostic formatters to fetch the line a diagnostic points at. The
/// registry is dropped with the compilation, clearing all retained text.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    files: Vec<SourceFile>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source file and returns its id.
    pub fn register(&mut self, name: impl Into<String>, text: impl Into<String>) -> SourceId {
        let text = text.into();
        let mut line_ends = Vec::new();
        for (offset, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_ends.push(offset);
            }
        }
        line_ends.push(text.len());
        let id = SourceId::new(self.files.len());
        self.files.push(SourceFile {
            name: name.into(),
            text,
            line_ends,
        });
        id
    }

    /// Returns the registered name for `id`, if known.
    #[must_use]
    pub fn name(&self, id: SourceId) -> Option<&str> {
        self.files.get(id.index()).map(|f| f.name.as_str())
    }

    /// Returns the text of the 1-based `line` in source `id`.
    #[must_use]
    pub fn line(&self, id: SourceId, line: u32) -> Option<&str> {
        let file = self.files.get(id.index())?;
        let line = line.checked_sub(1)? as usize;
        let end = *file.line_ends.get(line)?;
        let start = if line == 0 { 0 } else { file.line_ends[line - 1] + 1 };
        file.text.get(start..end)
    }

    /// Returns the snippet a span covers, for diagnostic rendering.
    #[must_use]
    pub fn snippet(&self, span: SourceSpan) -> Option<&str> {
        self.line(span.source?, span.start.line)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
