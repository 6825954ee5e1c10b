#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub offset: usize, // byte offset into source
}

impl SourceLocation {
    pub fn new() -> Self {
        SourceLocation {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    pub fn advance(&mut self, source_char: char) {
        self.offset += source_char.len_utf8();
        if source_char == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    pub fn advance_str(&mut self, text: &str) {
        for c in text.chars() {
            self.advance(c);
        }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Represents a span within a source string, using an inclusive `start` location
/// and an exclusive `end` location.
///
/// `end` may point one position past the end of the source when the span
/// reaches end of input, so `source[start.offset..end.offset]` is always a valid
/// slice of the text the span was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }

    pub fn line(&self) -> usize {
        self.start.line
    }

    pub fn column(&self) -> usize {
        self.start.column
    }

    /// The span that starts where `self` starts and ends where `other` ends.
    pub fn to(&self, other: &SourceSpan) -> SourceSpan {
        SourceSpan::new(self.start.clone(), other.end.clone())
    }

    /// Returns a `&str` for this range, with an exclusive end.
    pub fn as_str<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start.offset..self.end.offset]
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start.offset..self.end.offset
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.start)
    }
}

impl From<SourceSpan> for miette::SourceSpan {
    fn from(span: SourceSpan) -> Self {
        let range = span.as_range();
        (range.start, range.end - range.start).into()
    }
}

pub trait Locatable {
    fn source_span(&self) -> SourceSpan;
}

impl<T: Locatable> Locatable for Box<T> {
    fn source_span(&self) -> SourceSpan {
        (**self).source_span()
    }
}
