//! Byte spans into the converted source and line/column lookup.

use serde::Serialize;

/// Half-open byte range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }

    /// Builds a span from `usize` offsets. `lexer::lex` refuses sources
    /// longer than `u32::MAX`, so the saturation never triggers in practice.
    pub fn from_offsets(start: usize, end: usize) -> Self {
        Span {
            start: saturating_u32(start),
            end: saturating_u32(end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// 1-based line and column of a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl core::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source text plus a precomputed table of line start offsets.
#[derive(Debug)]
pub struct SourceMap<'src> {
    text: &'src str,
    line_starts: Vec<u32>,
}

impl<'src> SourceMap<'src> {
    pub fn new(text: &'src str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| saturating_u32(i + 1)),
        );
        SourceMap { text, line_starts }
    }

    pub fn location(&self, offset: u32) -> SourceLocation {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.line_starts[line] as usize;
        let end = (offset as usize).min(self.text.len());
        let column = self
            .text
            .get(line_start..end)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(end.saturating_sub(line_start));
        SourceLocation {
            line: saturating_u32(line + 1),
            column: saturating_u32(column + 1),
        }
    }

    pub fn slice(&self, span: Span) -> &'src str {
        let start = (span.start as usize).min(self.text.len());
        let end = (span.end as usize).clamp(start, self.text.len());
        self.text.get(start..end).unwrap_or("")
    }

    /// First line of the spanned text, trimmed. Used to echo a construct
    /// inside a one-line comment.
    pub fn snippet(&self, span: Span) -> &'src str {
        self.slice(span).lines().next().unwrap_or("").trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_offsets_on_later_lines() {
        let map = SourceMap::new("x = 1\nyy = 2\n");
        assert_eq!(map.location(0), SourceLocation { line: 1, column: 1 });
        assert_eq!(map.location(6), SourceLocation { line: 2, column: 1 });
        assert_eq!(map.location(11), SourceLocation { line: 2, column: 6 });
    }

    #[test]
    fn snippet_keeps_first_line_only() {
        let source = "class Foo:\n    pass\n";
        let map = SourceMap::new(source);
        let span = Span::from_offsets(0, source.len());
        assert_eq!(map.snippet(span), "class Foo:");
    }

    #[test]
    fn slice_clamps_out_of_range_spans() {
        let map = SourceMap::new("abc");
        assert_eq!(map.slice(Span::new(1, 99)), "bc");
        assert_eq!(map.slice(Span::new(7, 9)), "");
    }
}
