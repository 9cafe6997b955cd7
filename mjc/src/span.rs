//! Source positions. Lines and columns count from 1, columns in bytes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    /// Byte offset from the start of the input.
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    pub const fn origin() -> Self {
        Self::new(0, 1, 1)
    }

    /// Position following `byte`. A newline starts the next line.
    pub const fn step(self, byte: u8) -> Self {
        if byte == b'\n' {
            Self::new(self.offset + 1, self.line + 1, 1)
        } else {
            Self::new(self.offset + 1, self.line, self.column + 1)
        }
    }
}

impl Default for Pos {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} col {}", self.line, self.column)
    }
}

/// Source extent of a token, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    pub const fn point(pos: Pos) -> Self {
        Self::new(pos, pos)
    }

    /// Length in bytes.
    pub const fn len(&self) -> usize {
        self.end.offset - self.start.offset
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_over_newlines() {
        let p = b"ab\nc".iter().fold(Pos::origin(), |p, &b| p.step(b));
        assert_eq!(p, Pos::new(4, 2, 2));
        assert_eq!(p.to_string(), "line 2 col 2");
    }

    #[test]
    fn span_length() {
        let start = Pos::origin();
        let end = start.step(b'x').step(b'y');
        assert_eq!(Span::new(start, end).len(), 2);
        assert!(Span::point(end).is_empty());
    }
}
