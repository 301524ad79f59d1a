#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A `Span` records what portion of a grammar's source text something (e.g. a rule name or an
/// error) references. The `Span` doesn't hold a reference / copy of the source itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Create a new span starting at byte `start` and ending at byte `end`.
    ///
    /// # Panics
    ///
    /// If `end` is less than `start`.
    pub fn new(start: usize, end: usize) -> Self {
        if end < start {
            panic!("Span starts ({}) after it ends ({})!", start, end);
        }
        Span { start, end }
    }

    /// A zero-width span pointing at byte `off`. Errors which are detected at a single point
    /// (e.g. "missing ':'") are reported with such spans.
    pub fn at(off: usize) -> Self {
        Span {
            start: off,
            end: off,
        }
    }

    /// Byte offset of the start of the span.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Byte offset of the end of the span.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Length in bytes of the span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if this `Span` covers 0 bytes, or `false` otherwise.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the 1-based `(line, column)` of this span's start within `src`. Columns count
    /// characters, not bytes.
    pub fn line_col(&self, src: &str) -> (usize, usize) {
        let before = &src[..self.start];
        let line = before.matches('\n').count() + 1;
        let col = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        (line, col)
    }
}

#[cfg(test)]
mod test {
    use super::Span;

    #[test]
    fn test_line_col() {
        let src = "%%\nS: 'a'\n  | 'b';";
        assert_eq!(Span::at(0).line_col(src), (1, 1));
        assert_eq!(Span::at(3).line_col(src), (2, 1));
        assert_eq!(Span::new(14, 17).line_col(src), (3, 5));
    }

    #[test]
    #[should_panic]
    fn test_backwards() {
        Span::new(2, 1);
    }
}
