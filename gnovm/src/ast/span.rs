//! Source location tracking

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A line/column position. Lines and columns start at 1; zero means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_zero(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span in the source code.
///
/// `num` disambiguates spans that cover the same text, such as synthetic
/// nodes created by the preprocessor around an existing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub pos: Pos,
    pub end: Pos,
    pub num: i32,
}

impl Span {
    pub fn new(pos: Pos, end: Pos) -> Self {
        Self { pos, end, num: 0 }
    }

    pub fn at(line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self::new(Pos::new(line, column), Pos::new(end_line, end_column))
    }

    pub fn is_zero(&self) -> bool {
        self.pos.is_zero() && self.end.is_zero() && self.num == 0
    }

    pub fn line(&self) -> u32 {
        self.pos.line
    }

    /// Orders by start ascending, then end descending, then `num`
    /// ascending. A span that contains another sorts first.
    pub fn compare(&self, other: &Span) -> Ordering {
        self.pos
            .cmp(&other.pos)
            .then_with(|| other.end.cmp(&self.end))
            .then_with(|| self.num.cmp(&other.num))
    }

    /// Returns true if `other` lies within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.pos <= other.pos && other.end <= self.end
    }

    /// The minimal span covering both inputs.
    pub fn union(self, other: Span) -> Span {
        if self.pos == other.pos && self.end == other.end {
            return Span {
                pos: self.pos,
                end: self.end,
                num: self.num.min(other.num) - 1,
            };
        }
        Span {
            pos: self.pos.min(other.pos),
            end: self.end.max(other.end),
            num: 0,
        }
    }
}

impl PartialOrd for Span {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Span {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.num != 0 {
            write!(f, "{}-{}#{}", self.pos, self.end, self.num)
        } else {
            write!(f, "{}-{}", self.pos, self.end)
        }
    }
}

/// Identity of a block node: package path, file name and span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub pkg_path: String,
    pub file: String,
    pub span: Span,
}

impl Location {
    pub fn new(pkg_path: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Self {
            pkg_path: pkg_path.into(),
            file: file.into(),
            span,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.pkg_path.is_empty() && self.file.is_empty() && self.span.is_zero()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}:{}",
            self.pkg_path, self.file, self.span.pos.line, self.span.pos.column
        )
    }
}

/// Byte offset of a position within `source`, for diagnostics.
pub fn offset_of(source: &str, pos: Pos) -> usize {
    if pos.line == 0 {
        return 0;
    }
    let mut line = 1;
    let mut offset = 0;
    for (i, c) in source.char_indices() {
        if line == pos.line {
            offset = i;
            break;
        }
        if c == '\n' {
            line += 1;
            offset = i + 1;
        }
    }
    if line < pos.line {
        return source.len();
    }
    let col = pos.column.saturating_sub(1) as usize;
    (offset + col).min(source.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ====================================================================
    // Span ordering
    // ====================================================================

    #[test]
    fn test_span_compare_start_first() {
        let a = Span::at(1, 1, 1, 5);
        let b = Span::at(1, 2, 1, 3);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
    }

    #[test]
    fn test_span_containing_sorts_first() {
        let outer = Span::at(2, 1, 9, 1);
        let inner = Span::at(2, 1, 3, 1);
        assert!(outer.contains(&inner));
        assert_eq!(outer.compare(&inner), Ordering::Less);
    }

    #[test]
    fn test_span_num_breaks_ties() {
        let mut a = Span::at(1, 1, 1, 4);
        let b = a;
        a.num = -1;
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&b), Ordering::Equal);
    }

    #[test]
    fn test_span_sort_is_total() {
        let mut spans = vec![
            Span::at(3, 1, 3, 2),
            Span::at(1, 1, 10, 1),
            Span::at(1, 1, 2, 1),
            Span::at(2, 5, 2, 6),
        ];
        spans.sort();
        assert_eq!(spans[0], Span::at(1, 1, 10, 1));
        assert_eq!(spans[1], Span::at(1, 1, 2, 1));
        assert_eq!(spans[3], Span::at(3, 1, 3, 2));
    }

    // ====================================================================
    // Span union
    // ====================================================================

    #[test]
    fn test_span_union_covers_both() {
        let a = Span::at(1, 4, 2, 1);
        let b = Span::at(1, 2, 1, 8);
        let u = a.union(b);
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert_eq!(u, Span::at(1, 2, 2, 1));
    }

    #[test]
    fn test_span_union_identical_decrements_num() {
        let a = Span::at(4, 1, 4, 9);
        let u = a.union(a);
        assert_eq!(u.pos, a.pos);
        assert_eq!(u.end, a.end);
        assert_eq!(u.num, -1);
        assert_eq!(u.compare(&a), Ordering::Less);
    }

    #[test]
    fn test_span_display() {
        assert_eq!(Span::at(1, 2, 3, 4).to_string(), "1:2-3:4");
    }

    // ====================================================================
    // Location
    // ====================================================================

    #[test]
    fn test_location_display() {
        let loc = Location::new("gno.land/r/demo", "main.gno", Span::at(7, 3, 9, 1));
        assert_eq!(loc.to_string(), "gno.land/r/demo/main.gno:7:3");
    }

    #[test]
    fn test_offset_of() {
        let src = "ab\ncde\nf";
        assert_eq!(offset_of(src, Pos::new(1, 1)), 0);
        assert_eq!(offset_of(src, Pos::new(2, 2)), 4);
        assert_eq!(offset_of(src, Pos::new(3, 1)), 7);
    }
}
