use std::fmt;

use super::files::FileIdx;
use super::symbol::{symbols_to_string, Symbol};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) file: FileIdx,
    // 1-based line number in the file this line was read from
    pub(crate) number: u32,
}

impl CodeLine {
    pub fn new(file: FileIdx, number: u32, text: &str) -> Self {
        let text = text.strip_suffix('\r').unwrap_or(text);
        Self {
            symbols: text.chars().map(Symbol::new).collect(),
            file,
            number,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn file(&self) -> FileIdx {
        self.file
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Cursor into the code buffer: a line index and a column within that line.
///
/// A column equal to the line length addresses the end of the line. A line
/// index equal to the number of lines addresses the end of the buffer.
/// Positions are plain values: after a structural edit, any position captured
/// before it must be passed through [`CodeBuffer::validate`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    // position `n` symbols further along the same line
    pub fn offset(self, n: usize) -> Self {
        Self {
            line: self.line,
            column: self.column + n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    begin: Position,
    end: Position,
}

impl Range {
    pub fn new(a: Position, b: Position) -> Self {
        if a <= b {
            Self { begin: a, end: b }
        } else {
            Self { begin: b, end: a }
        }
    }

    pub fn unitary(position: Position) -> Self {
        Self {
            begin: position,
            end: position,
        }
    }

    pub fn begin(&self) -> Position {
        self.begin
    }

    pub fn end(&self) -> Position {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn contains(&self, position: Position) -> bool {
        self.begin <= position && position < self.end
    }

    // smallest range covering both
    pub fn join(self, other: Range) -> Range {
        Range {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    pub fn format(&self, code: &CodeBuffer) -> String {
        code.format(*self)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.begin.line + 1,
            self.begin.column + 1,
            self.end.line + 1,
            self.end.column + 1
        )
    }
}

// line-structured code buffer; line splitting is preserved across edits so
// that end-of-line keeps its meaning for directives and statements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBuffer {
    lines: Vec<CodeLine>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_source(file: FileIdx, text: &str) -> Self {
        Self {
            lines: Self::lines_from_source(file, text),
        }
    }

    pub fn lines_from_source(file: FileIdx, text: &str) -> Vec<CodeLine> {
        text.split('\n')
            .enumerate()
            .map(|(index, line)| CodeLine::new(file, index as u32 + 1, line))
            .collect()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&CodeLine> {
        self.lines.get(index)
    }

    pub fn begin(&self) -> Position {
        Position::new(0, 0)
    }

    pub fn end(&self) -> Position {
        Position::new(self.lines.len(), 0)
    }

    pub fn is_eof(&self, position: Position) -> bool {
        position.line >= self.lines.len()
    }

    pub fn symbol(&self, position: Position) -> Symbol {
        match self.lines.get(position.line) {
            Some(line) => match line.symbols.get(position.column) {
                Some(symbol) => *symbol,
                None => Symbol::EOL,
            },
            None => Symbol::EOF,
        }
    }

    // moves over end-of-line onto the next line; stays put at end of buffer
    pub fn next(&self, position: Position) -> Position {
        match self.lines.get(position.line) {
            Some(line) if position.column < line.len() => position.offset(1),
            Some(_) => Position::new(position.line + 1, 0),
            None => self.end(),
        }
    }

    pub fn line_end(&self, position: Position) -> Position {
        match self.lines.get(position.line) {
            Some(line) => Position::new(position.line, line.len()),
            None => self.end(),
        }
    }

    pub fn next_line(&self, position: Position) -> Position {
        if self.is_eof(position) {
            self.end()
        } else {
            Position::new(position.line + 1, 0)
        }
    }

    // clamps a stale position onto the current buffer contents
    pub fn validate(&self, position: Position) -> Position {
        match self.lines.get(position.line) {
            Some(line) => Position::new(position.line, position.column.min(line.len())),
            None => self.end(),
        }
    }

    /// Inserts `code` at `position` and returns the range it now occupies.
    pub fn insert(&mut self, position: Position, code: &[Symbol]) -> Range {
        let position = self.validate(position);
        let Some(line) = self.lines.get_mut(position.line) else {
            return Range::unitary(position);
        };
        line.symbols
            .splice(position.column..position.column, code.iter().copied());
        Range::new(position, position.offset(code.len()))
    }

    /// Removes the symbols covered by `range`. Lines are never removed: a
    /// range spanning several lines empties the lines in between and keeps
    /// the tail of the last line on its own line.
    pub fn erase(&mut self, range: Range) -> Position {
        let begin = self.validate(range.begin());
        let end = self.validate(range.end());
        if self.is_eof(begin) {
            return begin;
        }

        if begin.line == end.line {
            self.lines[begin.line]
                .symbols
                .drain(begin.column..end.column);
        } else {
            self.lines[begin.line].symbols.truncate(begin.column);
            let last = end.line.min(self.lines.len());
            for line in &mut self.lines[begin.line + 1..last] {
                line.symbols.clear();
            }
            if end.line < self.lines.len() {
                self.lines[end.line].symbols.drain(..end.column);
            }
        }
        begin
    }

    pub fn replace(&mut self, range: Range, code: &[Symbol]) -> Range {
        let begin = self.erase(range);
        self.insert(begin, code)
    }

    // splices whole lines in after `after_line`
    pub fn insert_lines(&mut self, after_line: usize, lines: Vec<CodeLine>) {
        let at = (after_line + 1).min(self.lines.len());
        self.lines.splice(at..at, lines);
    }

    pub fn slice(&self, range: Range) -> Vec<Symbol> {
        let begin = self.validate(range.begin());
        let end = self.validate(range.end());
        let mut out = Vec::new();
        let mut line = begin.line;
        while line < self.lines.len() && line <= end.line {
            let symbols = &self.lines[line].symbols;
            let from = if line == begin.line { begin.column } else { 0 };
            let to = if line == end.line {
                end.column
            } else {
                symbols.len()
            };
            if from < to {
                out.extend_from_slice(&symbols[from..to]);
            }
            if line != end.line && line + 1 < self.lines.len() {
                out.push(Symbol::EOL);
            }
            line += 1;
        }
        out
    }

    pub fn format(&self, range: Range) -> String {
        symbols_to_string(&self.slice(range))
    }

    // file and 1-based line/column of a position, for diagnostics
    pub fn origin(&self, position: Position) -> Option<(FileIdx, u32, u32)> {
        let line = self.lines.get(position.line).or_else(|| self.lines.last())?;
        Some((line.file, line.number, position.column as u32 + 1))
    }
}

impl fmt::Display for CodeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", symbols_to_string(&line.symbols))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use scrip_util::Idx;

    use super::*;
    use crate::source::symbol::symbols_from_str;

    fn buffer(text: &str) -> CodeBuffer {
        CodeBuffer::from_source(FileIdx::from_usize(0), text)
    }

    #[test]
    fn test_format_round_trip() {
        let code = buffer("WAIT 0\nX = 2+2;");
        let range = Range::new(Position::new(1, 4), Position::new(1, 7));
        assert_eq!(range.format(&code), "2+2");

        let across = Range::new(Position::new(0, 5), Position::new(1, 1));
        assert_eq!(across.format(&code), "0\nX");
    }

    #[test]
    fn test_range_is_ordered() {
        let range = Range::new(Position::new(2, 0), Position::new(1, 5));
        assert!(range.begin() <= range.end());
        assert_eq!(range.begin(), Position::new(1, 5));
    }

    #[test]
    fn test_sentinels() {
        let code = buffer("ab");
        assert_eq!(code.symbol(Position::new(0, 1)), Symbol::new('b'));
        assert!(code.symbol(Position::new(0, 2)).is_eol());
        assert!(code.symbol(Position::new(1, 0)).is_eof());
        assert_eq!(code.next(Position::new(0, 2)), Position::new(1, 0));

        // a NUL in the text is an ordinary symbol
        let code = buffer("a\0b");
        let nul = code.symbol(Position::new(0, 1));
        assert_eq!(nul.char(), '\0');
        assert!(!nul.is_end());
        assert_ne!(nul, Symbol::EOF);
    }

    #[test]
    fn test_replace_and_validate() {
        let mut code = buffer("X = FOO;");
        let foo = Range::new(Position::new(0, 4), Position::new(0, 7));
        let inserted = code.replace(foo, &symbols_from_str("2+2"));
        assert_eq!(code.to_string(), "X = 2+2;");
        assert_eq!(inserted.format(&code), "2+2");

        // stale position past the shortened line is clamped
        let mut code = buffer("LONG_NAME");
        let stale = Position::new(0, 9);
        code.erase(Range::new(Position::new(0, 1), Position::new(0, 9)));
        assert_eq!(code.validate(stale), Position::new(0, 1));
    }

    #[test]
    fn test_erase_across_lines_keeps_lines() {
        let mut code = buffer("a /* one\ntwo\nthree */ b");
        let range = Range::new(Position::new(0, 2), Position::new(2, 8));
        let at = code.erase(range);
        code.insert(at, &[Symbol::SPACE]);
        assert_eq!(code.line_count(), 3);
        assert_eq!(code.to_string(), "a  \n\n b");
    }

    #[test]
    fn test_insert_lines() {
        let mut code = buffer("first\nlast");
        let file = FileIdx::from_usize(1);
        code.insert_lines(0, CodeBuffer::lines_from_source(file, "inc1\ninc2"));
        assert_eq!(code.to_string(), "first\ninc1\ninc2\nlast");
        assert_eq!(code.origin(Position::new(2, 0)), Some((file, 2, 1)));
    }
}
