//! Table driven lexer over a set of cooperating scanners.
//!
//! All registered scanners are started on the same position and stepped in
//! lock step, one symbol per [`Lexer::scan`] call. Scanners drop out as
//! soon as the input can't continue their lexeme. When none is left running,
//! the earliest registered scanner that completed its lexeme wins, so the
//! registration order doubles as the priority order.

mod scanners;

use bit_set::BitSet;

use crate::source::{CodeBuffer, Position, Range};

pub use scanners::{
    parse_number, CommentScanner, DelimiterScanner, NumberScanner, OperatorScanner, QuotedScanner,
    Scanner, SeparatorScanner, WordScanner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    Before,
    Inside,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexResult<K> {
    FoundNothing,
    StillScanning,
    FoundToken(K),
}

#[derive(Debug, Clone)]
pub struct Lexer<K> {
    scanners: Vec<(K, Scanner)>,
    states: Vec<ScanState>,
    cursors: Vec<Position>,
    attempted: BitSet,
    active: BitSet,
    finished: BitSet,
    start: Position,
    winner: Option<usize>,
}

impl<K: Copy> Default for Lexer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy> Lexer<K> {
    pub fn new() -> Self {
        Self {
            scanners: Vec::new(),
            states: Vec::new(),
            cursors: Vec::new(),
            attempted: BitSet::new(),
            active: BitSet::new(),
            finished: BitSet::new(),
            start: Position::default(),
            winner: None,
        }
    }

    pub fn add(&mut self, kind: K, scanner: Scanner) {
        self.scanners.push((kind, scanner));
        self.states.push(ScanState::Before);
        self.cursors.push(Position::default());
    }

    pub fn with(mut self, kind: K, scanner: Scanner) -> Self {
        self.add(kind, scanner);
        self
    }

    /// Starts a new lexeme at `position`.
    pub fn begin(&mut self, position: Position) {
        self.start = position;
        self.attempted.clear();
        self.active.clear();
        self.finished.clear();
        self.winner = None;
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn scan(&mut self, code: &CodeBuffer) -> LexResult<K> {
        if self.attempted.is_empty() && self.winner.is_none() {
            for i in 0..self.scanners.len() {
                self.attempted.insert(i);
                self.states[i] = ScanState::Before;
                self.cursors[i] = self.start;
                self.scanners[i].1.reset();
                self.step(i, code);
            }
        } else {
            let active: Vec<usize> = self.active.iter().collect();
            for i in active {
                self.step(i, code);
            }
        }

        if !self.active.is_empty() {
            return LexResult::StillScanning;
        }
        self.winner = self.finished.iter().next();
        match self.winner {
            Some(i) => LexResult::FoundToken(self.scanners[i].0),
            None => LexResult::FoundNothing,
        }
    }

    // steps until a lexeme is found or every scanner gave up
    pub fn scan_all(&mut self, code: &CodeBuffer) -> LexResult<K> {
        loop {
            match self.scan(code) {
                LexResult::StillScanning => continue,
                result => return result,
            }
        }
    }

    fn step(&mut self, i: usize, code: &CodeBuffer) {
        let accepted = self.scanners[i]
            .1
            .scan(&mut self.states[i], code, &mut self.cursors[i]);
        if !accepted {
            self.active.remove(i);
        } else if self.states[i] == ScanState::After {
            self.active.remove(i);
            self.finished.insert(i);
        } else {
            self.active.insert(i);
        }
    }

    pub fn winner(&self) -> Option<&Scanner> {
        self.winner.map(|i| &self.scanners[i].1)
    }

    // range of the winning lexeme, empty when nothing was found
    pub fn range(&self) -> Range {
        match self.winner {
            Some(i) => Range::new(self.start, self.cursors[i]),
            None => Range::unitary(self.start),
        }
    }

    pub fn end(&self) -> Position {
        self.range().end()
    }
}
