use std::{collections::HashSet, rc::Rc};

use crate::model::{constant::Constant, operators::OperatorIdx, operators::OperatorTrie};
use crate::source::{CodeBuffer, Position, Symbol};
use crate::tokens::{DelimiterKind, DelimiterSide};

use super::ScanState;

/// Every kind of scanner the lexer can run. Each variant carries the payload
/// of the lexeme it last scanned.
#[derive(Debug, Clone)]
pub enum Scanner {
    Comment(CommentScanner),
    Directive(WordScanner),
    Label(WordScanner),
    Identifier(WordScanner),
    Number(NumberScanner),
    String(QuotedScanner),
    Character(QuotedScanner),
    Operator(OperatorScanner),
    Delimiter(DelimiterScanner),
    Separator(SeparatorScanner),
}

impl Scanner {
    pub fn comment() -> Self {
        Scanner::Comment(CommentScanner::default())
    }

    pub fn directive() -> Self {
        Scanner::Directive(WordScanner::default())
    }

    pub fn label() -> Self {
        Scanner::Label(WordScanner::default())
    }

    pub fn identifier() -> Self {
        Scanner::Identifier(WordScanner::default())
    }

    pub fn number() -> Self {
        Scanner::Number(NumberScanner::default())
    }

    pub fn string() -> Self {
        Scanner::String(QuotedScanner::new('"'))
    }

    pub fn character() -> Self {
        Scanner::Character(QuotedScanner::new('\''))
    }

    pub fn operator(trie: Rc<OperatorTrie<OperatorIdx>>) -> Self {
        Scanner::Operator(OperatorScanner::new(trie))
    }

    pub fn delimiter(cast_types: Rc<HashSet<String>>) -> Self {
        Scanner::Delimiter(DelimiterScanner::new(cast_types))
    }

    pub fn separator() -> Self {
        Scanner::Separator(SeparatorScanner::default())
    }

    // clears the payload before a new attempt
    pub(super) fn reset(&mut self) {
        match self {
            Scanner::Comment(s) => *s = CommentScanner::default(),
            Scanner::Directive(s) | Scanner::Label(s) | Scanner::Identifier(s) => s.word.clear(),
            Scanner::Number(s) => *s = NumberScanner::default(),
            Scanner::String(s) | Scanner::Character(s) => *s = QuotedScanner::new(s.quote),
            Scanner::Operator(s) => {
                s.node = OperatorTrie::<OperatorIdx>::ROOT;
                s.last = None;
            }
            Scanner::Delimiter(s) => {
                s.kind = None;
                s.type_name = None;
            }
            Scanner::Separator(s) => s.statement = false,
        }
    }

    /// Runs one step of the scanner. Returns false when the input at
    /// `cursor` can't continue the lexeme. Advances `cursor` over whatever
    /// it consumes; the lexeme ends at `cursor` once the state is After.
    pub fn scan(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        match self {
            Scanner::Comment(s) => s.scan(state, code, cursor),
            Scanner::Directive(s) => s.scan_directive(state, code, cursor),
            Scanner::Label(s) => s.scan_label(state, code, cursor),
            Scanner::Identifier(s) => s.scan_identifier(state, code, cursor),
            Scanner::Number(s) => s.scan(state, code, cursor),
            Scanner::String(s) | Scanner::Character(s) => s.scan(state, code, cursor),
            Scanner::Operator(s) => s.scan(state, code, cursor),
            Scanner::Delimiter(s) => s.scan(state, code, cursor),
            Scanner::Separator(s) => s.scan(state, code, cursor),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommentScanner {
    pub block: bool,
    pub terminated: bool,
    depth: u32,
}

impl CommentScanner {
    fn scan(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        let symbol = code.symbol(*cursor);
        let next = code.symbol(cursor.offset(1));
        match state {
            ScanState::Before => {
                if !symbol.is('/') {
                    return false;
                }
                if next.is('/') {
                    self.block = false;
                } else if next.is('*') {
                    self.block = true;
                    self.depth = 1;
                } else {
                    return false;
                }
                *cursor = cursor.offset(2);
                *state = ScanState::Inside;
                true
            }
            ScanState::Inside if !self.block => {
                if symbol.is_end() {
                    self.terminated = true;
                    *state = ScanState::After;
                } else {
                    *cursor = cursor.offset(1);
                }
                true
            }
            ScanState::Inside => {
                if symbol.is_eof() {
                    *state = ScanState::After;
                } else if symbol.is('*') && next.is('/') {
                    *cursor = cursor.offset(2);
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.terminated = true;
                        *state = ScanState::After;
                    }
                } else if symbol.is('/') && next.is('*') {
                    *cursor = cursor.offset(2);
                    self.depth += 1;
                } else {
                    *cursor = code.next(*cursor);
                }
                true
            }
            ScanState::After => true,
        }
    }
}

/// Directive names, labels and identifiers: a run of identifier symbols,
/// with `#` in front of a directive and `:` after a label.
#[derive(Debug, Clone, Default)]
pub struct WordScanner {
    pub word: String,
}

impl WordScanner {
    fn scan_word(&mut self, symbol: Symbol, cursor: &mut Position) -> bool {
        let accepted = if self.word.is_empty() {
            symbol.is_identifier_start()
        } else {
            symbol.is_identifier()
        };
        if accepted {
            self.word.push(symbol.char());
            *cursor = cursor.offset(1);
        }
        accepted
    }

    fn scan_directive(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        let symbol = code.symbol(*cursor);
        match state {
            ScanState::Before => {
                if !symbol.is('#') {
                    return false;
                }
                *cursor = cursor.offset(1);
                *state = ScanState::Inside;
                true
            }
            ScanState::Inside => {
                if !self.scan_word(symbol, cursor) {
                    if self.word.is_empty() {
                        return false;
                    }
                    *state = ScanState::After;
                }
                true
            }
            ScanState::After => true,
        }
    }

    fn scan_label(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        let symbol = code.symbol(*cursor);
        match state {
            ScanState::Before => {
                if !self.scan_word(symbol, cursor) {
                    return false;
                }
                *state = ScanState::Inside;
                true
            }
            ScanState::Inside => {
                if self.scan_word(symbol, cursor) {
                    return true;
                }
                if symbol.is(':') {
                    *cursor = cursor.offset(1);
                    *state = ScanState::After;
                    return true;
                }
                false
            }
            ScanState::After => true,
        }
    }

    fn scan_identifier(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        let symbol = code.symbol(*cursor);
        match state {
            ScanState::Before => {
                if !self.scan_word(symbol, cursor) {
                    return false;
                }
                *state = ScanState::Inside;
                true
            }
            ScanState::Inside => {
                if !self.scan_word(symbol, cursor) {
                    *state = ScanState::After;
                }
                true
            }
            ScanState::After => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumberScanner {
    pub text: String,
    pub value: Constant,
    pub malformed: bool,
}

impl Default for NumberScanner {
    fn default() -> Self {
        Self {
            text: String::new(),
            value: Constant::Int(0),
            malformed: false,
        }
    }
}

impl NumberScanner {
    fn scan(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        let symbol = code.symbol(*cursor);
        match state {
            ScanState::Before => {
                let next = code.symbol(cursor.offset(1));
                if !(symbol.is_digit() || (symbol.is('.') && next.is_digit())) {
                    return false;
                }
                self.text.push(symbol.char());
                *cursor = cursor.offset(1);
                *state = ScanState::Inside;
                true
            }
            ScanState::Inside => {
                if symbol.is_identifier() || symbol.is('.') {
                    self.text.push(symbol.char());
                    *cursor = cursor.offset(1);
                } else {
                    (self.value, self.malformed) = match parse_number(&self.text) {
                        Some(value) => (value, false),
                        None => (Constant::Int(0), true),
                    };
                    *state = ScanState::After;
                }
                true
            }
            ScanState::After => true,
        }
    }
}

/// Parses decimal, `0x` hex and `0b` binary integers and decimal floats
/// with an optional trailing `f`.
pub fn parse_number(text: &str) -> Option<Constant> {
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok().map(|v| Constant::Int(v as i64));
    }
    if let Some(binary) = lower.strip_prefix("0b") {
        return u64::from_str_radix(binary, 2).ok().map(|v| Constant::Int(v as i64));
    }
    if lower.contains('.') {
        let digits = lower.strip_suffix('f').unwrap_or(&lower);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return None;
        }
        return digits.parse::<f32>().ok().map(Constant::Float);
    }
    lower.parse::<i64>().ok().map(Constant::Int)
}

/// String and character literals.
#[derive(Debug, Clone)]
pub struct QuotedScanner {
    pub text: String,
    pub terminated: bool,
    quote: char,
}

impl QuotedScanner {
    fn new(quote: char) -> Self {
        Self {
            text: String::new(),
            terminated: false,
            quote,
        }
    }

    fn scan(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        let symbol = code.symbol(*cursor);
        match state {
            ScanState::Before => {
                if !symbol.is(self.quote) {
                    return false;
                }
                *cursor = cursor.offset(1);
                *state = ScanState::Inside;
                true
            }
            ScanState::Inside => {
                if symbol.is_end() {
                    *state = ScanState::After;
                } else if symbol.is(self.quote) {
                    self.terminated = true;
                    *cursor = cursor.offset(1);
                    *state = ScanState::After;
                } else if symbol.is('\\') {
                    let escaped = code.symbol(cursor.offset(1));
                    if escaped.is_end() {
                        *cursor = cursor.offset(1);
                        return true;
                    }
                    self.text.push(match escaped.char() {
                        'n' => '\n',
                        't' => '\t',
                        '0' => '\0',
                        other => other,
                    });
                    *cursor = cursor.offset(2);
                } else {
                    self.text.push(symbol.char());
                    *cursor = cursor.offset(1);
                }
                true
            }
            ScanState::After => true,
        }
    }
}

/// Longest registered operator, backtracking to the last complete one.
#[derive(Debug, Clone)]
pub struct OperatorScanner {
    trie: Rc<OperatorTrie<OperatorIdx>>,
    node: usize,
    last: Option<(OperatorIdx, Position)>,
}

impl OperatorScanner {
    fn new(trie: Rc<OperatorTrie<OperatorIdx>>) -> Self {
        Self {
            trie,
            node: OperatorTrie::<OperatorIdx>::ROOT,
            last: None,
        }
    }

    pub fn operator(&self) -> Option<OperatorIdx> {
        self.last.map(|(operator, _)| operator)
    }

    fn scan(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        let symbol = code.symbol(*cursor);
        match state {
            ScanState::Before | ScanState::Inside => {
                let child = if symbol.is_end() {
                    None
                } else {
                    self.trie.child(self.node, symbol.grapheme())
                };
                match child {
                    Some(child) => {
                        self.node = child;
                        *cursor = cursor.offset(1);
                        if let Some(operator) = self.trie.value(child) {
                            self.last = Some((operator, *cursor));
                        }
                        *state = ScanState::Inside;
                        true
                    }
                    None => match self.last {
                        Some((_, end)) if *state == ScanState::Inside => {
                            *cursor = end;
                            *state = ScanState::After;
                            true
                        }
                        _ => false,
                    },
                }
            }
            ScanState::After => true,
        }
    }
}

/// `[ ] { }` and casts. A cast is scanned whole as `<NAME>` and only when
/// `NAME` is one of the known type names.
#[derive(Debug, Clone)]
pub struct DelimiterScanner {
    cast_types: Rc<HashSet<String>>,
    pub kind: Option<(DelimiterKind, DelimiterSide)>,
    pub type_name: Option<String>,
}

impl DelimiterScanner {
    fn new(cast_types: Rc<HashSet<String>>) -> Self {
        Self {
            cast_types,
            kind: None,
            type_name: None,
        }
    }

    fn scan(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        if *state != ScanState::Before {
            return true;
        }
        let symbol = code.symbol(*cursor);
        let kind = match symbol.char() {
            '[' => (DelimiterKind::Subscript, DelimiterSide::Open),
            ']' => (DelimiterKind::Subscript, DelimiterSide::Close),
            '{' => (DelimiterKind::Scope, DelimiterSide::Open),
            '}' => (DelimiterKind::Scope, DelimiterSide::Close),
            '<' => {
                let mut end = cursor.offset(1);
                let mut name = String::new();
                while code.symbol(end).is_identifier() {
                    name.push(code.symbol(end).char());
                    end = end.offset(1);
                }
                if !code.symbol(end).is('>') || !self.cast_types.contains(&name) {
                    return false;
                }
                self.type_name = Some(name);
                *cursor = end;
                (DelimiterKind::Cast, DelimiterSide::Open)
            }
            _ => return false,
        };
        self.kind = Some(kind);
        *cursor = cursor.offset(1);
        *state = ScanState::After;
        true
    }
}

/// `,` between arguments and `;` between statements.
#[derive(Debug, Clone, Default)]
pub struct SeparatorScanner {
    pub statement: bool,
}

impl SeparatorScanner {
    fn scan(&mut self, state: &mut ScanState, code: &CodeBuffer, cursor: &mut Position) -> bool {
        if *state != ScanState::Before {
            return true;
        }
        let symbol = code.symbol(*cursor);
        if symbol.is(',') {
            self.statement = false;
        } else if symbol.is(';') {
            self.statement = true;
        } else {
            return false;
        }
        *cursor = cursor.offset(1);
        *state = ScanState::After;
        true
    }
}
