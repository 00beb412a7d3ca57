use std::fmt;

// symbolic identity for punctuation that can take part in operators or
// delimiters, independent of the raw character value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Grapheme {
    None,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Equals,
    Less,
    Greater,
    Exclamation,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    Question,
    Colon,
    Semicolon,
    Comma,
    Dot,
    Hash,
    At,
    Dollar,
    Backslash,
    Quote,
    Apostrophe,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
}

impl Grapheme {
    pub fn from_char(c: char) -> Grapheme {
        match c {
            '+' => Grapheme::Plus,
            '-' => Grapheme::Minus,
            '*' => Grapheme::Asterisk,
            '/' => Grapheme::Slash,
            '%' => Grapheme::Percent,
            '=' => Grapheme::Equals,
            '<' => Grapheme::Less,
            '>' => Grapheme::Greater,
            '!' => Grapheme::Exclamation,
            '&' => Grapheme::Ampersand,
            '|' => Grapheme::Pipe,
            '^' => Grapheme::Caret,
            '~' => Grapheme::Tilde,
            '?' => Grapheme::Question,
            ':' => Grapheme::Colon,
            ';' => Grapheme::Semicolon,
            ',' => Grapheme::Comma,
            '.' => Grapheme::Dot,
            '#' => Grapheme::Hash,
            '@' => Grapheme::At,
            '$' => Grapheme::Dollar,
            '\\' => Grapheme::Backslash,
            '"' => Grapheme::Quote,
            '\'' => Grapheme::Apostrophe,
            '(' => Grapheme::LeftParen,
            ')' => Grapheme::RightParen,
            '[' => Grapheme::LeftBracket,
            ']' => Grapheme::RightBracket,
            '{' => Grapheme::LeftBrace,
            '}' => Grapheme::RightBrace,
            _ => Grapheme::None,
        }
    }

    pub fn is_none(self) -> bool {
        self == Grapheme::None
    }
}

/// One character of the code buffer.
///
/// Two sentinel symbols exist: [`Symbol::EOL`] is returned when reading past
/// the end of a line and [`Symbol::EOF`] when reading past the last line.
/// `EOF` lies outside the `char` range, so every character of the source,
/// NUL included, stays an ordinary symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

impl Symbol {
    pub const EOL: Symbol = Symbol('\n' as u32);
    pub const EOF: Symbol = Symbol(u32::MAX);
    pub const SPACE: Symbol = Symbol(' ' as u32);

    pub fn new(c: char) -> Self {
        Symbol(c as u32)
    }

    // `EOF` reads as NUL
    pub fn char(self) -> char {
        char::from_u32(self.0).unwrap_or('\0')
    }

    pub fn grapheme(self) -> Grapheme {
        Grapheme::from_char(self.char())
    }

    pub fn is(self, c: char) -> bool {
        self.0 == c as u32
    }

    pub fn is_eol(self) -> bool {
        self == Symbol::EOL
    }

    pub fn is_eof(self) -> bool {
        self == Symbol::EOF
    }

    // true for both sentinels
    pub fn is_end(self) -> bool {
        self.is_eol() || self.is_eof()
    }

    pub fn is_space(self) -> bool {
        matches!(self.char(), ' ' | '\t' | '\x0c')
    }

    pub fn is_digit(self) -> bool {
        self.char().is_ascii_digit()
    }

    pub fn is_identifier_start(self) -> bool {
        let c = self.char();
        c.is_ascii_alphabetic() || c == '_'
    }

    pub fn is_identifier(self) -> bool {
        let c = self.char();
        c.is_ascii_alphanumeric() || c == '_'
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eof() {
            write!(f, "EOF")
        } else {
            write!(f, "{:?}", self.char())
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.char())
    }
}

impl From<char> for Symbol {
    fn from(value: char) -> Self {
        Symbol::new(value)
    }
}

pub fn symbols_from_str(text: &str) -> Vec<Symbol> {
    text.chars().map(Symbol::new).collect()
}

pub fn symbols_to_string(symbols: &[Symbol]) -> String {
    symbols.iter().map(|symbol| symbol.char()).collect()
}
