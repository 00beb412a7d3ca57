use std::fmt;

use scrip_util::{define_index, IndexVec};

use crate::model::{constant::Constant, operators::OperatorIdx, script::LabelIdx};
use crate::source::{CodeBuffer, Range};

define_index!(pub TokenIdx);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelimiterKind {
    // `<TYPE>`
    Cast,
    // `[ ]`
    Subscript,
    // `{ }`
    Scope,
    // `;` or end of a line, zero width
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelimiterSide {
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenData {
    // a processed directive, kept for listings; the parser skips it
    Directive(String),
    Command(String),
    Identifier(String),
    Label(LabelIdx),
    Number(Constant),
    Operator(OperatorIdx),
    String(String),
    Character(String),
    Delimiter {
        kind: DelimiterKind,
        side: DelimiterSide,
        partner: Option<TokenIdx>,
    },
    ArgList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub range: Range,
    pub data: TokenData,
}

impl Token {
    pub fn new(range: Range, data: TokenData) -> Self {
        Self { range, data }
    }

    pub fn is_statement_end(&self) -> bool {
        matches!(
            self.data,
            TokenData::Delimiter {
                kind: DelimiterKind::Statement,
                ..
            }
        )
    }
}

impl fmt::Display for TokenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenData::Directive(name) => write!(f, "directive #{name}"),
            TokenData::Command(name) => write!(f, "command {name}"),
            TokenData::Identifier(name) => write!(f, "identifier {name}"),
            TokenData::Label(idx) => write!(f, "label #{idx}"),
            TokenData::Number(value) => write!(f, "number {value}"),
            TokenData::Operator(idx) => write!(f, "operator #{idx}"),
            TokenData::String(text) => write!(f, "string {text:?}"),
            TokenData::Character(text) => write!(f, "character {text:?}"),
            TokenData::Delimiter { kind, side, .. } => write!(f, "delimiter {kind:?} {side:?}"),
            TokenData::ArgList => write!(f, "arglist"),
        }
    }
}

/// Append-only token stream of one unit. Only delimiters are revised after
/// being pushed, when their partner is found.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: IndexVec<TokenIdx, Token>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> TokenIdx {
        self.tokens.push(token)
    }

    pub fn get(&self, idx: TokenIdx) -> Option<&Token> {
        self.tokens.get(idx)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenIdx, &Token)> + '_ {
        self.tokens.iter_enumerated()
    }

    pub fn last_idx(&self) -> Option<TokenIdx> {
        self.tokens.last_idx()
    }

    /// Links an open and a close delimiter. The open token's range widens to
    /// cover the whole delimited span.
    pub fn pair_delimiters(&mut self, open: TokenIdx, close: TokenIdx) {
        let close_range = self.tokens[close].range;
        if let TokenData::Delimiter { partner, .. } = &mut self.tokens[close].data {
            *partner = Some(open);
        }
        let token = &mut self.tokens[open];
        token.range = token.range.join(close_range);
        if let TokenData::Delimiter { partner, .. } = &mut token.data {
            *partner = Some(close);
        }
    }

    // one token per line as `range: data text`, for `--tokens`
    pub fn listing(&self, code: &CodeBuffer) -> String {
        let mut out = String::new();
        for (_, token) in self.iter() {
            out.push_str(&format!(
                "{}: {} `{}`\n",
                token.range,
                token.data,
                token.range.format(code)
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Position;

    fn delimiter(side: DelimiterSide, column: usize) -> Token {
        Token::new(
            Range::new(Position::new(0, column), Position::new(0, column + 1)),
            TokenData::Delimiter {
                kind: DelimiterKind::Subscript,
                side,
                partner: None,
            },
        )
    }

    #[test]
    fn test_pair_delimiters() {
        let mut tokens = TokenStore::new();
        let open = tokens.push(delimiter(DelimiterSide::Open, 1));
        let close = tokens.push(delimiter(DelimiterSide::Close, 5));
        tokens.pair_delimiters(open, close);

        let open_token = tokens.get(open).unwrap();
        assert_eq!(open_token.range.end(), Position::new(0, 6));
        assert!(matches!(
            open_token.data,
            TokenData::Delimiter { partner: Some(p), .. } if p == close
        ));
        assert!(matches!(
            tokens.get(close).unwrap().data,
            TokenData::Delimiter { partner: Some(p), .. } if p == open
        ));
    }
}
