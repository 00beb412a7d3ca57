//! Integer constant expressions of `#if` and `#elif`.

use std::collections::HashSet;

use crate::diagnostics::ErrorKind;
use crate::macros::MacroTable;
use crate::model::constant::{Constant, ConstantArithmeticError};
use crate::scanner::parse_number;
use crate::session::Session;
use crate::source::{symbols_to_string, Symbol};

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Number(i64),
    Identifier(String),
    Operator(&'static str),
    LeftParen,
    RightParen,
}

const OPERATORS: [&str; 22] = [
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "&", "|", "^", "<",
    ">", "!", "~", "(", ")",
];

fn precedence(operator: &str) -> Option<u8> {
    Some(match operator {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

/// Expands macros in a condition, leaving the operand of `defined` alone.
pub fn expand_condition(code: &[Symbol], macros: &MacroTable) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(code.len());
    let mut i = 0;
    let mut after_defined = false;
    while i < code.len() {
        let symbol = code[i];
        if symbol.is_identifier_start() {
            let mut end = i + 1;
            while end < code.len() && code[end].is_identifier() {
                end += 1;
            }
            let word = symbols_to_string(&code[i..end]);
            if word == "defined" {
                after_defined = true;
                out.extend_from_slice(&code[i..end]);
            } else if after_defined {
                after_defined = false;
                out.extend_from_slice(&code[i..end]);
            } else {
                out.extend(macros.expand(&code[i..end], &mut HashSet::new()));
            }
            i = end;
            continue;
        }
        if symbol.is_digit() {
            let mut end = i + 1;
            while end < code.len() && (code[end].is_identifier() || code[end].is('.')) {
                end += 1;
            }
            out.extend_from_slice(&code[i..end]);
            i = end;
            continue;
        }
        // `defined ( NAME )` keeps its operand through the parenthesis
        if !(symbol.is_space() || symbol.is('(')) {
            after_defined = false;
        }
        out.push(symbol);
        i += 1;
    }
    out
}

struct Evaluator<'a> {
    tokens: Vec<ExprToken>,
    position: usize,
    macros: &'a MacroTable,
    session: &'a Session,
    errors: Vec<ErrorKind>,
}

/// Evaluates a condition. Recoverable problems (a float operand, division by
/// zero) are returned alongside the value; a malformed expression is an
/// error on its own.
pub fn evaluate(
    code: &[Symbol],
    macros: &MacroTable,
    session: &Session,
) -> Result<(i64, Vec<ErrorKind>), ErrorKind> {
    let expanded = expand_condition(code, macros);
    let mut evaluator = Evaluator {
        tokens: Vec::new(),
        position: 0,
        macros,
        session,
        errors: Vec::new(),
    };
    evaluator.tokenize(&expanded)?;
    if evaluator.tokens.is_empty() {
        return Err(ErrorKind::BadExpression("empty condition".to_string()));
    }
    let value = evaluator.expression(0)?;
    if let Some(token) = evaluator.tokens.get(evaluator.position) {
        return Err(ErrorKind::BadExpression(format!("unexpected {token:?}")));
    }
    Ok((value, evaluator.errors))
}

impl Evaluator<'_> {
    fn tokenize(&mut self, code: &[Symbol]) -> Result<(), ErrorKind> {
        let text = symbols_to_string(code);
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
            } else if c.is_ascii_digit() {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = match parse_number(&literal) {
                    Some(Constant::Int(value)) => value,
                    Some(Constant::Float(value)) => {
                        self.errors.push(ErrorKind::FloatInExpression(literal));
                        value as i64
                    }
                    None => return Err(ErrorKind::MalformedNumber(literal)),
                };
                self.tokens.push(ExprToken::Number(value));
            } else if c.is_ascii_alphabetic() || c == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                self.tokens
                    .push(ExprToken::Identifier(chars[start..i].iter().collect()));
            } else {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let Some(operator) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(ErrorKind::BadExpression(format!("unexpected `{c}`")));
                };
                self.tokens.push(match *operator {
                    "(" => ExprToken::LeftParen,
                    ")" => ExprToken::RightParen,
                    op => ExprToken::Operator(op),
                });
                i += operator.len();
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Option<ExprToken> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.position)
    }

    // precedence climbing over left associative binary operators
    fn expression(&mut self, min_precedence: u8) -> Result<i64, ErrorKind> {
        let mut lhs = self.unary()?;
        while let Some(ExprToken::Operator(operator)) = self.peek() {
            let operator = *operator;
            let Some(precedence) = precedence(operator) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.position += 1;
            // once `&&` or `||` is decided its right side is parsed silently
            let decided = (operator == "&&" && lhs == 0) || (operator == "||" && lhs != 0);
            let reported = self.errors.len();
            let rhs = self.expression(precedence + 1)?;
            if decided {
                self.errors.truncate(reported);
            }
            lhs = self.binary(operator, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<i64, ErrorKind> {
        match self.next() {
            Some(ExprToken::Number(value)) => Ok(value),
            Some(ExprToken::Operator("!")) => Ok((self.unary()? == 0) as i64),
            Some(ExprToken::Operator("~")) => Ok(!self.unary()?),
            Some(ExprToken::Operator("-")) => Ok(self.unary()?.wrapping_neg()),
            Some(ExprToken::Operator("+")) => self.unary(),
            Some(ExprToken::LeftParen) => {
                let value = self.expression(0)?;
                match self.next() {
                    Some(ExprToken::RightParen) => Ok(value),
                    _ => Err(ErrorKind::BadExpression("missing `)`".to_string())),
                }
            }
            Some(ExprToken::Identifier(name)) if name == "defined" => self.defined(),
            Some(ExprToken::Identifier(name)) => Ok(match self.session.constant(&name) {
                Some(value) => value.to_int(),
                None => 0,
            }),
            Some(token) => Err(ErrorKind::BadExpression(format!("unexpected {token:?}"))),
            None => Err(ErrorKind::BadExpression("missing operand".to_string())),
        }
    }

    fn defined(&mut self) -> Result<i64, ErrorKind> {
        let parenthesized = self.peek() == Some(&ExprToken::LeftParen);
        if parenthesized {
            self.position += 1;
        }
        let Some(ExprToken::Identifier(name)) = self.next() else {
            return Err(ErrorKind::BadExpression("`defined` expects a name".to_string()));
        };
        if parenthesized && self.next() != Some(ExprToken::RightParen) {
            return Err(ErrorKind::BadExpression("missing `)`".to_string()));
        }
        Ok(self.macros.contains(&name) as i64)
    }

    fn binary(&mut self, operator: &str, lhs: i64, rhs: i64) -> i64 {
        let (a, b) = (Constant::Int(lhs), Constant::Int(rhs));
        let result = match operator {
            "+" => Constant::add(a, b),
            "-" => Constant::sub(a, b),
            "*" => Constant::mul(a, b),
            "/" => Constant::div(a, b),
            "%" => Constant::modulo(a, b),
            "<<" => Constant::lshift(a, b),
            ">>" => Constant::rshift(a, b),
            "&" => Constant::bit_and(a, b),
            "|" => Constant::bit_or(a, b),
            "^" => Constant::bit_xor(a, b),
            "&&" => Ok(Constant::from_bool(lhs != 0 && rhs != 0)),
            "||" => Ok(Constant::from_bool(lhs != 0 || rhs != 0)),
            "==" => Ok(Constant::from_bool(lhs == rhs)),
            "!=" => Ok(Constant::from_bool(lhs != rhs)),
            "<" => Ok(Constant::from_bool(lhs < rhs)),
            ">" => Ok(Constant::from_bool(lhs > rhs)),
            "<=" => Ok(Constant::from_bool(lhs <= rhs)),
            _ => Ok(Constant::from_bool(lhs >= rhs)),
        };
        match result {
            Ok(value) => value.to_int(),
            Err(ConstantArithmeticError::DivideByZero) => {
                self.errors.push(ErrorKind::DivideByZero);
                0
            }
            Err(error) => {
                self.errors.push(ErrorKind::Arithmetic(error));
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::symbols_from_str;

    fn eval(text: &str, macros: &MacroTable, session: &Session) -> Result<(i64, Vec<ErrorKind>), ErrorKind> {
        evaluate(&symbols_from_str(text), macros, session)
    }

    #[test]
    fn test_precedence() {
        let macros = MacroTable::new();
        let session = Session::default();
        assert_eq!(eval("1 + 2 * 3", &macros, &session), Ok((7, vec![])));
        assert_eq!(eval("(1 + 2) * 3", &macros, &session), Ok((9, vec![])));
        assert_eq!(eval("1 == 1", &macros, &session), Ok((1, vec![])));
        assert_eq!(eval("1 << 2 + 1", &macros, &session), Ok((8, vec![])));
        assert_eq!(eval("!0 && ~0 == -1", &macros, &session), Ok((1, vec![])));
        assert_eq!(eval("10 - 4 - 3", &macros, &session), Ok((3, vec![])));
        assert_eq!(eval("0x10 | 0b1", &macros, &session), Ok((17, vec![])));
    }

    #[test]
    fn test_defined_is_not_expanded() {
        let mut macros = MacroTable::new();
        macros.define("FOO", symbols_from_str("BAR"));
        macros.define("TWO", symbols_from_str("2"));
        let session = Session::default();
        assert_eq!(eval("defined FOO", &macros, &session), Ok((1, vec![])));
        assert_eq!(eval("defined(FOO) && !defined(BAR)", &macros, &session), Ok((1, vec![])));
        assert_eq!(eval("TWO * 2 == 4", &macros, &session), Ok((1, vec![])));
        // unknown identifiers count as zero
        assert_eq!(eval("BAR + FOO", &macros, &session), Ok((0, vec![])));
    }

    #[test]
    fn test_constants() {
        let macros = MacroTable::new();
        let mut session = Session::default();
        session.add_constant("PLAYER", Constant::Int(3)).unwrap();
        assert_eq!(eval("PLAYER == 3", &macros, &session), Ok((1, vec![])));
    }

    #[test]
    fn test_recoverable_errors() {
        let macros = MacroTable::new();
        let session = Session::default();
        assert_eq!(
            eval("2.5 + 1", &macros, &session),
            Ok((3, vec![ErrorKind::FloatInExpression("2.5".to_string())]))
        );
        assert_eq!(
            eval("1 / 0 + 1", &macros, &session),
            Ok((1, vec![ErrorKind::DivideByZero]))
        );
        assert_eq!(eval("0 && 1 / 0", &macros, &session), Ok((0, vec![])));
        assert_eq!(eval("1 || 1 % 0", &macros, &session), Ok((1, vec![])));
        assert_eq!(
            eval("1 && 1 / 0", &macros, &session),
            Ok((0, vec![ErrorKind::DivideByZero]))
        );
        assert!(matches!(
            eval("1 +", &macros, &session),
            Err(ErrorKind::BadExpression(_))
        ));
        assert!(matches!(
            eval("(1", &macros, &session),
            Err(ErrorKind::BadExpression(_))
        ));
    }
}
