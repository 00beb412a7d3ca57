use crate::model::constant::Constant;
use crate::scanner::parse_number;
use crate::source::{symbols_to_string, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Define,
    Undef,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
    Include,
    RegisterVar,
    RegisterCommand,
}

impl Directive {
    pub fn from_name(name: &str) -> Option<Directive> {
        Some(match name {
            "define" => Directive::Define,
            "undef" => Directive::Undef,
            "if" => Directive::If,
            "ifdef" => Directive::Ifdef,
            "ifndef" => Directive::Ifndef,
            "elif" => Directive::Elif,
            "else" => Directive::Else,
            "endif" => Directive::Endif,
            "include" => Directive::Include,
            "register_var" => Directive::RegisterVar,
            "register_command" => Directive::RegisterCommand,
            _ => return None,
        })
    }

    // directives that still run inside a disabled conditional block
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            Directive::If
                | Directive::Ifdef
                | Directive::Ifndef
                | Directive::Elif
                | Directive::Else
                | Directive::Endif
        )
    }
}

/// Cursor over the symbols that follow a directive name on its line.
#[derive(Debug, Clone)]
pub struct DirectiveArgs<'a> {
    symbols: &'a [Symbol],
    position: usize,
}

impl<'a> DirectiveArgs<'a> {
    pub fn new(symbols: &'a [Symbol]) -> Self {
        Self {
            symbols,
            position: 0,
        }
    }

    pub fn skip_space(&mut self) {
        while self.position < self.symbols.len() && self.symbols[self.position].is_space() {
            self.position += 1;
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.skip_space();
        self.position >= self.symbols.len()
    }

    pub fn peek(&mut self) -> Option<Symbol> {
        self.skip_space();
        self.symbols.get(self.position).copied()
    }

    pub fn expect(&mut self, c: char) -> bool {
        if self.peek().is_some_and(|symbol| symbol.is(c)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn word(&mut self) -> Option<String> {
        self.skip_space();
        let start = self.position;
        if !self.symbols.get(start)?.is_identifier_start() {
            return None;
        }
        let mut end = start + 1;
        while end < self.symbols.len() && self.symbols[end].is_identifier() {
            end += 1;
        }
        self.position = end;
        Some(symbols_to_string(&self.symbols[start..end]))
    }

    pub fn number(&mut self) -> Option<Constant> {
        self.skip_space();
        let start = self.position;
        if !self.symbols.get(start)?.is_digit() {
            return None;
        }
        let mut end = start + 1;
        while end < self.symbols.len() && (self.symbols[end].is_identifier() || self.symbols[end].is('.')) {
            end += 1;
        }
        self.position = end;
        parse_number(&symbols_to_string(&self.symbols[start..end]))
    }

    // text up to the closing `quote`, or None if it never closes
    pub fn quoted(&mut self, open: char, close: char) -> Option<String> {
        if !self.expect(open) {
            return None;
        }
        let start = self.position;
        let end = start + self.symbols[start..].iter().position(|symbol| symbol.is(close))?;
        self.position = end + 1;
        Some(symbols_to_string(&self.symbols[start..end]))
    }

    pub fn rest(&mut self) -> &'a [Symbol] {
        self.skip_space();
        let rest = &self.symbols[self.position..];
        self.position = self.symbols.len();
        rest
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeArgs {
    pub name: String,
    pub system: bool,
}

pub fn parse_include(args: &mut DirectiveArgs) -> Option<IncludeArgs> {
    let (name, system) = match args.peek()?.char() {
        '"' => (args.quoted('"', '"')?, false),
        '<' => (args.quoted('<', '>')?, true),
        _ => return None,
    };
    (!name.is_empty() && args.is_empty()).then_some(IncludeArgs { name, system })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterVarArgs {
    pub index: u32,
    pub ty: String,
    pub name: String,
    pub size: Option<u32>,
}

// INDEX TYPE NAME[SIZE]
pub fn parse_register_var(args: &mut DirectiveArgs) -> Option<RegisterVarArgs> {
    let index = match args.number()? {
        Constant::Int(index) => u32::try_from(index).ok()?,
        Constant::Float(_) => return None,
    };
    let ty = args.word()?;
    let name = args.word()?;
    let size = if args.expect('[') {
        let size = match args.number()? {
            Constant::Int(size) if size > 0 => u32::try_from(size).ok()?,
            _ => return None,
        };
        if !args.expect(']') {
            return None;
        }
        Some(size)
    } else {
        None
    };
    args.is_empty().then_some(RegisterVarArgs {
        index,
        ty,
        name,
        size,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterCommandArgs {
    pub id: u16,
    pub name: String,
    // (type name, is out)
    pub args: Vec<(String, bool)>,
}

// OPCODE NAME (type, out type, ...)
pub fn parse_register_command(args: &mut DirectiveArgs) -> Option<RegisterCommandArgs> {
    let id = match args.number()? {
        Constant::Int(id) => u16::try_from(id).ok()?,
        Constant::Float(_) => return None,
    };
    let name = args.word()?;
    let mut params = Vec::new();
    if args.expect('(') {
        if !args.expect(')') {
            loop {
                let word = args.word()?;
                let param = if word == "out" {
                    (args.word()?, true)
                } else {
                    (word, false)
                };
                params.push(param);
                if args.expect(')') {
                    break;
                }
                if !args.expect(',') {
                    return None;
                }
            }
        }
    }
    args.is_empty().then_some(RegisterCommandArgs {
        id,
        name,
        args: params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::symbols_from_str;

    #[test]
    fn test_parse_include() {
        let symbols = symbols_from_str(" \"common.sch\"");
        assert_eq!(
            parse_include(&mut DirectiveArgs::new(&symbols)),
            Some(IncludeArgs {
                name: "common.sch".to_string(),
                system: false
            })
        );
        let symbols = symbols_from_str("<lib/math.sch>");
        assert!(parse_include(&mut DirectiveArgs::new(&symbols)).is_some_and(|args| args.system));
        let symbols = symbols_from_str("\"open");
        assert_eq!(parse_include(&mut DirectiveArgs::new(&symbols)), None);
        let symbols = symbols_from_str("\"a\" extra");
        assert_eq!(parse_include(&mut DirectiveArgs::new(&symbols)), None);
    }

    #[test]
    fn test_parse_register_var() {
        let symbols = symbols_from_str(" 12 VAR_INT counters[4]");
        assert_eq!(
            parse_register_var(&mut DirectiveArgs::new(&symbols)),
            Some(RegisterVarArgs {
                index: 12,
                ty: "VAR_INT".to_string(),
                name: "counters".to_string(),
                size: Some(4),
            })
        );
        let symbols = symbols_from_str("VAR_INT x");
        assert_eq!(parse_register_var(&mut DirectiveArgs::new(&symbols)), None);
    }

    #[test]
    fn test_parse_register_command() {
        let symbols = symbols_from_str(" 0x1F GET_TIME (INT, out VAR_INT)");
        assert_eq!(
            parse_register_command(&mut DirectiveArgs::new(&symbols)),
            Some(RegisterCommandArgs {
                id: 0x1F,
                name: "GET_TIME".to_string(),
                args: vec![("INT".to_string(), false), ("VAR_INT".to_string(), true)],
            })
        );
        let symbols = symbols_from_str("3 NOP ()");
        assert!(parse_register_command(&mut DirectiveArgs::new(&symbols)).is_some_and(|c| c.args.is_empty()));
        let symbols = symbols_from_str("3 BAD (INT INT)");
        assert_eq!(parse_register_command(&mut DirectiveArgs::new(&symbols)), None);
    }
}
