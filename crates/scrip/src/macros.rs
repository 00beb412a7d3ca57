use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::source::{symbols_to_string, Symbol};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub code: Vec<Symbol>,
}

/// Object-like macros defined so far in a build.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    // redefinition replaces the previous body
    pub fn define(&mut self, name: &str, code: Vec<Symbol>) {
        debug!(name, code = %symbols_to_string(&code), "define macro");
        self.macros.insert(
            name.to_string(),
            Macro {
                name: name.to_string(),
                code,
            },
        );
    }

    pub fn undef(&mut self, name: &str) -> bool {
        self.macros.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Captures the body of `#define NAME <code>`: comments stripped,
    /// whitespace collapsed, and macro references expanded. `NAME` itself is
    /// never expanded inside its own body.
    pub fn capture(&self, name: &str, code: &[Symbol]) -> Vec<Symbol> {
        let normalized = normalize(code);
        let mut suppressed = HashSet::from([name.to_string()]);
        self.expand(&normalized, &mut suppressed)
    }

    /// Expands every macro reference in `code`. A name in `suppressed` is
    /// left as is; each name is suppressed while its own body is expanded,
    /// so expansion always terminates.
    pub fn expand(&self, code: &[Symbol], suppressed: &mut HashSet<String>) -> Vec<Symbol> {
        let mut out = Vec::with_capacity(code.len());
        let mut i = 0;
        while i < code.len() {
            let symbol = code[i];
            if symbol.is('"') || symbol.is('\'') {
                let end = literal_end(code, i);
                out.extend_from_slice(&code[i..end]);
                i = end;
            } else if symbol.is_digit() {
                let end = word_end(code, i);
                out.extend_from_slice(&code[i..end]);
                i = end;
            } else if symbol.is_identifier_start() {
                let end = word_end(code, i);
                let word = symbols_to_string(&code[i..end]);
                match self.macros.get(&word) {
                    Some(found) if !suppressed.contains(&word) => {
                        suppressed.insert(word.clone());
                        out.extend(self.expand(&found.code, suppressed));
                        suppressed.remove(&word);
                    }
                    _ => out.extend_from_slice(&code[i..end]),
                }
                i = end;
            } else {
                out.push(symbol);
                i += 1;
            }
        }
        out
    }
}

fn word_end(code: &[Symbol], start: usize) -> usize {
    let mut end = start + 1;
    while end < code.len() && code[end].is_identifier() {
        end += 1;
    }
    end
}

// index just past the closing quote, or the end when unterminated
fn literal_end(code: &[Symbol], start: usize) -> usize {
    let quote = code[start];
    let mut end = start + 1;
    while end < code.len() {
        if code[end].is('\\') {
            end += 2;
            continue;
        }
        end += 1;
        if code[end - 1] == quote {
            break;
        }
    }
    end.min(code.len())
}

/// Strips comments and collapses whitespace runs to single spaces, leaving
/// string and character literals untouched.
pub fn normalize(code: &[Symbol]) -> Vec<Symbol> {
    let mut out: Vec<Symbol> = Vec::with_capacity(code.len());
    let mut pending_space = false;
    let mut i = 0;
    while i < code.len() {
        let symbol = code[i];
        let next = code.get(i + 1).copied().unwrap_or(Symbol::EOL);
        if symbol.is('/') && next.is('/') {
            break;
        }
        if symbol.is('/') && next.is('*') {
            let mut depth = 1;
            i += 2;
            while i < code.len() && depth > 0 {
                let next = code.get(i + 1).copied().unwrap_or(Symbol::EOL);
                if code[i].is('/') && next.is('*') {
                    depth += 1;
                    i += 2;
                } else if code[i].is('*') && next.is('/') {
                    depth -= 1;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            pending_space = true;
            continue;
        }
        if symbol.is_space() {
            pending_space = true;
            i += 1;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(Symbol::SPACE);
        }
        pending_space = false;
        if symbol.is('"') || symbol.is('\'') {
            let end = literal_end(code, i);
            out.extend_from_slice(&code[i..end]);
            i = end;
        } else {
            out.push(symbol);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::symbols_from_str;

    fn capture(table: &MacroTable, name: &str, body: &str) -> String {
        symbols_to_string(&table.capture(name, &symbols_from_str(body)))
    }

    #[test]
    fn test_normalize() {
        let normalized = normalize(&symbols_from_str("  2 +\t 2 /* c */ // rest"));
        assert_eq!(symbols_to_string(&normalized), "2 + 2");
        let quoted = normalize(&symbols_from_str("\"a  // b\"  x"));
        assert_eq!(symbols_to_string(&quoted), "\"a  // b\" x");
    }

    #[test]
    fn test_self_reference_terminates() {
        let mut table = MacroTable::new();
        let body = table.capture("A", &symbols_from_str("A"));
        assert_eq!(symbols_to_string(&body), "A");
        table.define("A", body);

        let expanded = table.expand(&symbols_from_str("A + A"), &mut HashSet::new());
        assert_eq!(symbols_to_string(&expanded), "A + A");
    }

    #[test]
    fn test_nested_expansion() {
        let mut table = MacroTable::new();
        table.define("ONE", symbols_from_str("1"));
        let two = capture(&table, "TWO", "ONE + ONE");
        assert_eq!(two, "1 + 1");
        table.define("TWO", symbols_from_str(&two));

        // mutual references stop at the name being defined
        table.define("B", symbols_from_str("A"));
        assert_eq!(capture(&table, "A", "B"), "A");

        // identifiers inside literals and numbers are left alone
        let quoted = table.expand(&symbols_from_str("\"ONE\" 0xONE ONE"), &mut HashSet::new());
        assert_eq!(symbols_to_string(&quoted), "\"ONE\" 0xONE 1");
    }
}
