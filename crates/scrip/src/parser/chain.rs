//! Operand chains: `a op b op c ...` with prefix and postfix operators.
//!
//! Operators in a chain associate left to right with no precedence. An
//! operator seen right after an operand is held until the next token tells
//! whether it was a postfix (`x++ ...`) or an infix (`x + ...`).

use std::mem;

use crate::diagnostics::ErrorKind;
use crate::model::{
    constant::Constant,
    operators::{Operator, OperatorIdx, Operators},
    script::{LabelIdx, VariableIdx},
    types::{TypeIdx, ValueIdx},
};
use crate::source::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum OperandKind {
    Constant { value: Constant, value_idx: ValueIdx },
    Text { text: String, value_idx: ValueIdx },
    // `index` is the subscript of an array element
    Variable { var: VariableIdx, index: Option<Box<Operand>> },
    Label(LabelIdx),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub kind: OperandKind,
    // type used for matching; a cast overrides the natural one
    pub ty: TypeIdx,
    pub range: Range,
}

impl Operand {
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, OperandKind::Variable { .. })
    }

    pub fn constant(&self) -> Option<Constant> {
        match self.kind {
            OperandKind::Constant { value, .. } => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub operand: Operand,
    pub prefixes: Vec<OperatorIdx>,
    pub postfixes: Vec<OperatorIdx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Start,
    // after a prefix or infix operator, an operand must follow
    Operator,
    Variable,
    Value,
}

#[derive(Debug, Clone)]
pub struct Chain {
    state: ChainState,
    prefixes: Vec<OperatorIdx>,
    held: Option<OperatorIdx>,
    terms: Vec<Term>,
    // `ops[i]` joins `terms[i]` and `terms[i + 1]`
    ops: Vec<OperatorIdx>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

// operators like `++` that never take a right hand side
fn is_postfix_only(operator: &Operator) -> bool {
    operator.has_postfix()
        && operator
            .operations
            .iter()
            .chain(operator.autos.iter())
            .all(|operation| operation.rhs.is_none())
}

impl Chain {
    pub fn new() -> Self {
        Self {
            state: ChainState::Start,
            prefixes: Vec::new(),
            held: None,
            terms: Vec::new(),
            ops: Vec::new(),
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.prefixes.is_empty() && self.held.is_none()
    }

    pub fn has_held(&self) -> bool {
        self.held.is_some()
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn ops(&self) -> &[OperatorIdx] {
        &self.ops
    }

    pub fn into_parts(self) -> (Vec<Term>, Vec<OperatorIdx>) {
        (self.terms, self.ops)
    }

    /// Whether the next operand belongs to this chain. A held operator that
    /// can only be a postfix is settled as one first, ending the chain.
    pub fn accepts_operand(&mut self, operators: &Operators) -> bool {
        match self.state {
            ChainState::Start | ChainState::Operator => true,
            ChainState::Variable | ChainState::Value => match self.held {
                Some(held) if is_postfix_only(operators.get(held)) => {
                    self.held = None;
                    self.attach_postfix(held);
                    false
                }
                Some(_) => true,
                None => false,
            },
        }
    }

    // callers check `accepts_operand` first
    pub fn push_operand(&mut self, operand: Operand) {
        if let Some(held) = self.held.take() {
            self.ops.push(held);
        }
        self.state = if operand.is_variable() {
            ChainState::Variable
        } else {
            ChainState::Value
        };
        self.terms.push(Term {
            operand,
            prefixes: mem::take(&mut self.prefixes),
            postfixes: Vec::new(),
        });
    }

    pub fn push_operator(&mut self, op: OperatorIdx, operators: &Operators) {
        match self.state {
            ChainState::Start | ChainState::Operator => {
                self.prefixes.push(op);
                self.state = ChainState::Operator;
            }
            ChainState::Variable | ChainState::Value => match self.held.take() {
                None => self.held = Some(op),
                // only a variable can take a postfix
                Some(held) if self.state == ChainState::Variable && operators.get(held).has_postfix() => {
                    self.attach_postfix(held);
                    self.held = Some(op);
                }
                Some(held) => {
                    self.ops.push(held);
                    self.prefixes.push(op);
                    self.state = ChainState::Operator;
                }
            },
        }
    }

    fn attach_postfix(&mut self, op: OperatorIdx) {
        if let Some(term) = self.terms.last_mut() {
            term.postfixes.push(op);
        }
    }

    /// Attaches a subscript to the last operand, which must be a plain
    /// variable.
    pub fn set_index(&mut self, index: Operand) -> bool {
        match self.terms.last_mut().map(|term| &mut term.operand.kind) {
            Some(OperandKind::Variable { index: slot @ None, .. }) => {
                *slot = Some(Box::new(index));
                true
            }
            _ => false,
        }
    }

    pub fn last_operand(&self) -> Option<&Operand> {
        self.terms.last().map(|term| &term.operand)
    }

    /// Settles a trailing held operator. Anything still waiting for an
    /// operand is an error.
    pub fn finish(&mut self, operators: &Operators) -> Result<(), ErrorKind> {
        if let Some(held) = self.held.take() {
            let operator = operators.get(held);
            if self.state == ChainState::Variable && operator.has_postfix() {
                self.attach_postfix(held);
            } else {
                return Err(ErrorKind::UnexpectedToken(operator.symbol.clone()));
            }
        }
        match self.prefixes.first() {
            Some(op) => Err(ErrorKind::UnexpectedToken(operators.get(*op).symbol.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::session;
    use scrip_util::Idx;

    fn constant(value: i64) -> Operand {
        Operand {
            kind: OperandKind::Constant {
                value: Constant::Int(value),
                value_idx: ValueIdx::from_usize(0),
            },
            ty: TypeIdx::from_usize(0),
            range: Range::default(),
        }
    }

    fn variable() -> Operand {
        Operand {
            kind: OperandKind::Variable {
                var: VariableIdx::from_usize(0),
                index: None,
            },
            ty: TypeIdx::from_usize(0),
            range: Range::default(),
        }
    }

    #[test]
    fn test_infix_and_prefix() {
        let session = session();
        let operators = session.operators();
        let assign = operators.find("=").unwrap();
        let minus = operators.find("-").unwrap();

        // x = -1
        let mut chain = Chain::new();
        assert!(chain.accepts_operand(operators));
        chain.push_operand(variable());
        assert_eq!(chain.state(), ChainState::Variable);
        chain.push_operator(assign, operators);
        assert!(chain.has_held());
        chain.push_operator(minus, operators);
        assert_eq!(chain.state(), ChainState::Operator);
        assert!(chain.accepts_operand(operators));
        chain.push_operand(constant(1));
        chain.finish(operators).unwrap();

        assert_eq!(chain.ops(), &[assign]);
        assert_eq!(chain.terms()[1].prefixes, vec![minus]);
    }

    #[test]
    fn test_held_operator_becomes_postfix() {
        let session = session();
        let operators = session.operators();
        let inc = operators.find("++").unwrap();
        let plus = operators.find("+").unwrap();

        // x++ + 1
        let mut chain = Chain::new();
        chain.push_operand(variable());
        chain.push_operator(inc, operators);
        chain.push_operator(plus, operators);
        chain.push_operand(constant(1));
        chain.finish(operators).unwrap();
        assert_eq!(chain.terms()[0].postfixes, vec![inc]);
        assert_eq!(chain.ops(), &[plus]);

        // x++ at the end of the chain
        let mut chain = Chain::new();
        chain.push_operand(variable());
        chain.push_operator(inc, operators);
        chain.finish(operators).unwrap();
        assert_eq!(chain.terms()[0].postfixes, vec![inc]);
        assert!(chain.ops().is_empty());
    }

    #[test]
    fn test_postfix_only_operator_ends_chain() {
        let session = session();
        let operators = session.operators();
        let inc = operators.find("++").unwrap();

        let mut chain = Chain::new();
        chain.push_operand(variable());
        chain.push_operator(inc, operators);
        assert!(!chain.accepts_operand(operators));
        assert_eq!(chain.terms()[0].postfixes, vec![inc]);
    }

    #[test]
    fn test_operand_after_operand_ends_chain() {
        let session = session();
        let operators = session.operators();
        let mut chain = Chain::new();
        chain.push_operand(constant(1));
        assert!(!chain.accepts_operand(operators));
    }

    #[test]
    fn test_dangling_operator() {
        let session = session();
        let operators = session.operators();
        let plus = operators.find("+").unwrap();
        let mut chain = Chain::new();
        chain.push_operand(constant(1));
        chain.push_operator(plus, operators);
        assert_eq!(
            chain.finish(operators),
            Err(ErrorKind::UnexpectedToken("+".to_string()))
        );
    }
}
