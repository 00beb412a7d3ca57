use std::collections::HashMap;

use bitflags::bitflags;
use scrip_util::{define_index, IndexVec};
use serde::Deserialize;

use super::constant::{Constant, ConstantArithmeticError};
use super::types::{MatchLevel, TypeIdx, Types};
use super::ConfigError;
use crate::source::Grapheme;

define_index!(pub OperatorIdx);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OperatorFlags: u8 {
        const ASSIGNMENT = 1;
        const CONDITIONAL = 1 << 1;
    }
}

/// Arithmetic meaning of an operator, used when its operands are folded at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorSign {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Not,
    Neg,
    Inc,
    Dec,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl OperatorSign {
    // unary signs fold whichever side is present
    pub fn fold(
        self,
        lhs: Option<Constant>,
        rhs: Option<Constant>,
    ) -> Result<Constant, ConstantArithmeticError> {
        use std::cmp::Ordering;

        let unary = || lhs.or(rhs).unwrap_or(Constant::Int(0));
        let binary = || (lhs.unwrap_or(Constant::Int(0)), rhs.unwrap_or(Constant::Int(0)));
        match self {
            OperatorSign::Assign => Ok(rhs.or(lhs).unwrap_or(Constant::Int(0))),
            OperatorSign::Add => {
                let (a, b) = binary();
                Constant::add(a, b)
            }
            OperatorSign::Sub => {
                let (a, b) = binary();
                Constant::sub(a, b)
            }
            OperatorSign::Mul => {
                let (a, b) = binary();
                Constant::mul(a, b)
            }
            OperatorSign::Div => {
                let (a, b) = binary();
                Constant::div(a, b)
            }
            OperatorSign::Mod => {
                let (a, b) = binary();
                Constant::modulo(a, b)
            }
            OperatorSign::And => {
                let (a, b) = binary();
                Constant::bit_and(a, b)
            }
            OperatorSign::Or => {
                let (a, b) = binary();
                Constant::bit_or(a, b)
            }
            OperatorSign::Xor => {
                let (a, b) = binary();
                Constant::bit_xor(a, b)
            }
            OperatorSign::Shl => {
                let (a, b) = binary();
                Constant::lshift(a, b)
            }
            OperatorSign::Shr => {
                let (a, b) = binary();
                Constant::rshift(a, b)
            }
            OperatorSign::Not => unary().bit_not(),
            OperatorSign::Neg => Ok(unary().neg()),
            OperatorSign::Inc => Constant::add(unary(), Constant::Int(1)),
            OperatorSign::Dec => Constant::sub(unary(), Constant::Int(1)),
            OperatorSign::Eq
            | OperatorSign::Ne
            | OperatorSign::Lt
            | OperatorSign::Gt
            | OperatorSign::Le
            | OperatorSign::Ge => {
                let (a, b) = binary();
                let ordering = Constant::ord(a, b)?;
                let result = match self {
                    OperatorSign::Eq => ordering == Ordering::Equal,
                    OperatorSign::Ne => ordering != Ordering::Equal,
                    OperatorSign::Lt => ordering == Ordering::Less,
                    OperatorSign::Gt => ordering == Ordering::Greater,
                    OperatorSign::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(Constant::from_bool(result))
            }
        }
    }
}

/// One typed use of an operator. A missing side with a fixed value is filled
/// in with that value when the operation is emitted (`x++` as `x += 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub lhs: Option<TypeIdx>,
    pub rhs: Option<TypeIdx>,
    pub lhs_value: Option<Constant>,
    pub rhs_value: Option<Constant>,
    // command id emitted for the operation; folding entries have none
    pub id: Option<u16>,
}

impl Operation {
    pub fn binary(lhs: TypeIdx, rhs: TypeIdx, id: u16) -> Self {
        Self {
            lhs: Some(lhs),
            rhs: Some(rhs),
            lhs_value: None,
            rhs_value: None,
            id: Some(id),
        }
    }

    pub fn postfix(lhs: TypeIdx, id: u16) -> Self {
        Self {
            lhs: Some(lhs),
            rhs: None,
            lhs_value: None,
            rhs_value: None,
            id: Some(id),
        }
    }

    pub fn prefix(rhs: TypeIdx, id: u16) -> Self {
        Self {
            lhs: None,
            rhs: Some(rhs),
            lhs_value: None,
            rhs_value: None,
            id: Some(id),
        }
    }

    pub fn auto(lhs: Option<TypeIdx>, rhs: Option<TypeIdx>) -> Self {
        Self {
            lhs,
            rhs,
            lhs_value: None,
            rhs_value: None,
            id: None,
        }
    }

    pub fn with_rhs_value(mut self, value: Constant) -> Self {
        self.rhs_value = Some(value);
        self
    }

    pub fn with_lhs_value(mut self, value: Constant) -> Self {
        self.lhs_value = Some(value);
        self
    }

    pub fn is_unary(&self) -> bool {
        self.lhs.is_none() || self.rhs.is_none()
    }

    fn fits_shape(&self, lhs: Option<TypeIdx>, rhs: Option<TypeIdx>) -> bool {
        self.lhs.is_some() == lhs.is_some() && self.rhs.is_some() == rhs.is_some()
    }

    pub fn match_level(&self, types: &Types, lhs: Option<TypeIdx>, rhs: Option<TypeIdx>) -> MatchLevel {
        if !self.fits_shape(lhs, rhs) {
            return MatchLevel::None;
        }
        let side = |expected: Option<TypeIdx>, actual: Option<TypeIdx>| match (expected, actual) {
            (Some(expected), Some(actual)) => Some(types.match_level(expected, actual)),
            _ => None,
        };
        match (side(self.lhs, lhs), side(self.rhs, rhs)) {
            (Some(l), Some(r)) => MatchLevel::combine(l, r),
            (Some(level), None) | (None, Some(level)) => level,
            (None, None) => MatchLevel::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub symbol: String,
    pub sign: OperatorSign,
    pub flags: OperatorFlags,
    pub operations: Vec<Operation>,
    // operand type pairs that may be folded at compile time
    pub autos: Vec<Operation>,
}

impl Operator {
    pub fn new(symbol: impl Into<String>, sign: OperatorSign, flags: OperatorFlags) -> Self {
        Self {
            symbol: symbol.into(),
            sign,
            flags,
            operations: Vec::new(),
            autos: Vec::new(),
        }
    }

    pub fn is_assignment(&self) -> bool {
        self.flags.contains(OperatorFlags::ASSIGNMENT)
    }

    pub fn is_conditional(&self) -> bool {
        self.flags.contains(OperatorFlags::CONDITIONAL)
    }

    pub fn has_postfix(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.lhs.is_some() && op.rhs.is_none())
    }

    pub fn has_prefix(&self) -> bool {
        self.operations
            .iter()
            .chain(self.autos.iter())
            .any(|op| op.lhs.is_none() && op.rhs.is_some())
    }

    /// Best runtime operation for the operand types; ties keep the first.
    pub fn find_operation(
        &self,
        types: &Types,
        lhs: Option<TypeIdx>,
        rhs: Option<TypeIdx>,
    ) -> Option<(&Operation, MatchLevel)> {
        best_of(&self.operations, types, lhs, rhs)
    }

    pub fn find_auto(
        &self,
        types: &Types,
        lhs: Option<TypeIdx>,
        rhs: Option<TypeIdx>,
    ) -> Option<(&Operation, MatchLevel)> {
        best_of(&self.autos, types, lhs, rhs)
    }
}

fn best_of<'a>(
    operations: &'a [Operation],
    types: &Types,
    lhs: Option<TypeIdx>,
    rhs: Option<TypeIdx>,
) -> Option<(&'a Operation, MatchLevel)> {
    let mut best: Option<(&Operation, MatchLevel)> = None;
    for operation in operations {
        let level = operation.match_level(types, lhs, rhs);
        if !level.is_match() {
            continue;
        }
        match best {
            Some((_, best_level)) if best_level >= level => {}
            _ => best = Some((operation, level)),
        }
    }
    best
}

#[derive(Debug, Clone)]
struct TrieNode<V> {
    children: Vec<(Grapheme, usize)>,
    value: Option<V>,
}

/// Prefix tree over graphemes used to scan the longest registered operator.
#[derive(Debug, Clone)]
pub struct OperatorTrie<V> {
    nodes: Vec<TrieNode<V>>,
}

impl<V: Copy> Default for OperatorTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Copy> OperatorTrie<V> {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode {
                children: Vec::new(),
                value: None,
            }],
        }
    }

    pub fn insert(&mut self, graphemes: &[Grapheme], value: V) {
        let mut node = Self::ROOT;
        for grapheme in graphemes {
            node = match self.child(node, *grapheme) {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode {
                        children: Vec::new(),
                        value: None,
                    });
                    self.nodes[node].children.push((*grapheme, child));
                    child
                }
            };
        }
        self.nodes[node].value = Some(value);
    }

    pub fn child(&self, node: usize, grapheme: Grapheme) -> Option<usize> {
        self.nodes[node]
            .children
            .iter()
            .find(|(g, _)| *g == grapheme)
            .map(|(_, child)| *child)
    }

    pub fn value(&self, node: usize) -> Option<V> {
        self.nodes[node].value
    }

    // length and value of the longest registered prefix of `graphemes`
    pub fn longest_match(&self, graphemes: &[Grapheme]) -> Option<(usize, V)> {
        let mut node = Self::ROOT;
        let mut last = None;
        for (i, grapheme) in graphemes.iter().enumerate() {
            match self.child(node, *grapheme) {
                Some(child) => node = child,
                None => break,
            }
            if let Some(value) = self.value(node) {
                last = Some((i + 1, value));
            }
        }
        last
    }
}

#[derive(Debug, Default)]
pub struct Operators {
    operators: IndexVec<OperatorIdx, Operator>,
    names: HashMap<String, OperatorIdx>,
    trie: OperatorTrie<OperatorIdx>,
}

impl Operators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, operator: Operator) -> Result<OperatorIdx, ConfigError> {
        if self.names.contains_key(&operator.symbol) {
            return Err(ConfigError::DuplicateOperator(operator.symbol));
        }
        let graphemes: Vec<Grapheme> = operator.symbol.chars().map(Grapheme::from_char).collect();
        if graphemes.is_empty() || graphemes.iter().any(|g| g.is_none()) {
            return Err(ConfigError::BadOperatorSymbol(operator.symbol));
        }
        if operator
            .operations
            .iter()
            .chain(operator.autos.iter())
            .any(|op| op.lhs.is_none() && op.rhs.is_none())
        {
            return Err(ConfigError::EmptyOperation(operator.symbol));
        }

        let symbol = operator.symbol.clone();
        let idx = self.operators.push(operator);
        self.trie.insert(&graphemes, idx);
        self.names.insert(symbol, idx);
        Ok(idx)
    }

    pub fn find(&self, symbol: &str) -> Option<OperatorIdx> {
        self.names.get(symbol).copied()
    }

    pub fn get(&self, idx: OperatorIdx) -> &Operator {
        &self.operators[idx]
    }

    pub fn trie(&self) -> &OperatorTrie<OperatorIdx> {
        &self.trie
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperatorIdx, &Operator)> + '_ {
        self.operators.iter_enumerated()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}
