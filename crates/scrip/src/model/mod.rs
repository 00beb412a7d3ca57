//! Configuration driven tables shared by every stage: types and their values,
//! binary translations, operators, commands and script symbols.

pub mod commands;
pub mod constant;
pub mod operators;
pub mod script;
pub mod translation;
pub mod types;

use thiserror::Error;

/// Rejected registration of a configuration entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("type `{0}` already registered")]
    DuplicateType(String),
    #[error("`{0}` is not a basic type")]
    NotABasicType(String),
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("translation `{0}` already registered")]
    DuplicateTranslation(String),
    #[error("unknown translation `{0}`")]
    UnknownTranslation(String),
    #[error("translation `{0}` has a variable width field that is not last in its block")]
    VariableFieldNotLast(String),
    #[error("translation `{0}` has more than one variable width field in a block")]
    MultipleVariableFields(String),
    #[error("translation `{0}` has a literal field without a value")]
    MissingLiteral(String),
    #[error("operator `{0}` already registered")]
    DuplicateOperator(String),
    #[error("operator symbol `{0}` contains characters that can't form an operator")]
    BadOperatorSymbol(String),
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("operator `{0}` has an operation with no operand types")]
    EmptyOperation(String),
    #[error("command `{0}` already registered with the same arguments")]
    DuplicateCommand(String),
    #[error("constant `{0}` already registered")]
    DuplicateConstant(String),
    #[error("enum `{0}` already registered")]
    DuplicateEnum(String),
    #[error("value size {1} is too large for type `{0}`")]
    BadValueSize(String, u32),
    #[error("translation `{0}` has a float field of {1} bits, floats are 32 bits wide")]
    BadFloatWidth(String, u32),
}
