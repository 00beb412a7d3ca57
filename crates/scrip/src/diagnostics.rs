use std::fmt;

use thiserror::Error;

use crate::model::{constant::ConstantArithmeticError, script::SymbolError, ConfigError};
use crate::source::{CodeBuffer, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    // the stage stops
    Fatal,
    // reported, the stage recovers locally and continues
    Error,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ErrorKind {
    // scanning
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated character literal")]
    UnterminatedCharacter,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("malformed number `{0}`")]
    MalformedNumber(String),
    #[error("unexpected character `{0}`")]
    UnexpectedCharacter(char),

    // directives
    #[error("invalid directive `#{0}`")]
    InvalidDirective(String),
    #[error("`#{0}` expects a name")]
    ExpectedName(String),
    #[error("unexpected `#{0}` without matching `#if`")]
    UnmatchedConditional(String),
    #[error("`#else` already seen for this `#if`")]
    DuplicateElse,
    #[error("`#elif` after `#else`")]
    ElifAfterElse,
    #[error("`#if` is never closed by `#endif`")]
    UnclosedConditional,
    #[error("bad constant expression: {0}")]
    BadExpression(String),
    #[error("float `{0}` in integer constant expression")]
    FloatInExpression(String),
    #[error("division by zero in constant expression")]
    DivideByZero,
    #[error("malformed `#include`, expected \"file\" or <file>")]
    BadInclude,
    #[error("cannot include `{0}`")]
    IncludeFailed(String),
    #[error("`{0}` includes itself")]
    RecursiveInclude(String),
    #[error("malformed `#register_var`, expected INDEX TYPE NAME[SIZE]")]
    BadRegisterVar,
    #[error("malformed `#register_command`, expected OPCODE NAME (type, ...)")]
    BadRegisterCommand,

    // delimiters
    #[error("unmatched `{0}`")]
    UnmatchedDelimiter(String),
    #[error("`{0}` is never closed")]
    UnclosedDelimiter(String),

    // resolution
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("unresolved identifier `{0}`")]
    UnresolvedIdentifier(String),
    #[error("no overload of `{0}` matches the arguments")]
    NoMatchingOverload(String),
    #[error("`{0}` expects {1} arguments, found {2}")]
    ArgumentCount(String, usize, usize),
    #[error("no operation of `{0}` matches the operand types")]
    NoMatchingOperation(String),
    #[error("`{0}` is a comparison and has no value")]
    ConditionNotAValue(String),
    #[error("`{0}` can't be used as an operand here")]
    UnexpectedToken(String),
    #[error("`{0}` requires a variable")]
    ExpectedVariable(String),
    #[error("`{0}` is not an array")]
    NotAnArray(String),
    #[error("type `{0}` has no value usable for `{1}`")]
    NoValue(String, String),
    #[error("label `{0}` is never defined")]
    UndefinedLabel(String),
    #[error("default assignment operator `{0}` is not registered")]
    MissingDefaultAssign(String),
    #[error("constant arithmetic failed")]
    Arithmetic(#[from] ConstantArithmeticError),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error(transparent)]
    Config(#[from] ConfigError),

    // emission
    #[error("`{0}` has no translation")]
    MissingTranslation(String),
    #[error("translation `{0}` needs a value for {1}")]
    MissingAttribute(String, String),
    #[error("value {0} does not fit in {1} bits")]
    ValueTruncated(i64, u32),
    #[error("text `{0}` does not fit in {1} bits")]
    TextTruncated(String, u32),
    #[error("bad literal `{0}` in translation field")]
    BadLiteral(String),
    #[error("environment value `{0}` is not set")]
    MissingEnv(String),
}

impl ErrorKind {
    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::UnterminatedComment | ErrorKind::IncludeFailed(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub range: Range,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, range: Range) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            range,
        }
    }

    pub fn fatal(kind: ErrorKind, range: Range) -> Self {
        Self {
            kind,
            severity: Severity::Fatal,
            range,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    // `line:col: error: message` against the buffer the range points into
    pub fn render(&self, code: &CodeBuffer) -> String {
        let location = match code.origin(self.range.begin()) {
            Some((_, line, column)) => format!("{line}:{column}"),
            None => self.range.to_string(),
        };
        format!("{location}: {self}")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Fatal => "fatal error",
            Severity::Error => "error",
        };
        write!(f, "{severity}: {}", self.kind)
    }
}
