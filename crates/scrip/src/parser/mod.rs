//! Second stage: resolves the token stream into xlations.
//!
//! A statement is assembled one token per [`Parser::step`]. Its xlations are
//! held back until the statement ends, so an error drops that statement and
//! nothing else.

mod chain;
mod lowering;
mod overload;
#[cfg(test)]
mod parser_tests;

use std::mem;

use scrip_util::Idx;
use tracing::{debug, trace};

use crate::diagnostics::ErrorKind;
use crate::model::{
    commands::CommandIdx,
    constant::Constant,
    script::{LabelIdx, VariableIdx},
    translation::{AttributeValue, Xlation},
    types::{TypeIdx, TypeKind, ValueKind, VarScope},
};
use crate::pipeline::{BuildContext, StageStatus};
use crate::session::Session;
use crate::source::Range;
use crate::tokens::{DelimiterKind, DelimiterSide, Token, TokenData, TokenIdx};

pub use chain::{Operand, OperandKind};
pub use overload::resolve as resolve_overload;

use chain::{Chain, ChainState};
use lowering::Emitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Init,
    Parsing,
    // a command with several overloads is narrowed by each argument
    Overloading,
    Finished,
}

enum Flow {
    Consumed,
    // the token starts something else
    Done,
}

/// One operand position: a chain plus the subscripts and cast currently open
/// inside it.
struct Expr {
    root: Chain,
    subscripts: Vec<(Chain, Range)>,
    cast: Option<(TypeIdx, Range)>,
    in_cast: bool,
    range: Option<Range>,
}

impl Expr {
    fn new() -> Self {
        Self {
            root: Chain::new(),
            subscripts: Vec::new(),
            cast: None,
            in_cast: false,
            range: None,
        }
    }

    fn current(&mut self) -> &mut Chain {
        match self.subscripts.last_mut() {
            Some((chain, _)) => chain,
            None => &mut self.root,
        }
    }

    fn is_empty(&self) -> bool {
        self.root.is_empty() && self.subscripts.is_empty() && self.cast.is_none() && !self.in_cast
    }

    fn push(&mut self, emitter: &mut Emitter, token: &Token, label_ok: bool) -> Result<Flow, ErrorKind> {
        match &token.data {
            TokenData::Delimiter {
                kind: DelimiterKind::Cast,
                side: DelimiterSide::Open,
                ..
            } => {
                if !self.current().accepts_operand(emitter.session().operators()) {
                    return Ok(Flow::Done);
                }
                self.in_cast = true;
            }
            TokenData::Delimiter {
                kind: DelimiterKind::Cast,
                side: DelimiterSide::Close,
                ..
            } => self.in_cast = false,
            TokenData::Identifier(name) if self.in_cast => {
                let ty = emitter
                    .session()
                    .types()
                    .find(name)
                    .ok_or_else(|| ErrorKind::UnknownType(name.clone()))?;
                self.cast = Some((ty, token.range));
            }
            TokenData::Number(_) | TokenData::String(_) | TokenData::Character(_) | TokenData::Identifier(_) => {
                if !self.current().accepts_operand(emitter.session().operators()) {
                    return Ok(Flow::Done);
                }
                let cast = self.cast.take().map(|(ty, _)| ty);
                let label_ok = label_ok && self.subscripts.is_empty();
                let operand = resolve_operand(emitter, token, cast, label_ok)?;
                self.current().push_operand(operand);
            }
            TokenData::Operator(op) => self.current().push_operator(*op, emitter.session().operators()),
            TokenData::Delimiter {
                kind: DelimiterKind::Subscript,
                side: DelimiterSide::Open,
                ..
            } => {
                let chain = self.current();
                let array = match chain.last_operand() {
                    Some(Operand {
                        kind: OperandKind::Variable { var, index: None },
                        ..
                    }) if chain.state() == ChainState::Variable && !chain.has_held() => {
                        emitter.ctx().symbols.variable(*var).is_array()
                    }
                    _ => false,
                };
                if !array {
                    let name = match chain.last_operand() {
                        Some(operand) => emitter.text(operand.range),
                        None => emitter.text(token.range),
                    };
                    return Err(ErrorKind::NotAnArray(name));
                }
                self.subscripts.push((Chain::new(), token.range));
            }
            TokenData::Delimiter {
                kind: DelimiterKind::Subscript,
                side: DelimiterSide::Close,
                ..
            } => {
                let Some((mut chain, open)) = self.subscripts.pop() else {
                    return Ok(Flow::Done);
                };
                chain.finish(emitter.session().operators())?;
                let index = emitter.expression(chain, open.join(token.range))?;
                let text = emitter.text(open);
                if !self.current().set_index(index) {
                    return Err(ErrorKind::NotAnArray(text));
                }
            }
            _ => return Ok(Flow::Done),
        }
        self.range = Some(self.range.map_or(token.range, |range| range.join(token.range)));
        Ok(Flow::Consumed)
    }

    fn check_closed(&self, emitter: &Emitter) -> Result<(), ErrorKind> {
        if !self.subscripts.is_empty() {
            return Err(ErrorKind::UnclosedDelimiter("[".to_string()));
        }
        if let Some((_, range)) = self.cast {
            return Err(ErrorKind::UnexpectedToken(emitter.text(range)));
        }
        if self.in_cast {
            return Err(ErrorKind::UnclosedDelimiter("<".to_string()));
        }
        Ok(())
    }

    // lowers the expression as a command argument
    fn finish_operand(mut self, emitter: &mut Emitter, fallback: Range) -> Result<Operand, ErrorKind> {
        self.check_closed(emitter)?;
        self.root.finish(emitter.session().operators())?;
        emitter.expression(self.root, self.range.unwrap_or(fallback))
    }

    fn finish_statement(mut self, emitter: &mut Emitter, fallback: Range) -> Result<(), ErrorKind> {
        self.check_closed(emitter)?;
        self.root.finish(emitter.session().operators())?;
        emitter.statement(self.root, self.range.unwrap_or(fallback))
    }
}

fn resolve_operand(
    emitter: &mut Emitter,
    token: &Token,
    cast: Option<TypeIdx>,
    label_ok: bool,
) -> Result<Operand, ErrorKind> {
    let range = token.range;
    match &token.data {
        TokenData::Number(value) => match cast {
            Some(ty) => {
                let types = emitter.session().types();
                let value_idx = types
                    .find_number_value_in(ty, *value)
                    .ok_or_else(|| ErrorKind::NoValue(types.get(ty).name().to_string(), value.to_string()))?;
                Ok(Operand {
                    kind: OperandKind::Constant {
                        value: *value,
                        value_idx,
                    },
                    ty,
                    range,
                })
            }
            None => emitter.constant(*value, None, range),
        },
        TokenData::String(text) | TokenData::Character(text) => {
            let types = emitter.session().types();
            let value_idx = types
                .find_text_value(text.len())
                .ok_or_else(|| ErrorKind::NoValue("text".to_string(), text.clone()))?;
            Ok(Operand {
                kind: OperandKind::Text {
                    text: text.clone(),
                    value_idx,
                },
                ty: cast.unwrap_or(types.value(value_idx).owner()),
                range,
            })
        }
        TokenData::Identifier(name) => resolve_identifier(emitter, name, range, cast, label_ok),
        _ => Err(ErrorKind::UnexpectedToken(emitter.text(range))),
    }
}

// label, then variable, then constant; unknown names become forward label
// references where a label fits
fn resolve_identifier(
    emitter: &mut Emitter,
    name: &str,
    range: Range,
    cast: Option<TypeIdx>,
    label_ok: bool,
) -> Result<Operand, ErrorKind> {
    let label_ty = emitter.session().types().first_type_with(ValueKind::Label);
    let ctx = emitter.ctx();
    if let Some(label) = ctx.symbols.find_label(name) {
        return label_operand(label, label_ty, name, range);
    }
    if let Some(var) = ctx.symbols.lookup(name) {
        return Ok(Operand {
            kind: OperandKind::Variable { var, index: None },
            ty: cast.unwrap_or(ctx.symbols.variable(var).ty),
            range,
        });
    }
    if let Some(value) = ctx.session.constant(name) {
        return emitter.constant(value, cast, range);
    }
    if label_ok {
        let label = emitter.ctx().symbols.reference_label(name, range);
        trace!(%name, "forward label reference");
        return label_operand(label, label_ty, name, range);
    }
    Err(ErrorKind::UnresolvedIdentifier(name.to_string()))
}

fn label_operand(label: LabelIdx, ty: Option<TypeIdx>, name: &str, range: Range) -> Result<Operand, ErrorKind> {
    let ty = ty.ok_or_else(|| ErrorKind::NoValue("label".to_string(), name.to_string()))?;
    Ok(Operand {
        kind: OperandKind::Label(label),
        ty,
        range,
    })
}

struct CommandStatement {
    name: String,
    range: Range,
    candidates: Vec<CommandIdx>,
    args: Vec<Operand>,
    arg: Option<Expr>,
}

// whether some candidate takes a label at `index`
fn label_allowed(session: &Session, candidates: &[CommandIdx], index: usize) -> bool {
    let types = session.types();
    let Some(label) = types.first_type_with(ValueKind::Label) else {
        return false;
    };
    candidates.iter().any(|candidate| {
        session
            .commands()
            .get(*candidate)
            .args
            .get(index)
            .is_some_and(|param| types.match_level(param.ty, label).is_match())
    })
}

fn overload_error(session: &Session, name: &str, found: usize) -> ErrorKind {
    let commands = session.commands();
    match commands.overloads(name) {
        [single] => {
            let expected = commands.get(*single).args.len();
            if expected != found {
                ErrorKind::ArgumentCount(name.to_string(), expected, found)
            } else {
                ErrorKind::NoMatchingOverload(name.to_string())
            }
        }
        _ => ErrorKind::UnresolvedIdentifier(name.to_string()),
    }
}

impl CommandStatement {
    fn token(&mut self, emitter: &mut Emitter, token: &Token) -> Result<(), ErrorKind> {
        if token.data == TokenData::ArgList {
            if self.arg.is_none() {
                return Err(ErrorKind::UnexpectedToken(",".to_string()));
            }
            return self.finish_arg(emitter);
        }

        let label_ok = label_allowed(emitter.session(), &self.candidates, self.args.len());
        let arg = self.arg.get_or_insert_with(Expr::new);
        if let Flow::Consumed = arg.push(emitter, token, label_ok)? {
            return Ok(());
        }
        if arg.is_empty() {
            return Err(ErrorKind::UnexpectedToken(emitter.text(token.range)));
        }

        // the token starts the next argument
        self.finish_arg(emitter)?;
        let label_ok = label_allowed(emitter.session(), &self.candidates, self.args.len());
        let mut arg = Expr::new();
        match arg.push(emitter, token, label_ok)? {
            Flow::Consumed => {
                self.arg = Some(arg);
                Ok(())
            }
            Flow::Done => Err(ErrorKind::UnexpectedToken(emitter.text(token.range))),
        }
    }

    fn finish_arg(&mut self, emitter: &mut Emitter) -> Result<(), ErrorKind> {
        let Some(arg) = self.arg.take() else {
            return Ok(());
        };
        let operand = arg.finish_operand(emitter, self.range)?;
        let session = emitter.session();
        overload::narrow(
            session.types(),
            session.commands(),
            &mut self.candidates,
            self.args.len(),
            operand.ty,
        );
        if self.candidates.is_empty() {
            return Err(overload_error(session, &self.name, self.args.len() + 1));
        }
        self.args.push(operand);
        Ok(())
    }

    fn finish(mut self, emitter: &mut Emitter) -> Result<(), ErrorKind> {
        self.finish_arg(emitter)?;
        let session = emitter.session();
        let types: Vec<TypeIdx> = self.args.iter().map(|arg| arg.ty).collect();
        let resolved = overload::resolve(session.types(), session.commands(), &self.candidates, &types)
            .ok_or_else(|| overload_error(session, &self.name, self.args.len()))?;
        let command = session.commands().get(resolved).clone();
        emitter.command(&command, self.args, self.range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclState {
    Name,
    // after `[`
    Open,
    Size(u32),
}

/// `VAR_INT a b[4]`, or `VAR_INT a = expr` with a single name.
struct Declaration {
    ty: TypeIdx,
    scope: VarScope,
    range: Range,
    name: Option<(String, Range)>,
    state: DeclState,
    count: usize,
}

impl Declaration {
    fn declare(&mut self, ctx: &mut BuildContext, size: Option<u32>) -> Result<Option<(VariableIdx, Range)>, ErrorKind> {
        let Some((name, range)) = self.name.take() else {
            return Ok(None);
        };
        let var = ctx.symbols.declare(&name, self.ty, self.scope, size, range)?;
        self.count += 1;
        trace!(%name, ?size, "declared");
        Ok(Some((var, range)))
    }

    fn finish(mut self, ctx: &mut BuildContext) -> Result<(), ErrorKind> {
        if self.state != DeclState::Name {
            return Err(ErrorKind::UnclosedDelimiter("[".to_string()));
        }
        self.declare(ctx, None)?;
        if self.count == 0 {
            return Err(ErrorKind::UnexpectedToken(ctx.code.format(self.range)));
        }
        Ok(())
    }
}

// variable type names not shadowed by a symbol start a declaration
fn declared_type(ctx: &BuildContext, name: &str) -> Option<(TypeIdx, VarScope)> {
    if ctx.symbols.lookup(name).is_some()
        || ctx.symbols.find_label(name).is_some()
        || ctx.session.constant(name).is_some()
    {
        return None;
    }
    let ty = ctx.session.types().find(name)?;
    match ctx.session.types().get(ty).kind() {
        TypeKind::Variable { scope, .. } => Some((ty, scope)),
        _ => None,
    }
}

enum Statement {
    Command(CommandStatement),
    Declaration(Declaration),
    Expression(Expr),
}

pub struct Parser {
    state: ParserState,
    position: usize,
    statement: Option<Statement>,
    // xlations of the statement being parsed
    pending: Vec<Xlation>,
    // after an error, drop tokens up to the next statement end
    skipping: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Init,
            position: 0,
            statement: None,
            pending: Vec::new(),
            skipping: false,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn step(&mut self, ctx: &mut BuildContext) -> StageStatus {
        match self.state {
            ParserState::Init => {
                debug!(tokens = ctx.tokens.len(), "parsing");
                self.state = ParserState::Parsing;
            }
            ParserState::Parsing | ParserState::Overloading => {
                match ctx.tokens.get(TokenIdx::from_usize(self.position)).cloned() {
                    Some(token) => {
                        self.position += 1;
                        ctx.progress(self.position, ctx.tokens.len());
                        self.token(ctx, &token);
                    }
                    None => self.finish(ctx),
                }
            }
            ParserState::Finished => {}
        }
        if self.state == ParserState::Finished {
            StageStatus::Finished
        } else {
            StageStatus::Running
        }
    }

    fn token(&mut self, ctx: &mut BuildContext, token: &Token) {
        if matches!(token.data, TokenData::Directive(_)) {
            return;
        }
        if self.skipping {
            self.skipping = !token.is_statement_end();
            return;
        }

        let result = match self.statement.take() {
            None => self.start(ctx, token),
            Some(statement) => self.resume(ctx, statement, token),
        };
        if let Err(kind) = result {
            ctx.report(kind, token.range);
            self.pending.clear();
            self.statement = None;
            self.state = ParserState::Parsing;
            self.skipping = !token.is_statement_end();
        }
    }

    fn set_overloading(&mut self, candidates: usize) {
        self.state = if candidates > 1 {
            ParserState::Overloading
        } else {
            ParserState::Parsing
        };
    }

    fn start(&mut self, ctx: &mut BuildContext, token: &Token) -> Result<(), ErrorKind> {
        if token.is_statement_end() {
            return Ok(());
        }
        match &token.data {
            TokenData::Label(label) => {
                let position = ctx.xlations.len();
                ctx.symbols.label_mut(*label).xlation = Some(position);
            }
            TokenData::Delimiter {
                kind: DelimiterKind::Scope,
                side: DelimiterSide::Open,
                ..
            } => ctx.symbols.enter_scope(),
            TokenData::Delimiter {
                kind: DelimiterKind::Scope,
                side: DelimiterSide::Close,
                ..
            } => ctx.symbols.leave_scope()?,
            TokenData::Command(name) => {
                let candidates = ctx.session.commands().overloads(name).to_vec();
                trace!(%name, candidates = candidates.len(), "command");
                self.set_overloading(candidates.len());
                self.statement = Some(Statement::Command(CommandStatement {
                    name: name.clone(),
                    range: token.range,
                    candidates,
                    args: Vec::new(),
                    arg: None,
                }));
            }
            TokenData::Identifier(name) if declared_type(ctx, name).is_some() => {
                if let Some((ty, scope)) = declared_type(ctx, name) {
                    self.statement = Some(Statement::Declaration(Declaration {
                        ty,
                        scope,
                        range: token.range,
                        name: None,
                        state: DeclState::Name,
                        count: 0,
                    }));
                }
            }
            _ => {
                let mut expr = Expr::new();
                let mut emitter = Emitter::new(ctx, &mut self.pending);
                if let Flow::Done = expr.push(&mut emitter, token, false)? {
                    return Err(ErrorKind::UnexpectedToken(emitter.text(token.range)));
                }
                self.statement = Some(Statement::Expression(expr));
            }
        }
        Ok(())
    }

    fn resume(&mut self, ctx: &mut BuildContext, statement: Statement, token: &Token) -> Result<(), ErrorKind> {
        let scope = matches!(
            token.data,
            TokenData::Delimiter {
                kind: DelimiterKind::Scope,
                ..
            }
        );
        if token.is_statement_end() || scope {
            self.end_statement(ctx, statement, token.range)?;
            return if scope { self.start(ctx, token) } else { Ok(()) };
        }

        match statement {
            Statement::Command(mut command) => {
                command.token(&mut Emitter::new(ctx, &mut self.pending), token)?;
                self.set_overloading(command.candidates.len());
                self.statement = Some(Statement::Command(command));
            }
            Statement::Declaration(declaration) => self.declaration(ctx, declaration, token)?,
            Statement::Expression(mut expr) => {
                let mut emitter = Emitter::new(ctx, &mut self.pending);
                if let Flow::Done = expr.push(&mut emitter, token, false)? {
                    return Err(ErrorKind::UnexpectedToken(emitter.text(token.range)));
                }
                self.statement = Some(Statement::Expression(expr));
            }
        }
        Ok(())
    }

    fn declaration(&mut self, ctx: &mut BuildContext, mut decl: Declaration, token: &Token) -> Result<(), ErrorKind> {
        match (&token.data, decl.state) {
            (TokenData::Identifier(name), DeclState::Name) => {
                decl.declare(ctx, None)?;
                decl.name = Some((name.clone(), token.range));
            }
            (
                TokenData::Delimiter {
                    kind: DelimiterKind::Subscript,
                    side: DelimiterSide::Open,
                    ..
                },
                DeclState::Name,
            ) if decl.name.is_some() => decl.state = DeclState::Open,
            (TokenData::Number(Constant::Int(count)), DeclState::Open) => {
                let size = u32::try_from(*count)
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or_else(|| ErrorKind::UnexpectedToken(count.to_string()))?;
                decl.state = DeclState::Size(size);
            }
            (
                TokenData::Delimiter {
                    kind: DelimiterKind::Subscript,
                    side: DelimiterSide::Close,
                    ..
                },
                DeclState::Size(size),
            ) => {
                decl.declare(ctx, Some(size))?;
                decl.state = DeclState::Name;
            }
            (TokenData::Operator(op), DeclState::Name)
                if decl.count == 0 && decl.name.is_some() && ctx.session.operators().get(*op).is_assignment() =>
            {
                if let Some((var, range)) = decl.declare(ctx, None)? {
                    let mut expr = Expr::new();
                    expr.root.push_operand(Operand {
                        kind: OperandKind::Variable { var, index: None },
                        ty: decl.ty,
                        range,
                    });
                    expr.root.push_operator(*op, ctx.session.operators());
                    expr.range = Some(range.join(token.range));
                    self.statement = Some(Statement::Expression(expr));
                }
                return Ok(());
            }
            _ => return Err(ErrorKind::UnexpectedToken(ctx.code.format(token.range))),
        }
        self.statement = Some(Statement::Declaration(decl));
        Ok(())
    }

    fn end_statement(&mut self, ctx: &mut BuildContext, statement: Statement, range: Range) -> Result<(), ErrorKind> {
        match statement {
            Statement::Command(command) => command.finish(&mut Emitter::new(ctx, &mut self.pending))?,
            Statement::Declaration(decl) => decl.finish(ctx)?,
            Statement::Expression(expr) => expr.finish_statement(&mut Emitter::new(ctx, &mut self.pending), range)?,
        }
        trace!(xlations = self.pending.len(), "statement");
        ctx.xlations.append(&mut self.pending);
        self.state = ParserState::Parsing;
        Ok(())
    }

    fn finish(&mut self, ctx: &mut BuildContext) {
        if let Some(statement) = self.statement.take() {
            let end = Range::unitary(ctx.code.end());
            if let Err(kind) = self.end_statement(ctx, statement, end) {
                self.pending.clear();
                ctx.report(kind, end);
            }
        }

        let undefined: Vec<LabelIdx> = ctx
            .symbols
            .labels()
            .filter(|(_, label)| !label.declared)
            .map(|(idx, _)| idx)
            .collect();
        for idx in &undefined {
            let label = ctx.symbols.label(*idx);
            let (name, range) = (label.name.clone(), label.range);
            ctx.report(ErrorKind::UndefinedLabel(name), range);
        }
        if !undefined.is_empty() {
            drop_references(ctx, &undefined);
        }

        debug!(
            xlations = ctx.xlations.len(),
            variables = ctx.symbols.variables().count(),
            labels = ctx.symbols.labels().count(),
            "parsing finished"
        );
        self.state = ParserState::Finished;
    }
}

fn references(xlation: &Xlation, labels: &[LabelIdx]) -> bool {
    xlation
        .attributes
        .iter()
        .any(|(_, _, value)| matches!(value, AttributeValue::Label(label) if labels.contains(label)))
        || xlation.args.iter().any(|arg| references(arg, labels))
}

// drops the statements using undefined labels and moves label positions to match
fn drop_references(ctx: &mut BuildContext, labels: &[LabelIdx]) {
    let keep: Vec<bool> = ctx.xlations.iter().map(|xlation| !references(xlation, labels)).collect();
    let mut remap = Vec::with_capacity(keep.len() + 1);
    let mut kept = 0;
    for keep in &keep {
        remap.push(kept);
        if *keep {
            kept += 1;
        }
    }
    remap.push(kept);

    let xlations = mem::take(&mut ctx.xlations);
    ctx.xlations = xlations
        .into_iter()
        .zip(&keep)
        .filter_map(|(xlation, keep)| keep.then_some(xlation))
        .collect();

    let all: Vec<LabelIdx> = ctx.symbols.labels().map(|(idx, _)| idx).collect();
    for idx in all {
        let label = ctx.symbols.label_mut(idx);
        if let Some(position) = label.xlation {
            label.xlation = Some(remap.get(position).copied().unwrap_or(kept));
        }
    }
    debug!(dropped = keep.len() - kept, "dropped statements using undefined labels");
}
