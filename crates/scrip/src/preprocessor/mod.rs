//! First stage: turns the code buffer into a flat token stream.
//!
//! Directives, comments and macro references are handled in place on the
//! live buffer; everything else becomes a [`Token`]. Each [`Preprocessor::step`]
//! lexes or handles at most one lexeme.

mod conditional;
mod directives;
mod expression;
#[cfg(test)]
mod preprocessor_tests;

use std::{
    collections::HashSet,
    mem,
    rc::Rc,
};

use tracing::{debug, trace};

use crate::diagnostics::ErrorKind;
use crate::macros::normalize;
use crate::model::{
    commands::{Command, CommandArg},
    types::VarScope,
};
use crate::pipeline::{BuildContext, StageStatus};
use crate::scanner::{
    DelimiterScanner, LexResult, Lexer, NumberScanner, QuotedScanner, Scanner,
};
use crate::source::{symbols_from_str, CodeBuffer, Position, Range, Symbol};
use crate::tokens::{DelimiterKind, DelimiterSide, Token, TokenData, TokenIdx};

pub use conditional::{ConditionLevel, ConditionStack};
pub use directives::Directive;
pub use expression::evaluate;

use directives::{parse_include, parse_register_command, parse_register_var, DirectiveArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lexeme {
    Comment,
    Directive,
    Label,
    Identifier,
    Number,
    String,
    Character,
    Delimiter,
    Operator,
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessorState {
    Init,
    Lexing,
    FoundDirective,
    FoundComment,
    FoundToken,
    Finished,
}

pub struct Preprocessor {
    state: PreprocessorState,
    lexer: Lexer<Lexeme>,
    cursor: Position,
    conditions: ConditionStack,
    // open `[` and `{` waiting for their partner
    delimiters: Vec<(TokenIdx, DelimiterKind)>,
    line_has_tokens: bool,
    // code inserted by the last macro expansion, never expanded again
    protected: Option<Range>,
    // set by `#undef`, the next use of this name is left alone
    suppress_once: Option<String>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            state: PreprocessorState::Init,
            lexer: Lexer::new(),
            cursor: Position::default(),
            conditions: ConditionStack::new(),
            delimiters: Vec::new(),
            line_has_tokens: false,
            protected: None,
            suppress_once: None,
        }
    }

    pub fn state(&self) -> PreprocessorState {
        self.state
    }

    pub fn step(&mut self, ctx: &mut BuildContext) -> StageStatus {
        match self.state {
            PreprocessorState::Init => self.init(ctx),
            PreprocessorState::Lexing => self.lex(ctx),
            PreprocessorState::FoundComment => self.comment(ctx),
            PreprocessorState::FoundDirective => self.directive(ctx),
            PreprocessorState::FoundToken => self.token(ctx),
            PreprocessorState::Finished => {}
        }
        if self.state == PreprocessorState::Finished {
            StageStatus::Finished
        } else {
            StageStatus::Running
        }
    }

    fn init(&mut self, ctx: &mut BuildContext) {
        let trie = Rc::new(ctx.session.operators().trie().clone());
        let type_names: HashSet<String> = ctx
            .session
            .types()
            .iter()
            .map(|(_, ty)| ty.name().to_string())
            .collect();

        // registration order is priority order
        self.lexer = Lexer::new()
            .with(Lexeme::Comment, Scanner::comment())
            .with(Lexeme::Directive, Scanner::directive())
            .with(Lexeme::Label, Scanner::label())
            .with(Lexeme::Identifier, Scanner::identifier())
            .with(Lexeme::Number, Scanner::number())
            .with(Lexeme::String, Scanner::string())
            .with(Lexeme::Character, Scanner::character())
            .with(Lexeme::Delimiter, Scanner::delimiter(Rc::new(type_names)))
            .with(Lexeme::Operator, Scanner::operator(trie))
            .with(Lexeme::Separator, Scanner::separator());

        for (name, value) in &ctx.session.config.defines {
            let body = ctx.macros.capture(name, &symbols_from_str(value));
            ctx.macros.define(name, body);
        }

        debug!(lines = ctx.code.line_count(), "preprocessing");
        self.cursor = ctx.code.begin();
        self.state = PreprocessorState::Lexing;
    }

    fn lex(&mut self, ctx: &mut BuildContext) {
        self.cursor = ctx.code.validate(self.cursor);
        while ctx.code.symbol(self.cursor).is_space() {
            self.cursor = self.cursor.offset(1);
        }

        let symbol = ctx.code.symbol(self.cursor);
        if symbol.is_eof() {
            self.finish(ctx);
            return;
        }
        if symbol.is_eol() {
            self.end_line(ctx);
            return;
        }

        self.lexer.begin(self.cursor);
        match self.lexer.scan_all(&ctx.code) {
            LexResult::FoundToken(Lexeme::Comment) => self.state = PreprocessorState::FoundComment,
            LexResult::FoundToken(Lexeme::Directive) => self.state = PreprocessorState::FoundDirective,
            LexResult::FoundToken(_) => self.state = PreprocessorState::FoundToken,
            LexResult::FoundNothing | LexResult::StillScanning => {
                if self.conditions.is_active() {
                    ctx.report(
                        ErrorKind::UnexpectedCharacter(symbol.char()),
                        Range::new(self.cursor, self.cursor.offset(1)),
                    );
                }
                self.cursor = self.cursor.offset(1);
            }
        }
    }

    fn end_line(&mut self, ctx: &mut BuildContext) {
        if self.line_has_tokens {
            self.statement_end(ctx, Range::unitary(self.cursor));
        }
        self.cursor = ctx.code.next_line(self.cursor);
        ctx.progress(self.cursor.line, ctx.code.line_count());
    }

    // comments become a single space so that the tokens around them stay apart
    fn comment(&mut self, ctx: &mut BuildContext) {
        self.state = PreprocessorState::Lexing;
        let range = self.lexer.range();
        let Some(Scanner::Comment(comment)) = self.lexer.winner() else {
            return;
        };
        if !comment.terminated {
            ctx.report(ErrorKind::UnterminatedComment, range);
            ctx.code.erase(range);
            self.cursor = ctx.code.end();
            self.finish(ctx);
            return;
        }
        let at = ctx.code.erase(range);
        ctx.code.insert(at, &[Symbol::SPACE]);
        self.cursor = at.offset(1);
    }

    fn directive(&mut self, ctx: &mut BuildContext) {
        self.state = PreprocessorState::Lexing;
        let Some(Scanner::Directive(word)) = self.lexer.winner() else {
            return;
        };
        let name = word.word.clone();
        let start = self.lexer.start();
        if !Self::erase_multiline_comment(ctx, self.lexer.end()) {
            self.cursor = ctx.code.end();
            self.finish(ctx);
            return;
        }
        let line_end = ctx.code.line_end(start);
        let range = Range::new(start, line_end);
        let args = normalize(&ctx.code.slice(Range::new(self.lexer.end(), line_end)));
        self.cursor = line_end;

        let Some(directive) = Directive::from_name(&name) else {
            if self.conditions.is_active() {
                ctx.report(ErrorKind::InvalidDirective(name), range);
            }
            return;
        };
        if !self.conditions.is_active() && !directive.is_conditional() {
            return;
        }

        trace!(?directive, %range, "directive");
        let result = match directive {
            Directive::Define => Self::define(ctx, &args),
            Directive::Undef => self.undef(ctx, &args),
            Directive::If => {
                let condition = self.conditions.is_active() && Self::condition(ctx, &args, range);
                self.conditions.push(condition, range);
                Ok(())
            }
            Directive::Ifdef | Directive::Ifndef => {
                let wanted = directive == Directive::Ifdef;
                let macro_name = DirectiveArgs::new(&args).word();
                let defined = macro_name
                    .as_ref()
                    .is_some_and(|macro_name| ctx.macros.contains(macro_name) == wanted);
                self.conditions.push(defined, range);
                macro_name
                    .map(|_| ())
                    .ok_or(ErrorKind::ExpectedName(name.clone()))
            }
            Directive::Elif => self
                .conditions
                .elif(|| Self::condition(ctx, &args, range)),
            Directive::Else => self.conditions.else_branch(),
            Directive::Endif => self.conditions.endif().map(|_| ()),
            Directive::Include => Self::include(ctx, &args, range),
            Directive::RegisterVar => Self::register_var(ctx, &args, range),
            Directive::RegisterCommand => Self::register_command(ctx, &args),
        };
        if let Err(kind) = result {
            ctx.report(kind, range);
        }
        ctx.tokens.push(Token::new(range, TokenData::Directive(name)));
        if ctx.has_fatal() {
            self.finish(ctx);
        }
    }

    /// A block comment opened on a directive line and closed on a later one
    /// is erased, so that the directive ends with its own line and the
    /// comment's tail is never lexed. Returns false when the comment never
    /// closes.
    fn erase_multiline_comment(ctx: &mut BuildContext, from: Position) -> bool {
        let mut at = from;
        loop {
            let symbol = ctx.code.symbol(at);
            if symbol.is_end() {
                return true;
            }
            if symbol.is('"') || symbol.is('\'') {
                at = at.offset(1);
                while !ctx.code.symbol(at).is_end() && ctx.code.symbol(at) != symbol {
                    at = at.offset(if ctx.code.symbol(at).is('\\') { 2 } else { 1 });
                }
                at = at.offset(1);
                continue;
            }
            let next = ctx.code.symbol(at.offset(1));
            if !symbol.is('/') || !(next.is('/') || next.is('*')) {
                at = at.offset(1);
                continue;
            }
            if next.is('/') {
                return true;
            }

            let mut comments = Lexer::new().with((), Scanner::comment());
            comments.begin(at);
            comments.scan_all(&ctx.code);
            let range = comments.range();
            let terminated = matches!(
                comments.winner(),
                Some(Scanner::Comment(comment)) if comment.terminated
            );
            if !terminated {
                ctx.report(ErrorKind::UnterminatedComment, range);
                ctx.code.erase(range);
                return false;
            }
            if range.end().line != at.line {
                let at = ctx.code.erase(range);
                ctx.code.insert(at, &[Symbol::SPACE]);
                return true;
            }
            at = range.end();
        }
    }

    fn define(ctx: &mut BuildContext, args: &[Symbol]) -> Result<(), ErrorKind> {
        let mut args = DirectiveArgs::new(args);
        let name = args
            .word()
            .ok_or_else(|| ErrorKind::ExpectedName("define".to_string()))?;
        let body = ctx.macros.capture(&name, args.rest());
        ctx.macros.define(&name, body);
        Ok(())
    }

    fn undef(&mut self, ctx: &mut BuildContext, args: &[Symbol]) -> Result<(), ErrorKind> {
        let name = DirectiveArgs::new(args)
            .word()
            .ok_or_else(|| ErrorKind::ExpectedName("undef".to_string()))?;
        ctx.macros.undef(&name);
        self.suppress_once = Some(name);
        Ok(())
    }

    fn condition(ctx: &mut BuildContext, args: &[Symbol], range: Range) -> bool {
        match evaluate(args, &ctx.macros, &ctx.session) {
            Ok((value, errors)) => {
                for error in errors {
                    ctx.report(error, range);
                }
                value != 0
            }
            Err(error) => {
                ctx.report(error, range);
                false
            }
        }
    }

    fn include(ctx: &mut BuildContext, args: &[Symbol], range: Range) -> Result<(), ErrorKind> {
        let include = parse_include(&mut DirectiveArgs::new(args)).ok_or(ErrorKind::BadInclude)?;
        let current = ctx.code.origin(range.begin()).map(|(file, _, _)| file);
        let from = current
            .and_then(|file| ctx.files.get(file))
            .map(|file| file.path.clone());

        let path = ctx
            .provider
            .resolve(&include.name, include.system, from.as_deref())
            .ok_or_else(|| ErrorKind::IncludeFailed(include.name.clone()))?;
        let text = ctx.provider.read(&path).map_err(|error| {
            debug!(%error, "include read failed");
            ErrorKind::IncludeFailed(include.name.clone())
        })?;

        let modified = ctx.provider.modified(&path);
        let file = ctx.files.add(path.clone(), modified);
        if let Some(current) = current {
            if !ctx.files.add_include(current, file) {
                return Err(ErrorKind::RecursiveInclude(include.name));
            }
        }

        let lines = CodeBuffer::lines_from_source(file, &text);
        debug!(path = %path.display(), lines = lines.len(), "include");
        ctx.code.insert_lines(range.begin().line, lines);
        Ok(())
    }

    fn register_var(ctx: &mut BuildContext, args: &[Symbol], range: Range) -> Result<(), ErrorKind> {
        let var = parse_register_var(&mut DirectiveArgs::new(args)).ok_or(ErrorKind::BadRegisterVar)?;
        let types = ctx.session.types();
        let ty = types
            .find(&var.ty)
            .filter(|ty| types.get(*ty).is_variable())
            .ok_or_else(|| ErrorKind::UnknownType(var.ty.clone()))?;
        ctx.symbols
            .declare_at(&var.name, ty, VarScope::Global, var.index, var.size, range)?;
        Ok(())
    }

    fn register_command(ctx: &mut BuildContext, args: &[Symbol]) -> Result<(), ErrorKind> {
        let command =
            parse_register_command(&mut DirectiveArgs::new(args)).ok_or(ErrorKind::BadRegisterCommand)?;
        let params = command
            .args
            .iter()
            .map(|(ty, out)| {
                let ty = ctx
                    .session
                    .types()
                    .find(ty)
                    .ok_or_else(|| ErrorKind::UnknownType(ty.clone()))?;
                Ok(if *out {
                    CommandArg::out(ty)
                } else {
                    CommandArg::new(ty)
                })
            })
            .collect::<Result<Vec<_>, ErrorKind>>()?;
        debug!(name = %command.name, id = command.id, "register command");
        ctx.session
            .add_command(Command::new(command.name, command.id, params))?;
        Ok(())
    }

    fn token(&mut self, ctx: &mut BuildContext) {
        self.state = PreprocessorState::Lexing;
        let range = self.lexer.range();
        self.cursor = range.end();
        if !self.conditions.is_active() {
            return;
        }
        let Some(scanner) = self.lexer.winner().cloned() else {
            return;
        };

        trace!(%range, text = %range.format(&ctx.code), "token");
        match scanner {
            Scanner::Identifier(word) => self.identifier(ctx, word.word, range),
            Scanner::Label(word) => match ctx.symbols.declare_label(&word.word, range) {
                Ok(label) => {
                    self.push(ctx, range, TokenData::Label(label));
                }
                Err(error) => ctx.report(error.into(), range),
            },
            Scanner::Number(number) => self.number(ctx, number, range),
            Scanner::String(quoted) => self.quoted(ctx, quoted, range, false),
            Scanner::Character(quoted) => self.quoted(ctx, quoted, range, true),
            Scanner::Delimiter(delimiter) => self.delimiter(ctx, delimiter, range),
            Scanner::Operator(operator) => {
                if let Some(operator) = operator.operator() {
                    self.push(ctx, range, TokenData::Operator(operator));
                }
            }
            Scanner::Separator(separator) if separator.statement => self.statement_end(ctx, range),
            Scanner::Separator(_) => {
                self.push(ctx, range, TokenData::ArgList);
            }
            Scanner::Comment(_) | Scanner::Directive(_) => {}
        }
    }

    fn identifier(&mut self, ctx: &mut BuildContext, word: String, range: Range) {
        let protected = self
            .protected
            .is_some_and(|protected| protected.contains(range.begin()));
        let suppressed = self.suppress_once.as_deref() == Some(word.as_str());
        if suppressed {
            self.suppress_once = None;
        }

        if !protected && !suppressed {
            let expansion = ctx
                .macros
                .get(&word)
                .map(|found| ctx.macros.expand(&found.code, &mut HashSet::from([word.clone()])));
            if let Some(expansion) = expansion {
                trace!(name = %word, "expand macro");
                let inserted = ctx.code.replace(range, &expansion);
                self.protected = Some(inserted);
                self.cursor = inserted.begin();
                return;
            }
        }

        let data = if ctx.session.commands().contains(&word) {
            TokenData::Command(word)
        } else {
            TokenData::Identifier(word)
        };
        self.push(ctx, range, data);
    }

    fn number(&mut self, ctx: &mut BuildContext, number: NumberScanner, range: Range) {
        if number.malformed {
            ctx.report(ErrorKind::MalformedNumber(number.text), range);
        } else {
            self.push(ctx, range, TokenData::Number(number.value));
        }
    }

    // an unterminated literal on the last line can't be recovered from
    fn quoted(&mut self, ctx: &mut BuildContext, quoted: QuotedScanner, range: Range, character: bool) {
        if quoted.terminated {
            let data = if character {
                TokenData::Character(quoted.text)
            } else {
                TokenData::String(quoted.text)
            };
            self.push(ctx, range, data);
            return;
        }

        let kind = if character {
            ErrorKind::UnterminatedCharacter
        } else {
            ErrorKind::UnterminatedString
        };
        self.cursor = ctx.code.line_end(range.begin());
        if range.end().line + 1 >= ctx.code.line_count() {
            ctx.report_fatal(kind, range);
            self.finish(ctx);
        } else {
            ctx.report(kind, range);
        }
    }

    fn delimiter(&mut self, ctx: &mut BuildContext, delimiter: DelimiterScanner, range: Range) {
        let Some((kind, side)) = delimiter.kind else {
            return;
        };
        let data = TokenData::Delimiter {
            kind,
            side,
            partner: None,
        };

        if kind == DelimiterKind::Cast {
            // `<NAME>` is split into its open, name and close tokens
            let (begin, end) = (range.begin(), range.end());
            let close_begin = Position::new(end.line, end.column.saturating_sub(1));
            let open = self.push(ctx, Range::new(begin, begin.offset(1)), data);
            if let Some(name) = delimiter.type_name {
                self.push(ctx, Range::new(begin.offset(1), close_begin), TokenData::Identifier(name));
            }
            let close = self.push(
                ctx,
                Range::new(close_begin, end),
                TokenData::Delimiter {
                    kind,
                    side: DelimiterSide::Close,
                    partner: None,
                },
            );
            ctx.tokens.pair_delimiters(open, close);
            return;
        }

        match side {
            DelimiterSide::Open => {
                let open = self.push(ctx, range, data);
                self.delimiters.push((open, kind));
            }
            DelimiterSide::Close => match self.delimiters.last() {
                Some(&(open, open_kind)) if open_kind == kind => {
                    self.delimiters.pop();
                    let close = self.push(ctx, range, data);
                    ctx.tokens.pair_delimiters(open, close);
                }
                _ => ctx.report(ErrorKind::UnmatchedDelimiter(range.format(&ctx.code)), range),
            },
        }
    }

    fn push(&mut self, ctx: &mut BuildContext, range: Range, data: TokenData) -> TokenIdx {
        self.line_has_tokens = true;
        ctx.tokens.push(Token::new(range, data))
    }

    fn statement_end(&mut self, ctx: &mut BuildContext, range: Range) {
        self.line_has_tokens = false;
        ctx.tokens.push(Token::new(
            Range::unitary(range.begin()),
            TokenData::Delimiter {
                kind: DelimiterKind::Statement,
                side: DelimiterSide::Close,
                partner: None,
            },
        ));
    }

    fn finish(&mut self, ctx: &mut BuildContext) {
        if self.line_has_tokens {
            self.statement_end(ctx, Range::unitary(self.cursor));
        }
        for level in self.conditions.drain_unclosed() {
            ctx.report(ErrorKind::UnclosedConditional, level.range);
        }
        for (open, kind) in mem::take(&mut self.delimiters) {
            let range = ctx.tokens.get(open).map_or_else(Range::default, |token| token.range);
            let text = match kind {
                DelimiterKind::Subscript => "[",
                DelimiterKind::Scope => "{",
                DelimiterKind::Cast => "<",
                DelimiterKind::Statement => ";",
            };
            ctx.report(ErrorKind::UnclosedDelimiter(text.to_string()), range);
        }
        debug!(tokens = ctx.tokens.len(), "preprocessing finished");
        self.state = PreprocessorState::Finished;
    }
}
