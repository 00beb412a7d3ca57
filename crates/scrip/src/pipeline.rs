//! Cooperative scheduling of the build stages.
//!
//! A [`Build`] owns everything one compilation touches. Each call to
//! [`Build::step`] performs one bounded unit of work in the current stage and
//! returns, so a host can render progress or stop the build between calls.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::compiler::Compiler;
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::events::{Event, Events};
use crate::macros::MacroTable;
use crate::model::{script::ScriptSymbols, translation::Xlation};
use crate::parser::Parser;
use crate::preprocessor::Preprocessor;
use crate::session::Session;
use crate::source::{CodeBuffer, Range, SourceError, SourceFiles, SourceProvider};
use crate::tokens::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preprocess,
    Parse,
    Compile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Running,
    Finished,
}

/// State shared by the stages of one build. The active stage borrows it
/// mutably for the duration of a step.
pub struct BuildContext {
    pub session: Session,
    pub code: CodeBuffer,
    pub files: SourceFiles,
    pub tokens: TokenStore,
    pub symbols: ScriptSymbols,
    pub macros: MacroTable,
    pub xlations: Vec<Xlation>,
    pub output: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
    pub events: Events,
    pub provider: Box<dyn SourceProvider>,
    stage: Stage,
}

impl BuildContext {
    pub fn new(session: Session, provider: Box<dyn SourceProvider>) -> Self {
        Self {
            session,
            code: CodeBuffer::new(),
            files: SourceFiles::new(),
            tokens: TokenStore::new(),
            symbols: ScriptSymbols::new(),
            macros: MacroTable::new(),
            xlations: Vec::new(),
            output: Vec::new(),
            diagnostics: Vec::new(),
            events: Events::new(),
            provider,
            stage: Stage::Preprocess,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn report(&mut self, kind: ErrorKind, range: Range) {
        self.push_diagnostic(Diagnostic::new(kind, range));
    }

    pub fn report_fatal(&mut self, kind: ErrorKind, range: Range) {
        self.push_diagnostic(Diagnostic::fatal(kind, range));
    }

    fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        debug!(stage = ?self.stage, %diagnostic, at = %diagnostic.range, "diagnostic");
        self.events.emit(Event::Diagnostic(&diagnostic));
        self.diagnostics.push(diagnostic);
    }

    pub fn progress(&mut self, current: usize, total: usize) {
        self.events.emit(Event::Progress {
            stage: self.stage,
            current,
            total,
        });
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }
}

enum BuildStage {
    Preprocessing(Preprocessor),
    Parsing(Parser),
    Compiling(Compiler),
    Finished,
}

pub struct Build {
    context: BuildContext,
    stage: BuildStage,
    started: bool,
}

impl Build {
    /// Reads `path` through the provider and prepares a build of it.
    pub fn new(session: Session, provider: Box<dyn SourceProvider>, path: &Path) -> Result<Self, SourceError> {
        let text = provider.read(path)?;
        Ok(Self::from_source(session, provider, path.to_path_buf(), &text))
    }

    pub fn from_source(
        session: Session,
        provider: Box<dyn SourceProvider>,
        path: PathBuf,
        text: &str,
    ) -> Self {
        let mut context = BuildContext::new(session, provider);
        let modified = context.provider.modified(&path);
        let file = context.files.add(path, modified);
        context.code = CodeBuffer::from_source(file, text);
        Self {
            context,
            stage: BuildStage::Preprocessing(Preprocessor::new()),
            started: false,
        }
    }

    pub fn events_mut(&mut self) -> &mut Events {
        &mut self.context.events
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn stage(&self) -> Option<Stage> {
        match self.stage {
            BuildStage::Preprocessing(_) => Some(Stage::Preprocess),
            BuildStage::Parsing(_) => Some(Stage::Parse),
            BuildStage::Compiling(_) => Some(Stage::Compile),
            BuildStage::Finished => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, BuildStage::Finished)
    }

    /// Runs one unit of work of the current stage. A stage that ends with a
    /// fatal diagnostic finishes the whole build.
    pub fn step(&mut self) -> StageStatus {
        let Some(stage) = self.stage() else {
            return StageStatus::Finished;
        };
        if !self.started {
            self.started = true;
            self.context.stage = stage;
            debug!(?stage, "stage started");
            self.context.events.emit(Event::StageStarted(stage));
        }

        let status = match &mut self.stage {
            BuildStage::Preprocessing(preprocessor) => preprocessor.step(&mut self.context),
            BuildStage::Parsing(parser) => parser.step(&mut self.context),
            BuildStage::Compiling(compiler) => compiler.step(&mut self.context),
            BuildStage::Finished => StageStatus::Finished,
        };
        if status == StageStatus::Running {
            return StageStatus::Running;
        }

        debug!(?stage, errors = self.context.error_count(), "stage finished");
        self.context.events.emit(Event::StageFinished(stage));
        self.started = false;
        self.stage = if self.context.has_fatal() {
            BuildStage::Finished
        } else {
            match stage {
                Stage::Preprocess => BuildStage::Parsing(Parser::new()),
                Stage::Parse => BuildStage::Compiling(Compiler::new()),
                Stage::Compile => BuildStage::Finished,
            }
        };
        if self.is_finished() {
            StageStatus::Finished
        } else {
            StageStatus::Running
        }
    }

    pub fn run(&mut self) {
        while self.step() == StageStatus::Running {}
    }

    pub fn output(&self) -> &[u8] {
        &self.context.output
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.context.diagnostics
    }

    pub fn succeeded(&self) -> bool {
        self.is_finished() && self.context.diagnostics.is_empty()
    }

    pub fn into_context(self) -> BuildContext {
        self.context
    }
}
