use std::fmt;

use crate::diagnostics::Diagnostic;
use crate::pipeline::Stage;

/// Everything a host can observe while a build runs.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    StageStarted(Stage),
    Progress {
        stage: Stage,
        current: usize,
        total: usize,
    },
    Diagnostic(&'a Diagnostic),
    StageFinished(Stage),
}

type ProgressHandler = Box<dyn FnMut(Stage, usize, usize)>;
type ErrorHandler = Box<dyn FnMut(&Diagnostic)>;
// `true` when the stage starts, `false` when it finishes
type StageHandler = Box<dyn FnMut(Stage, bool)>;

/// Handlers registered per event kind.
#[derive(Default)]
pub struct Events {
    progress: Vec<ProgressHandler>,
    error: Vec<ErrorHandler>,
    stage: Vec<StageHandler>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(&mut self, handler: impl FnMut(Stage, usize, usize) + 'static) {
        self.progress.push(Box::new(handler));
    }

    pub fn on_error(&mut self, handler: impl FnMut(&Diagnostic) + 'static) {
        self.error.push(Box::new(handler));
    }

    pub fn on_stage(&mut self, handler: impl FnMut(Stage, bool) + 'static) {
        self.stage.push(Box::new(handler));
    }

    pub fn emit(&mut self, event: Event) {
        match event {
            Event::StageStarted(stage) => self.stage.iter_mut().for_each(|h| h(stage, true)),
            Event::StageFinished(stage) => self.stage.iter_mut().for_each(|h| h(stage, false)),
            Event::Progress {
                stage,
                current,
                total,
            } => self
                .progress
                .iter_mut()
                .for_each(|h| h(stage, current, total)),
            Event::Diagnostic(diagnostic) => self.error.iter_mut().for_each(|h| h(diagnostic)),
        }
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events")
            .field("progress", &self.progress.len())
            .field("error", &self.error.len())
            .field("stage", &self.stage.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::diagnostics::ErrorKind;
    use crate::source::Range;

    #[test]
    fn test_dispatch_by_kind() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut events = Events::new();
        let log = seen.clone();
        events.on_progress(move |stage, current, total| {
            log.borrow_mut().push(format!("{stage:?} {current}/{total}"))
        });
        let log = seen.clone();
        events.on_error(move |diagnostic| log.borrow_mut().push(diagnostic.kind.to_string()));

        events.emit(Event::StageStarted(Stage::Parse));
        events.emit(Event::Progress {
            stage: Stage::Parse,
            current: 1,
            total: 4,
        });
        let diagnostic = Diagnostic::new(ErrorKind::DivideByZero, Range::default());
        events.emit(Event::Diagnostic(&diagnostic));

        assert_eq!(
            *seen.borrow(),
            vec![
                "Parse 1/4".to_string(),
                "division by zero in constant expression".to_string()
            ]
        );
    }
}
