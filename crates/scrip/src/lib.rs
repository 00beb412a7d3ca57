//! A configurable script compiler. Commands, operators, types and the binary
//! layout of every construct come from a [`Session`] built out of a
//! configuration document; the compiler itself knows no script dialect.

pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod events;
pub mod macros;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod preprocessor;
pub mod scanner;
pub mod session;
pub mod source;
pub mod tokens;

#[cfg(test)]
mod testing;

pub use config::{BuildConfig, ConfigDocument, LoadError};
pub use diagnostics::{Diagnostic, ErrorKind, Severity};
pub use events::{Event, Events};
pub use pipeline::{Build, BuildContext, Stage, StageStatus};
pub use session::Session;
pub use source::{FsSourceProvider, MemorySourceProvider, SourceError, SourceProvider};
