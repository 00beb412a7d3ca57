mod code;
mod files;
mod provider;
mod symbol;

pub use code::{CodeBuffer, CodeLine, Position, Range};
pub use files::{FileIdx, SourceFile, SourceFiles};
pub use provider::{FsSourceProvider, MemorySourceProvider, SourceError, SourceProvider};
pub use symbol::{symbols_from_str, symbols_to_string, Grapheme, Symbol};
