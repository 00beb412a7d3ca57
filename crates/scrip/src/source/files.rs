use std::{path::PathBuf, time::SystemTime};

use petgraph::{algo::has_path_connecting, graphmap::DiGraphMap};
use scrip_util::{define_index, IndexVec};

define_index!(pub FileIdx);

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

// every file read during a build plus the include edges between them
#[derive(Debug, Default)]
pub struct SourceFiles {
    files: IndexVec<FileIdx, SourceFile>,
    includes: DiGraphMap<FileIdx, ()>,
}

impl SourceFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf, modified: Option<SystemTime>) -> FileIdx {
        if let Some(existing) = self.find(&path) {
            return existing;
        }
        let idx = self.files.push(SourceFile { path, modified });
        self.includes.add_node(idx);
        idx
    }

    pub fn find(&self, path: &PathBuf) -> Option<FileIdx> {
        self.files
            .iter_enumerated()
            .find(|(_, file)| &file.path == path)
            .map(|(idx, _)| idx)
    }

    pub fn get(&self, idx: FileIdx) -> Option<&SourceFile> {
        self.files.get(idx)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileIdx, &SourceFile)> + '_ {
        self.files.iter_enumerated()
    }

    /// Records that `from` includes `to`. Returns false, without recording
    /// the edge, when it would close an include cycle.
    pub fn add_include(&mut self, from: FileIdx, to: FileIdx) -> bool {
        if from == to || has_path_connecting(&self.includes, to, from, None) {
            return false;
        }
        self.includes.add_edge(from, to, ());
        true
    }

    // newest modification time across all files read, for staleness checks
    pub fn newest_modification(&self) -> Option<SystemTime> {
        self.files.iter().filter_map(|file| file.modified).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_cycle_rejected() {
        let mut files = SourceFiles::new();
        let main = files.add(PathBuf::from("main.sc"), None);
        let a = files.add(PathBuf::from("a.sch"), None);
        let b = files.add(PathBuf::from("b.sch"), None);

        assert!(files.add_include(main, a));
        assert!(files.add_include(a, b));
        assert!(!files.add_include(b, main));
        assert!(!files.add_include(a, a));
        // diamond includes are fine
        assert!(files.add_include(main, b));
    }

    #[test]
    fn test_newest_modification() {
        let mut files = SourceFiles::new();
        assert_eq!(files.newest_modification(), None);
        let old = SystemTime::UNIX_EPOCH;
        let new = old + std::time::Duration::from_secs(60);
        files.add(PathBuf::from("main.sc"), Some(old));
        files.add(PathBuf::from("a.sch"), Some(new));
        files.add(PathBuf::from("b.sch"), None);
        assert_eq!(files.newest_modification(), Some(new));
    }

    #[test]
    fn test_add_deduplicates_paths() {
        let mut files = SourceFiles::new();
        let first = files.add(PathBuf::from("main.sc"), None);
        let second = files.add(PathBuf::from("main.sc"), None);
        assert_eq!(first, second);
        assert_eq!(files.len(), 1);
    }
}
