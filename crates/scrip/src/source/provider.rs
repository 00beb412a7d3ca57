use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot find source file `{0}`")]
    NotFound(String),
    #[error("failed to read `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Supplies script text to the build: resolves `#include` names, reads files
/// and reports modification times.
pub trait SourceProvider {
    // `system` is true for `#include <name>`; `from` is the including file
    fn resolve(&self, name: &str, system: bool, from: Option<&Path>) -> Option<PathBuf>;
    fn read(&self, path: &Path) -> Result<String, SourceError>;
    fn modified(&self, path: &Path) -> Option<SystemTime>;
}

pub struct FsSourceProvider {
    working_dir: PathBuf,
    system_include_paths: Vec<PathBuf>,
    include_paths: Vec<PathBuf>,
}

impl FsSourceProvider {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            system_include_paths: Vec::new(),
            include_paths: Vec::new(),
        }
    }

    pub fn with_include_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.include_paths.extend(paths);
        self
    }

    pub fn with_system_include_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.system_include_paths.extend(paths);
        self
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    // quoted includes look next to the including file, then in the working
    // directory, then in the include paths
    fn resolve_normal_include_path(&self, name: &str, from: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = from.and_then(Path::parent) {
            let path = dir.join(name);
            if path.exists() {
                return Some(path);
            }
        }

        let working_dir_path = self.working_dir.join(name);
        if working_dir_path.exists() {
            return Some(working_dir_path);
        }

        self.resolve_system_include_path(name).or_else(|| {
            self.include_paths
                .iter()
                .map(|dir| dir.join(name))
                .find(|path| path.exists())
        })
    }

    // angle-bracket includes do not look in the working directory
    fn resolve_system_include_path(&self, name: &str) -> Option<PathBuf> {
        self.system_include_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.exists())
    }
}

impl SourceProvider for FsSourceProvider {
    fn resolve(&self, name: &str, system: bool, from: Option<&Path>) -> Option<PathBuf> {
        if system {
            self.resolve_system_include_path(name)
                .or_else(|| {
                    self.include_paths
                        .iter()
                        .map(|dir| dir.join(name))
                        .find(|path| path.exists())
                })
        } else {
            self.resolve_normal_include_path(name, from)
        }
    }

    fn read(&self, path: &Path) -> Result<String, SourceError> {
        fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|meta| meta.modified()).ok()
    }
}

// in-memory files, for tests and hosts that keep scripts in editor buffers
#[derive(Debug, Default, Clone)]
pub struct MemorySourceProvider {
    files: HashMap<PathBuf, (String, SystemTime)>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files
            .insert(path.into(), (text.into(), SystemTime::now()));
    }
}

impl SourceProvider for MemorySourceProvider {
    fn resolve(&self, name: &str, _system: bool, from: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = from.and_then(Path::parent) {
            let path = dir.join(name);
            if self.files.contains_key(&path) {
                return Some(path);
            }
        }
        let path = PathBuf::from(name);
        self.files.contains_key(&path).then_some(path)
    }

    fn read(&self, path: &Path) -> Result<String, SourceError> {
        self.files
            .get(path)
            .map(|(text, _)| text.clone())
            .ok_or_else(|| SourceError::NotFound(path.display().to_string()))
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.files.get(path).map(|(_, time)| *time)
    }
}
