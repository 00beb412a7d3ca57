use std::path::PathBuf;

use crate::config::ConfigDocument;
use crate::pipeline::{Build, BuildContext, Stage};
use crate::session::Session;
use crate::source::MemorySourceProvider;

pub const FIXTURE: &str = include_str!("../tests/data/config.json");

pub fn session() -> Session {
    let document = ConfigDocument::from_json(FIXTURE).unwrap();
    Session::from_document(&document).unwrap()
}

pub fn build(source: &str) -> Build {
    build_with(source, MemorySourceProvider::new())
}

pub fn build_with(source: &str, provider: MemorySourceProvider) -> Build {
    Build::from_source(session(), Box::new(provider), PathBuf::from("main.sc"), source)
}

// runs the build up to, but not into, `stage`
pub fn run_until(mut build: Build, stage: Stage) -> BuildContext {
    while build.stage().is_some_and(|current| current != stage) {
        build.step();
    }
    build.into_context()
}

pub fn preprocess(source: &str) -> BuildContext {
    run_until(build(source), Stage::Parse)
}

pub fn parse(source: &str) -> BuildContext {
    run_until(build(source), Stage::Compile)
}
