use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    time::SystemTime,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use scrip::{Build, BuildContext, ConfigDocument, Diagnostic, FsSourceProvider, Session, Stage, StageStatus};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Compiles a script against a command configuration.
#[derive(Debug, Parser)]
#[command(name = "scrip", version)]
struct Args {
    /// Script to compile
    input: PathBuf,

    /// JSON configuration describing commands, operators and types
    #[arg(short, long)]
    config: PathBuf,

    /// Output file, defaults to the input with the configured extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extra include search path
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Predefined macro
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print the token stream after preprocessing
    #[arg(long)]
    tokens: bool,

    /// Skip the build when the output is newer than the script and all of
    /// its includes
    #[arg(long)]
    if_changed: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    let mut document = ConfigDocument::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    for define in &args.define {
        let (name, value) = define.split_once('=').unwrap_or((define.as_str(), "1"));
        document.build.defines.insert(name.to_string(), value.to_string());
    }
    let session = Session::from_document(&document).context("registering configuration")?;

    let working_dir = std::env::current_dir().context("reading working directory")?;
    let provider = FsSourceProvider::new(working_dir)
        .with_include_paths(document.build.include_paths.iter().cloned().chain(args.include.iter().cloned()));
    let mut build = Build::new(session, Box::new(provider), &args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    build.events_mut().on_stage(|stage, started| {
        if started {
            info!(?stage, "stage started");
        }
    });
    build.events_mut().on_progress(|stage, current, total| {
        debug!(?stage, current, total, "progress");
    });

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension(&document.build.output_extension));
    if args.if_changed {
        // includes are only known once preprocessing has read them
        while build.stage() == Some(Stage::Preprocess) && build.step() == StageStatus::Running {}
        let sources = build.context().files.newest_modification();
        if build.diagnostics().is_empty() && is_newer(&output, sources) {
            info!(output = %output.display(), "up to date");
            return Ok(ExitCode::SUCCESS);
        }
    }
    build.run();

    let ctx = build.context();
    if args.tokens {
        print!("{}", ctx.tokens.listing(&ctx.code));
    }
    for diagnostic in build.diagnostics() {
        eprintln!("{}", render(ctx, diagnostic));
    }
    if !build.succeeded() {
        eprintln!("build failed with {} error(s)", build.diagnostics().len());
        return Ok(ExitCode::FAILURE);
    }

    let mut file = fs::File::create(&output).with_context(|| format!("creating {}", output.display()))?;
    file.write_all(build.output())
        .with_context(|| format!("writing {}", output.display()))?;
    info!(bytes = build.output().len(), output = %output.display(), "build finished");
    Ok(ExitCode::SUCCESS)
}

fn is_newer(output: &Path, sources: Option<SystemTime>) -> bool {
    let written = fs::metadata(output).and_then(|meta| meta.modified()).ok();
    matches!((written, sources), (Some(written), Some(sources)) if written > sources)
}

// `path:line:col: error: message`
fn render(ctx: &BuildContext, diagnostic: &Diagnostic) -> String {
    let path = ctx
        .code
        .origin(diagnostic.range.begin())
        .and_then(|(file, _, _)| ctx.files.get(file))
        .map(|file| file.path.display().to_string());
    match path {
        Some(path) => format!("{path}:{}", diagnostic.render(&ctx.code)),
        None => diagnostic.render(&ctx.code),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_is_newer() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("main.bin");
        assert!(!is_newer(&output, Some(SystemTime::UNIX_EPOCH)));

        fs::write(&output, b"").unwrap();
        let written = fs::metadata(&output).unwrap().modified().unwrap();
        assert!(is_newer(&output, Some(written - Duration::from_secs(60))));
        assert!(!is_newer(&output, Some(written + Duration::from_secs(60))));
        assert!(!is_newer(&output, None));
    }
}
