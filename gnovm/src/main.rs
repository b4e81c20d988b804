//! gnovm CLI

use clap::{Parser, Subcommand, ValueEnum};
use gnovm::error::report_error;
use gnovm::filetest::run_dir;
use gnovm::runtime::{Runtime, RuntimeOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gnovm", version, about = "Preprocessing interpreter for gno programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Op budget for running programs
    #[arg(long, global = true)]
    max_ops: Option<u64>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the files of a main package
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Trace every executed op
        #[arg(long)]
        debug: bool,
    },
    /// Preprocess the files of a package without running them
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run the filetests in a directory
    Test {
        dir: PathBuf,
    },
    /// Parse a file and dump its tree as JSON
    Parse {
        file: PathBuf,
    },
    /// Tokenize a file and dump its tokens
    Tokens {
        file: PathBuf,
    },
    /// Start an interactive session
    Repl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet, cli.log_format);

    let result = match cli.command {
        Command::Run { files, debug } => run_files(&files, cli.max_ops, debug),
        Command::Check { files } => check_files(&files),
        Command::Test { dir } => test_dir(&dir, cli.max_ops),
        Command::Parse { file } => parse_file(&file),
        Command::Tokens { file } => tokenize_file(&file),
        Command::Repl => gnovm::repl::Repl::new(RuntimeOptions {
            max_ops: cli.max_ops,
            ..RuntimeOptions::default()
        })
        .and_then(|mut repl| repl.run())
        .map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !e.is_empty() {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Installs the subscriber. `GNOVM_LOG` or `RUST_LOG` override the level
/// picked from the flags.
fn setup_logging(verbose: u8, quiet: bool, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = std::env::var("GNOVM_LOG")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let formatter = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => tracing_subscriber::registry().with(formatter).with(filter).init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(formatter.json())
            .with(filter)
            .init(),
    }
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<(String, String)>, String> {
    paths
        .iter()
        .map(|p| {
            std::fs::read_to_string(p)
                .map(|text| (p.display().to_string(), text))
                .map_err(|e| format!("{}: {e}", p.display()))
        })
        .collect()
}

/// Prints an error against the file it points into; returns an empty
/// message so that `main` does not print it twice.
fn report(files: &[(String, String)], e: &gnovm::CompileError) -> String {
    let source = e
        .position()
        .and_then(|(name, _)| files.iter().find(|(n, _)| n == name))
        .or(files.first());
    match source {
        Some((name, text)) => {
            report_error(name, text, e);
            String::new()
        }
        None => e.to_string(),
    }
}

fn run_files(paths: &[PathBuf], max_ops: Option<u64>, debug: bool) -> Result<(), String> {
    let files = read_files(paths)?;
    let mut rt = Runtime::new(RuntimeOptions {
        max_ops,
        debug,
        ..RuntimeOptions::default()
    })
    .map_err(|e| e.to_string())?;
    rt.run_files(&files).map_err(|e| report(&files, &e))
}

fn check_files(paths: &[PathBuf]) -> Result<(), String> {
    let files = read_files(paths)?;
    let mut rt = Runtime::new(RuntimeOptions::default()).map_err(|e| e.to_string())?;
    rt.load_files("main", &files).map_err(|e| report(&files, &e))?;
    println!("ok: {} file(s) preprocessed", files.len());
    Ok(())
}

fn test_dir(dir: &Path, max_ops: Option<u64>) -> Result<(), String> {
    let failures = run_dir(dir, max_ops).map_err(|e| e.to_string())?;
    for (name, e) in &failures {
        println!("FAIL {name}: {e}");
    }
    if failures.is_empty() {
        println!("ok");
        Ok(())
    } else {
        Err(format!("{} filetest(s) failed", failures.len()))
    }
}

fn parse_file(path: &Path) -> Result<(), String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let name = path.display().to_string();
    let mut ast = gnovm::ast::Ast::new();
    let file = gnovm::parser::parse_file(&mut ast, &name, &source).map_err(|e| {
        report_error(&name, &source, &e);
        String::new()
    })?;
    let json = gnovm::ast::dump_json(&ast, file);
    let text = serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn tokenize_file(path: &Path) -> Result<(), String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let name = path.display().to_string();
    let tokens = gnovm::lexer::tokenize(&name, &source).map_err(|e| e.to_string())?;
    for (tok, span) in &tokens {
        println!("{tok:?} @ {}:{}", span.pos.line, span.pos.column);
    }
    Ok(())
}
