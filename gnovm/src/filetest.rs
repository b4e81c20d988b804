//! Filetests
//!
//! A filetest is a single `package main` file whose trailing comment
//! blocks describe the expected result: `// Output:` lists what the
//! program prints, `// Error:` a message the failure must contain.

use crate::parser::{extract_error, extract_output};
use crate::runtime::{Runtime, RuntimeOptions};
use crate::interp::OutputSink;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FiletestError {
    #[error("unexpected error: {0}")]
    UnexpectedError(String),
    #[error("expected error containing {expected:?}, got {actual}")]
    WrongError { expected: String, actual: String },
    #[error("expected error containing {expected:?}, but the program succeeded")]
    MissingError { expected: String },
    #[error("output mismatch\n--- expected\n{expected}\n--- actual\n{actual}")]
    WrongOutput { expected: String, actual: String },
    #[error("{0}")]
    Io(String),
}

/// Runs one filetest given its name and source.
pub fn run_filetest(name: &str, source: &str, max_ops: Option<u64>) -> Result<(), FiletestError> {
    let (output, buf) = OutputSink::buffer();
    let result = Runtime::new(RuntimeOptions {
        max_ops,
        output,
        debug: false,
    })
    .and_then(|mut rt| rt.run_files(&[(name.to_string(), source.to_string())]));
    let actual = buf.borrow().clone();
    match (result, extract_error(source)) {
        (Err(e), Some(expected)) => {
            let actual = e.to_string();
            if actual.contains(expected.trim()) {
                Ok(())
            } else {
                Err(FiletestError::WrongError { expected, actual })
            }
        }
        (Err(e), None) => Err(FiletestError::UnexpectedError(e.to_string())),
        (Ok(()), Some(expected)) => Err(FiletestError::MissingError { expected }),
        (Ok(()), None) => {
            let expected = extract_output(source).unwrap_or_default();
            if actual.trim_end() == expected.trim_end() {
                Ok(())
            } else {
                Err(FiletestError::WrongOutput { expected, actual })
            }
        }
    }
}

/// Runs every `*.gno` file in `dir`, in name order, and returns the
/// failures.
pub fn run_dir(dir: &Path, max_ops: Option<u64>) -> Result<Vec<(String, FiletestError)>, FiletestError> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| FiletestError::Io(format!("{}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "gno"))
        .collect();
    paths.sort();
    let mut failures = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = std::fs::read_to_string(&path)
            .map_err(|e| FiletestError::Io(format!("{}: {e}", path.display())))?;
        if let Err(e) = run_filetest(&name, &source, max_ops) {
            failures.push((name, e));
        }
    }
    Ok(failures)
}
