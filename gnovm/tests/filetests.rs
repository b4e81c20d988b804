//! Runs every filetest under tests/files.

use gnovm::filetest::run_dir;
use std::path::Path;

#[test]
fn test_filetests() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/files");
    let failures = run_dir(&dir, Some(10_000_000)).expect("filetest directory should be readable");
    let report: Vec<String> = failures
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect();
    assert!(report.is_empty(), "{} filetest(s) failed:\n{}", report.len(), report.join("\n\n"));
}
