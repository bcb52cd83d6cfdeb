//! FileCheck-style tests for LIR files
//!
//! Each file under `tests/filetests` is run through the lowering pipeline
//! and its output is validated against the file's CHECK directives.

use std::fs;
use std::path::{Path, PathBuf};
use tpde_ssa::lir::{TestRunner, TestSpec};

fn filetest_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetests")
}

/// Test helper that runs an LIR file through FileCheck validation
fn run_filecheck_test(lir_file: &str) {
    let _ = env_logger::builder().is_test(true).try_init();

    let path = filetest_dir().join(lir_file);
    let contents = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    let spec = TestSpec::parse(&contents)
        .unwrap_or_else(|e| panic!("Failed to parse test spec from {}: {}", lir_file, e));

    let runner = TestRunner::new(false);
    runner
        .run_test(&spec)
        .unwrap_or_else(|e| panic!("Test {} failed: {}", lir_file, e));
}

#[test]
fn test_crossing_filecheck() {
    run_filecheck_test("crossing.lir");
}

#[test]
fn test_rotate_filecheck() {
    run_filecheck_test("rotate.lir");
}

#[test]
fn test_pruned_filecheck() {
    run_filecheck_test("pruned.lir");
}

#[test]
fn test_module_filecheck() {
    run_filecheck_test("module.lir");
}

#[test]
fn test_redefinition_filecheck() {
    run_filecheck_test("redefinition.lir");
}

#[test]
fn test_critical_edge_filecheck() {
    run_filecheck_test("critical_edge.lir");
}

#[test]
fn test_kind_mismatch_filecheck() {
    run_filecheck_test("kind_mismatch.lir");
}

/// Every file in the directory must carry a RUN line and pass.
#[test]
fn test_all_filetests_pass() {
    let mut failures = Vec::new();
    let mut count = 0;

    for entry in fs::read_dir(filetest_dir()).expect("filetests directory") {
        let path = entry.expect("directory entry").path();
        if path.extension().and_then(|s| s.to_str()) != Some("lir") {
            continue;
        }
        count += 1;

        let contents = fs::read_to_string(&path).unwrap();
        let result = TestSpec::parse(&contents).and_then(|spec| TestRunner::new(false).run_test(&spec));
        if let Err(e) = result {
            failures.push(format!("{}: {}", path.display(), e));
        }
    }

    assert!(count >= 7, "expected the filetests to be discovered, found {}", count);
    assert!(failures.is_empty(), "failing filetests:\n{}", failures.join("\n"));
}
