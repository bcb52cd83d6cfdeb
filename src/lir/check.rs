//! FileCheck-style test validation for LIR files.
//!
//! A test file is an LIR module with `; RUN:` lines naming the pipeline
//! flags and `; CHECK:` lines describing the expected output, similar to
//! LLVM's FileCheck tool. Pipeline errors are printed as `error: ...` so
//! negative tests can check diagnostics the same way.

use crate::driver::{self, DriverOptions};

/// A CHECK directive extracted from an LIR file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match pattern on a later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not occur before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

/// RUN lines and CHECK directives extracted from an LIR file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub lir_content: String,
}

impl TestSpec {
    /// Parse an LIR file to extract its RUN lines and directives
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut lir_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                if parts.is_empty() {
                    return Err("empty RUN directive".to_string());
                }
                run_directives.push(RunDirective {
                    command: parts[0].to_string(),
                    args: parts[1..].iter().map(|s| s.to_string()).collect(),
                });
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                // Regular LIR content
                lir_lines.push(line);
            }
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            lir_content: lir_lines.join("\n"),
        })
    }
}

/// Test runner that executes LIR tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run an LIR test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        if spec.run_directives.is_empty() {
            return Err("no RUN directive".to_string());
        }

        for run_dir in &spec.run_directives {
            let output = self.execute_command(&spec.lir_content, run_dir)?;
            if self.verbose {
                println!("{}", output);
            }
            self.validate_output(&output, &spec.check_directives)?;
        }

        Ok(())
    }

    /// Execute a test command and return the output
    fn execute_command(&self, content: &str, run_dir: &RunDirective) -> Result<String, String> {
        if run_dir.command != "%lirlower" && run_dir.command != "lirlower" {
            return Err(format!("unknown RUN command '{}'", run_dir.command));
        }

        let options = DriverOptions::from_flags(
            run_dir.args.iter().map(String::as_str).filter(|arg| *arg != "%s"),
        );
        Ok(match driver::run(content, &options) {
            Ok(output) => output,
            Err(err) => format!("error: {}", err),
        })
    }

    /// Validate output against CHECK directives
    pub fn validate_output(
        &self,
        output: &str,
        directives: &[CheckDirective],
    ) -> Result<(), String> {
        let output_lines: Vec<_> = output.lines().collect();
        let mut line_idx = 0;
        let mut forbidden: Vec<&str> = Vec::new();

        // CHECK-NOT patterns must not occur in [line_idx, until).
        let check_forbidden = |forbidden: &mut Vec<&str>, from: usize, until: usize| {
            for pattern in forbidden.drain(..) {
                let hit = output_lines[from..until].iter().position(|l| l.contains(pattern));
                if let Some(idx) = hit {
                    return Err(format!(
                        "CHECK-NOT: pattern '{}' found at line {}: '{}'",
                        pattern,
                        from + idx,
                        output_lines[from + idx]
                    ));
                }
            }
            Ok(())
        };

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => forbidden.push(pattern.as_str()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let kind = if matches!(directive, CheckDirective::Check(_)) {
                        "CHECK"
                    } else {
                        "CHECK-LABEL"
                    };
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            check_forbidden(&mut forbidden, line_idx, line_idx + idx)?;
                            line_idx += idx + 1; // Move to the next line after the match
                            if self.verbose {
                                println!("{}: '{}' found at line {}", kind, pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!("{}: pattern '{}' not found in output", kind, pattern));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    // The line right after a match leaves no room for a CHECK-NOT.
                    if let Some(not) = forbidden.first() {
                        return Err(format!(
                            "CHECK-NOT: '{}' cannot be directly followed by CHECK-NEXT '{}'",
                            not, pattern
                        ));
                    }
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }
                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        check_forbidden(&mut forbidden, line_idx, output_lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; RUN: %lirlower --print-schedules %s
; CHECK-LABEL: func test
; CHECK-NEXT: entry:
; CHECK-NOT: label [
; COM: This is a comment
func test {
entry:
  ret
}"#;

        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(spec.run_directives.len(), 1);
        assert_eq!(spec.run_directives[0].args, vec!["--print-schedules", "%s"]);
        assert_eq!(spec.check_directives.len(), 4);
        assert!(spec.lir_content.contains("func test"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "func test {\nentry:\n  ret\n}\n";

        let directives = vec![
            CheckDirective::CheckLabel("func test".to_string()),
            CheckDirective::CheckNext("entry:".to_string()),
            CheckDirective::CheckNot("label".to_string()),
            CheckDirective::Check("}".to_string()),
        ];

        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_failures() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let result = runner.validate_output(
            output,
            &[
                CheckDirective::Check("Line 1".to_string()),
                CheckDirective::CheckNext("Line 3".to_string()),
            ],
        );
        assert!(result.unwrap_err().contains("CHECK-NEXT"));

        let result = runner.validate_output(
            output,
            &[
                CheckDirective::CheckNot("Line 2".to_string()),
                CheckDirective::Check("Line 3".to_string()),
            ],
        );
        assert!(result.unwrap_err().contains("CHECK-NOT"));
    }

    #[test]
    fn test_check_not_before_check_next_is_rejected() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let err = runner
            .validate_output(
                output,
                &[
                    CheckDirective::Check("Line 1".to_string()),
                    CheckDirective::CheckNot("Line 2".to_string()),
                    CheckDirective::CheckNext("Line 2".to_string()),
                ],
            )
            .unwrap_err();
        assert!(err.contains("cannot be directly followed by CHECK-NEXT"), "{}", err);
    }

    #[test]
    fn test_run_reports_errors() {
        let content = "; RUN: %lirlower %s\nfunc f {\nentry:\n  %a:i32 = param\n}\n";
        let spec = TestSpec::parse(content).unwrap();
        let runner = TestRunner::new(false);
        let output = runner.execute_command(&spec.lir_content, &spec.run_directives[0]).unwrap();
        assert!(output.starts_with("error: f: block entry does not end in a terminator"));
    }
}
