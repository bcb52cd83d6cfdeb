//! Verify-lower-verify pipeline shared by the `lirlower` binary and the
//! FileCheck test runner.

use crate::core::{CompilationSession, LowerResult};
use crate::lir::{parse_module, Function};
use crate::ssa::{lower_function, verify, LoweredEdge};
use bumpalo::Bump;
use std::fmt::Write;

/// What the pipeline runs and prints.
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Only verify the input; do not lower.
    pub verify_only: bool,
    /// Skip verification before and after lowering.
    pub no_verify: bool,
    /// Print the move schedule of every lowered edge.
    pub print_schedules: bool,
    /// Append lowering statistics.
    pub stats: bool,
}

impl DriverOptions {
    /// Options from command-line style flags. Unknown flags are ignored.
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = &'a str>) -> Self {
        let mut options = Self::default();
        for flag in flags {
            match flag {
                "--verify-only" => options.verify_only = true,
                "--no-verify" => options.no_verify = true,
                "--print-schedules" => options.print_schedules = true,
                "--stats" => options.stats = true,
                _ => {}
            }
        }
        options
    }
}

/// Parse `text` and run the pipeline over every function, returning the
/// printed output.
pub fn run(text: &str, options: &DriverOptions) -> LowerResult<String> {
    let funcs = parse_module(text)?;
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut output = String::new();

    for mut func in funcs {
        if options.verify_only {
            verify(&func)?;
            let _ = writeln!(output, "{}: ok", func.name);
            continue;
        }

        if !options.no_verify {
            verify(&func)?;
        }
        let lowered = lower_function(&session, &mut func)?;
        if !options.no_verify {
            verify(&func)?;
        }

        if options.print_schedules {
            print_schedules(&mut output, &func, &lowered);
        }
        let _ = write!(output, "{}", func);
    }

    if options.stats && !options.verify_only {
        let _ = write!(output, "{}", session.stats());
    }
    Ok(output)
}

fn print_schedules(output: &mut String, func: &Function, lowered: &[LoweredEdge]) {
    for edge in lowered {
        let _ = writeln!(
            output,
            "schedule {} -> {}:",
            func.block_name(edge.edge.pred),
            func.block_name(edge.edge.merge)
        );
        for mv in &edge.moves {
            let _ = writeln!(output, "  {}", func.display_inst(mv));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWAP: &str = "\
func swap {
entry:
  %a:i32 = param
  %b:i32 = param
  jump ^m [%a, %b]
m:
  label [%x:i32, %y:i32]
  %c:i32 = cmp %x, %y
  branch %c, ^back, ^exit
back:
  jump ^m [%y, %x]
exit:
  ret %x
}
";

    #[test]
    fn test_run_prints_lowered_function() {
        let options = DriverOptions::from_flags(["--print-schedules", "--stats"]);
        let output = run(SWAP, &options).unwrap();

        assert!(output.contains("schedule back -> m:\n  %tmp:i32 = move %y\n"));
        assert!(output.contains("m(%x:i32, %y:i32):\n  label\n"));
        assert!(output.contains("Cycles broken: 1"));
    }

    #[test]
    fn test_verify_only() {
        let options = DriverOptions::from_flags(["--verify-only"]);
        assert_eq!(run(SWAP, &options).unwrap(), "swap: ok\n");
    }
}
