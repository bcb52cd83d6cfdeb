//! Verify and lower the phis of an LIR module.
//!
//! # Usage
//!
//! ```bash
//! # Print the lowered module
//! lirlower input.lir
//!
//! # Show the move schedule of every edge, read from stdin
//! cat input.lir | lirlower - --print-schedules
//!
//! # Trace every emitted move
//! RUST_LOG=trace lirlower input.lir
//! ```

use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tpde_ssa::driver::{self, DriverOptions};

#[derive(Parser)]
#[command(name = "lirlower")]
#[command(about = "Verify SSA form and lower merge phis into edge moves", long_about = None)]
struct Cli {
    /// Input file, or `-` for stdin
    input: PathBuf,

    /// Only verify the input
    #[arg(long, conflicts_with = "no_verify")]
    verify_only: bool,

    /// Skip verification before and after lowering
    #[arg(long)]
    no_verify: bool,

    /// Print lowering statistics
    #[arg(long)]
    stats: bool,

    /// Print the move schedule of every lowered edge
    #[arg(long)]
    print_schedules: bool,
}

fn read_input(path: &Path) -> std::io::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(path)
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let text = match read_input(&cli.input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", cli.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let options = DriverOptions {
        verify_only: cli.verify_only,
        no_verify: cli.no_verify,
        print_schedules: cli.print_schedules,
        stats: cli.stats,
    };
    log::debug!("lowering {} with {:?}", cli.input.display(), options);

    match driver::run(&text, &options) {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
