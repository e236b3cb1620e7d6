//! The lmcc driver binary.
//!
//! Reads a textual IR module, compiles its entry function, runs the
//! configured optimisation pipeline, and prints the resulting LMC
//! assembly to stdout. Warnings go to stderr, filtered by the
//! configured verbosity.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::warn;

use lmcc::backend::{Compiler, Engine};
use lmcc::ir;
use lmcc::opt::StrategySet;

#[derive(Parser)]
#[command(name = "lmcc", about = "Compile textual IR to Little Man Computer assembly")]
struct Args {
    /// Input IR file.
    input: PathBuf,

    /// Warning verbosity: 0 default, 1 info, 2 debug.
    #[arg(short, long)]
    wlevel: Option<u8>,

    /// Optimisation strategy bitmask (1 thrashing, 2 cleanup,
    /// 4 propagation). Defaults to all.
    #[arg(short = 'O', long = "opt")]
    opt: Option<u8>,

    /// Also print the program as it looked before optimisation.
    #[arg(long)]
    show_unoptimised: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let text = match std::fs::read_to_string(&args.input) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", args.input.display());
            return ExitCode::FAILURE;
        }
    };

    let module = match ir::parse_module(&text) {
        Ok(module) => module,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if module.entry().is_none() {
        eprintln!("error: no `{}` entry function", ir::ENTRY_FUNCTION);
        return ExitCode::FAILURE;
    }

    let engine = Engine::new();
    let mut compiler = Compiler::new(&module);

    if let Some(level) = args.wlevel {
        if !compiler
            .options_mut()
            .set(lmcc::backend::options::KEY_WARNING_LEVEL, i64::from(level))
        {
            eprintln!("error: invalid warning level {level}");
            return ExitCode::FAILURE;
        }
    }
    if let Some(bits) = args.opt {
        compiler.options_mut().strategies = StrategySet::from_bits(bits);
    }

    if let Err(err) = compiler.compile_entry(&engine) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    let surfaced: Vec<String> = compiler.surfaced_warnings().map(ToString::to_string).collect();
    for warning in surfaced {
        warn!("{warning}");
        eprintln!("warning: {warning}");
    }

    if args.show_unoptimised {
        println!("; unoptimised\n{}", compiler.program());
    }

    if let Err(err) = compiler.optimise() {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    print!("{}", compiler.program());
    ExitCode::SUCCESS
}
