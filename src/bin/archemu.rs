// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::AtomicBool;

use archasm::arch::{self, VariableKind};
use archasm::emulator::{Emulator, QueueIo, StopReason};
use archasm::{Assembler, AssemblerConfig, MainError};
use clap::Parser;

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Parser)]
#[clap(name = "archemu", bin_name = "archemu", author, version, about)]
pub struct Args {
    /// Set verbosity level
    ///
    /// Can be used multiple times to increase verbosity
    #[clap(short, long, global = true, parse(from_occurrences))]
    pub verbose: u8,

    /// Target architecture
    #[clap(short, long, default_value = "rx8")]
    pub arch: String,

    /// Directory searched for included units; may be repeated
    #[clap(short = 'I', long = "include")]
    pub include_dirs: Vec<PathBuf>,

    /// Maximum number of instructions to execute
    #[clap(long, default_value = "100000")]
    pub max_steps: u64,

    /// Value made available to `in` instructions; may be repeated
    #[clap(long)]
    pub input: Vec<u64>,

    /// Source file to assemble and run
    pub file: PathBuf,
}

fn main() {
    let args = Args::parse();
    archasm::init_tracing(args.verbose);
    match run(args) {
        Ok(_) => exit(0),
        Err(err) => {
            eprintln!("{}", err);
            exit(1)
        }
    }
}

fn run(args: Args) -> Result<(), MainError> {
    let arch = arch::by_id(&args.arch)?;
    let config = AssemblerConfig { include_dirs: args.include_dirs };
    let assembler = Assembler::new(arch.clone(), config);

    eprintln!("\x1B[1;32mAssembling\x1B[0m {} for {}", args.file.display(), arch.id());
    let (program, warnings) = assembler.assemble_file(&args.file)?;
    if warnings.count_warnings() > 0 {
        eprintln!("{}", warnings);
    }

    eprintln!("\x1B[1;32m   Running\x1B[0m {} instructions", program.len());
    let mut emulator = Emulator::with_io(arch.clone(), QueueIo::new(args.input));
    emulator.load_program(program);
    let outcome = emulator.run(Some(args.max_steps), &AtomicBool::new(false));
    match outcome.reason {
        StopReason::Break => {
            eprintln!("\x1B[1;32m    Halted\x1B[0m after {} steps", outcome.steps)
        }
        reason => {
            eprintln!("\x1B[1;33m   Stopped\x1B[0m on {} after {} steps", reason, outcome.steps)
        }
    }

    let registers = arch.registers();
    for (no, variable) in registers.variables().iter().enumerate() {
        if variable.kind != VariableKind::Direct {
            continue;
        }
        let value = emulator.variable(arch::VarIdx(no as u16));
        println!("{:>4} = {:#06x} ({})", variable.id, value, value);
    }
    println!("   C = {}", emulator.state().carry);
    if !emulator.io().output().is_empty() {
        let output: Vec<_> = emulator.io().output().iter().map(u64::to_string).collect();
        println!(" out = {}", output.join(", "));
    }
    Ok(())
}
