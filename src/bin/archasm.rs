// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use archasm::{arch, Assembler, AssemblerConfig, BuildError, MainError};
use clap::Parser;

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Parser)]
#[clap(name = "archasm", bin_name = "archasm", author, version, about)]
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

    /// Encoded program image to write
    ///
    /// When several sources are given this is a directory receiving one `.bin` image per source
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Print textual listing of the assembled program
    #[clap(long)]
    pub dump: bool,

    /// Source files to assemble
    #[clap(required = true)]
    pub files: Vec<PathBuf>,
}

fn main() {
    let args = Args::parse();
    archasm::init_tracing(args.verbose);
    match assemble_all(&args) {
        Ok(_) => exit(0),
        Err(err) => {
            eprintln!("{}", err);
            exit(1)
        }
    }
}

fn assemble_all(args: &Args) -> Result<(), MainError> {
    let arch = arch::by_id(&args.arch)?;
    let config = AssemblerConfig { include_dirs: args.include_dirs.clone() };
    let assembler = Assembler::new(arch, config);

    for file in &args.files {
        let output = match (&args.output, args.files.len()) {
            (None, _) => None,
            (Some(path), 1) => Some(path.clone()),
            (Some(dir), _) => {
                let image = file.with_extension("bin");
                Some(dir.join(image.file_name().unwrap_or_default()))
            }
        };
        assemble(&assembler, file, output.as_deref(), args.dump)?;
    }
    Ok(())
}

fn assemble(
    assembler: &Assembler,
    file: &Path,
    output: Option<&Path>,
    dump: bool,
) -> Result<(), MainError> {
    eprintln!("\x1B[1;32mAssembling\x1B[0m {} for {}", file.display(), assembler.arch().id());

    let (program, warnings) = assembler.assemble_file(file)?;
    if warnings.count_warnings() > 0 {
        eprintln!("{}", warnings);
    }
    if dump {
        print!("{}", program.dump(assembler.arch()));
    }

    if let Some(output) = output {
        let unit = file.display().to_string();
        let image = program
            .encode(assembler.arch())
            .map_err(|issues| MainError::encoding(&unit, issues))?;
        if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|err| BuildError::OutputWrite {
                file: output.display().to_string(),
                details: Box::new(err),
            })?;
        }
        fs::write(output, &image).map_err(|err| BuildError::OutputWrite {
            file: output.display().to_string(),
            details: Box::new(err),
        })?;
        eprintln!("\x1B[1;32m   Writing\x1B[0m {} ({} bytes)", output.display(), image.len());
    }

    eprintln!("\x1B[1;32m  Finished\x1B[0m {} instructions", program.len());
    Ok(())
}
