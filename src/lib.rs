// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

#[macro_use]
extern crate pest_derive;
#[macro_use]
extern crate amplify;
#[macro_use]
extern crate tracing;

pub mod arch;
pub mod emulator;
mod model;
mod pipelines;

use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub use model::{instr, issues, program, scope, statement, word};
pub use pipelines::{analyzer, compiler, grammar, lexer, linker};

use crate::analyzer::{AnalyzeError, Analyzer};
use crate::arch::{ArchError, Architecture};
use crate::issues::{Issues, SourceUnit};
use crate::linker::{DirectoryProvider, Linker, SourceProvider};
use crate::program::Program;

/// Installs the stderr log subscriber. `RUST_LOG` takes precedence over the verbosity level, which
/// counts `-v` flags: warnings only, then info, debug and trace.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

#[derive(Debug, Display, Error)]
pub enum MainError {
    #[display("{1}\n\x1B[1;31mError:\x1B[0m could not compile `{0}` due to a previous lexical error")]
    Lexer(String, Issues<issues::Lexing>),

    #[display(
        "{2}\n\x1B[1;31mError:\x1B[0m could not compile `{0}` due to {1} previous syntax error(s)"
    )]
    Syntax(String, usize, Issues<issues::Parsing>),

    #[display(
        "{3}\n\x1B[1;31mError:\x1B[0m could not link `{0}` due to {1} previous error(s); {2} \
         warning(s) emitted"
    )]
    Linking(String, usize, usize, Issues<issues::Linking>),

    #[display("{source}\n\x1B[1;31mError:\x1B[0m could not include `{included}` into `{unit}`")]
    Included { unit: String, included: String, source: Box<MainError> },

    #[display("{2}\n\x1B[1;31mError:\x1B[0m could not compile `{0}` during pass `{1}`")]
    Resolve(String, &'static str, Issues<issues::Resolving>),

    #[display(
        "{2}\n\x1B[1;31mError:\x1B[0m could not encode `{0}` due to {1} previous error(s)"
    )]
    Encoding(String, usize, Issues<issues::Encoding>),

    #[display("\x1B[1;31mError:\x1B[0m {0}")]
    Access(BuildError),

    #[display("\x1B[1;31mError:\x1B[0m {0}")]
    Arch(ArchError),
}

impl From<BuildError> for MainError {
    #[inline]
    fn from(err: BuildError) -> Self { MainError::Access(err) }
}

impl From<ArchError> for MainError {
    #[inline]
    fn from(err: ArchError) -> Self { MainError::Arch(err) }
}

impl MainError {
    pub(crate) fn analyze(unit: &SourceUnit, err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::Lexer(issues) => MainError::Lexer(unit.id.clone(), issues),
            AnalyzeError::Parser(issues) => {
                MainError::Syntax(unit.id.clone(), issues.count_errors(), issues)
            }
        }
    }

    pub fn encoding(unit_id: &str, issues: Issues<issues::Encoding>) -> Self {
        MainError::Encoding(unit_id.to_owned(), issues.count_errors(), issues)
    }
}

#[derive(Debug, Display, Error)]
#[display(doc_comments)]
pub enum BuildError {
    /// no file named `{file}`
    /// \n
    /// details: {details}
    FileNotFound { file: String, details: Box<dyn Error> },

    /// file `{file}` exists, but can't be opened; please check file attributes
    /// \n
    /// details: {details}
    FileNoAccess { file: String, details: Box<dyn Error> },

    /// unable to write output file `{file}`
    /// \n
    /// details: {details}
    OutputWrite { file: String, details: Box<dyn Error> },
}

impl BuildError {
    pub fn read(path: &Path, err: io::Error) -> Self {
        let file = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => BuildError::FileNotFound { file, details: Box::new(err) },
            _ => BuildError::FileNoAccess { file, details: Box::new(err) },
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct AssemblerConfig {
    /// Directories searched for the units referenced by `!include`
    pub include_dirs: Vec<PathBuf>,
}

/// Assembler entry point: links, resolves and emits a program for the architecture
pub struct Assembler {
    arch: Arc<Architecture>,
    analyzer: Analyzer,
    provider: Box<dyn SourceProvider>,
}

impl Assembler {
    pub fn new(arch: Arc<Architecture>, config: AssemblerConfig) -> Self {
        Assembler::with_provider(arch, DirectoryProvider::new(config.include_dirs))
    }

    pub fn with_provider(arch: Arc<Architecture>, provider: impl SourceProvider + 'static) -> Self {
        Assembler { arch, analyzer: Analyzer::default(), provider: Box::new(provider) }
    }

    #[inline]
    pub fn arch(&self) -> &Architecture { &self.arch }

    /// Assembles the unit, returning the program together with the linker warnings
    pub fn assemble(
        &self,
        unit: &Arc<SourceUnit>,
    ) -> Result<(Program, Issues<issues::Linking>), MainError> {
        let linked = Linker::new(&self.analyzer, self.provider.as_ref()).link(unit)?;
        let program = compiler::compile(&self.arch, &unit.id, linked.statements)?;
        Ok((program, linked.warnings))
    }

    pub fn assemble_str(&self, id: &str, text: &str) -> Result<Program, MainError> {
        let (program, warnings) = self.assemble(&SourceUnit::new(id, text))?;
        if warnings.count_warnings() > 0 {
            warn!("{}", warnings);
        }
        Ok(program)
    }

    pub fn assemble_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(Program, Issues<issues::Linking>), MainError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| BuildError::read(path, err))?;
        info!("Assembling `{}` for {}", path.display(), self.arch.id());
        self.assemble(&SourceUnit::new(path.display(), text))
    }
}
