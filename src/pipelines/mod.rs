// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

pub mod analyzer;
pub mod compiler;
mod control;
pub mod grammar;
mod layout;
pub mod lexer;
pub mod linker;
mod names;
mod scopes;
