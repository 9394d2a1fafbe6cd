// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

pub mod instr;
pub mod issues;
pub mod program;
pub mod scope;
pub mod statement;
pub mod word;
