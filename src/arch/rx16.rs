// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! RX16: 16-bit execution-only architecture; programs run in the emulator but have no encoded
//! form.

use super::{ArchError, Architecture, RegisterFile};
use crate::model::word::WordType;

pub const ID: &str = "RX16";

pub fn architecture() -> Result<Architecture, ArchError> {
    let mut registers = RegisterFile::builder();
    for no in 0..16 {
        registers = registers.register(&format!("R{}", no), WordType::U16, None);
    }
    let registers = registers.program_counter("PC", WordType::U16, None);

    Architecture::builder(ID, WordType::U16)
        .address_type(WordType::U16)
        .stack_type(WordType::U16)
        .memory_size(1 << 16)
        .stack_size(64)
        .registers(registers)
        .build()
}
