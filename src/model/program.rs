// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Program: flat ordered list of resolved instructions passed from the assembler to the encoder
//! and to the emulator

use std::fmt::Write;
use std::iter::FromIterator;
use std::slice;

use crate::arch::{Architecture, EncodingError};
use crate::issues::{self, Issues, Src};
use crate::model::instr::Instruction;

#[derive(Clone, Debug, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    /// Source statement each instruction originates from; empty for decoded programs
    sources: Vec<Option<Src>>,
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool { self.instructions == other.instructions }
}

impl Eq for Program {}

impl FromIterator<Instruction> for Program {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Program::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter { self.instructions.iter() }
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let sources = vec![None; instructions.len()];
        Program { instructions, sources }
    }

    pub fn with_sources(instructions: Vec<Instruction>, sources: Vec<Option<Src>>) -> Self {
        debug_assert_eq!(instructions.len(), sources.len());
        Program { instructions, sources }
    }

    #[inline]
    pub fn len(&self) -> usize { self.instructions.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.instructions.is_empty() }

    #[inline]
    pub fn get(&self, index: u64) -> Option<&Instruction> {
        usize::try_from(index).ok().and_then(|index| self.instructions.get(index))
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Instruction> { self.instructions.iter() }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] { &self.instructions }

    pub fn source(&self, index: usize) -> Option<&Src> {
        self.sources.get(index).and_then(Option::as_ref)
    }

    /// Textual listing with one `index: instruction` line per program entry
    pub fn dump(&self, arch: &Architecture) -> String {
        let mut listing = String::new();
        for (index, instr) in self.instructions.iter().enumerate() {
            // writing into a string never fails
            let _ = writeln!(listing, "{:04}: {}", index, instr.display(arch.registers()));
        }
        listing
    }

    /// Concatenates encoded instructions. Reports every instruction the architecture can't
    /// encode.
    pub fn encode(&self, arch: &Architecture) -> Result<Vec<u8>, Issues<issues::Encoding>> {
        let mut issues = Issues::default();
        if !arch.has_encoded_format() {
            issues.push_error_nospan(EncodingError::Unsupported(arch.id()));
            return Err(issues);
        }
        let mut bytes = Vec::with_capacity(self.len() * arch.instruction_width().unwrap_or(0));
        for (index, instr) in self.instructions.iter().enumerate() {
            match arch.encode_instruction(instr) {
                Ok(encoded) => bytes.extend(encoded),
                Err(err) => match self.source(index) {
                    Some(src) => issues.push_error(err, src),
                    None => issues.push_error_nospan(err),
                },
            }
        }
        if issues.has_errors() {
            return Err(issues);
        }
        Ok(bytes)
    }

    /// Splits the bytes into instructions of the fixed encoded width and decodes them
    pub fn decode(arch: &Architecture, bytes: &[u8]) -> Result<Program, EncodingError> {
        let width = arch.instruction_width().ok_or(EncodingError::Unsupported(arch.id()))?;
        bytes
            .chunks(width)
            .map(|chunk| arch.decode_instruction(chunk))
            .collect::<Result<Vec<_>, _>>()
            .map(Program::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::model::instr::{Condition, Input, Operation};

    fn sample(arch: &Architecture) -> Program {
        let r1 = arch.registers().find_variable("R1").unwrap();
        let r2 = arch.registers().find_variable("R2").unwrap();
        Program::new(vec![
            Instruction::new(Operation::Load)
                .with_output(r1)
                .with_inputs(Input::Immediate(10), Input::default()),
            Instruction::new(Operation::Add)
                .with_output(r1)
                .with_inputs(Input::Register(r1), Input::Immediate(5))
                .when(Condition::NotEqual, Some(r2)),
            Instruction::constant(7),
        ])
    }

    #[test]
    fn listing() {
        let arch = arch::by_id("rx8").unwrap();
        assert_eq!(
            sample(&arch).dump(&arch),
            "0000: LOAD R1 = 10\n0001: ADD R1 = R1 + 5 if R2 != 0\n0002: DATA 7\n"
        );
    }

    #[test]
    fn image() {
        let arch = arch::by_id("rx8").unwrap();
        let program = sample(&arch);
        let bytes = program.encode(&arch).unwrap();
        assert_eq!(bytes.len(), 15);
        assert_eq!(Program::decode(&arch, &bytes).unwrap(), program);
        assert_eq!(
            Program::decode(&arch, &bytes[..14]).unwrap_err(),
            EncodingError::WrongLength { expected: 5, found: 4 }
        );

        let rx16 = arch::by_id("rx16").unwrap();
        let err = Program::new(vec![Instruction::halt()]).encode(&rx16).unwrap_err();
        assert_eq!(err.errors().next(), Some(&EncodingError::Unsupported("RX16")));
    }
}
