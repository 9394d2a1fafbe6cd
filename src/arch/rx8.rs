// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! RX8: 8-bit reference architecture with a fixed five-byte instruction encoding.
//!
//! Encoded layout:
//!
//! | byte | bits | field                                      |
//! |------|------|--------------------------------------------|
//! | 0    | 7..2 | opcode                                     |
//! | 0    | 1    | operand `a` is a register                  |
//! | 0    | 0    | operand `b` is a register                  |
//! | 1    | 7..5 | condition                                  |
//! | 1    | 4..0 | condition source address                   |
//! | 2    | 7..5 | reserved, must be zero                     |
//! | 2    | 4..0 | output address                             |
//! | 3    | 7..0 | operand `a`: immediate or register address |
//! | 4    | 7..0 | operand `b`: immediate or register address |
//!
//! Address `0x1F` encodes an absent variable.

use std::collections::BTreeMap;

use super::{
    ArchError, Architecture, EncodingError, InstructionCodec, MemoryMap, RegisterFile, VarIdx,
};
use crate::model::instr::{Condition, Input, Instruction, Operation};
use crate::model::word::WordType;

pub const ID: &str = "RX8";

const WIDTH: usize = 5;
const NO_ADDRESS: u8 = 0x1F;

const OPCODES: [(u8, Operation); 34] = [
    (0x00, Operation::Nop),
    (0x01, Operation::Load),
    (0x02, Operation::Load2),
    (0x03, Operation::Add),
    (0x04, Operation::Subtract),
    (0x05, Operation::AddWithCarry),
    (0x06, Operation::SubtractWithCarry),
    (0x07, Operation::Increment),
    (0x08, Operation::Decrement),
    (0x09, Operation::Multiply),
    (0x0A, Operation::Divide),
    (0x0B, Operation::Modulo),
    (0x0C, Operation::And),
    (0x0D, Operation::Or),
    (0x0E, Operation::Xor),
    (0x0F, Operation::Nand),
    (0x10, Operation::Nor),
    (0x11, Operation::Xnor),
    (0x12, Operation::ShiftLeft),
    (0x13, Operation::ShiftRight),
    (0x14, Operation::RotateLeft),
    (0x15, Operation::RotateRight),
    (0x16, Operation::MemoryLoad),
    (0x17, Operation::MemoryStore),
    (0x18, Operation::StackPush),
    (0x19, Operation::StackPop),
    (0x1A, Operation::StackPeek),
    (0x1B, Operation::Call),
    (0x1C, Operation::Call2),
    (0x1D, Operation::Return),
    (0x1E, Operation::Break),
    (0x20, Operation::IoRead),
    (0x21, Operation::IoWrite),
    (0x22, Operation::IoPoll),
];

const CONDITIONS: [(u8, Condition); 8] = [
    (0b000, Condition::Always),
    (0b001, Condition::Never),
    (0b010, Condition::Equal),
    (0b011, Condition::NotEqual),
    (0b100, Condition::Less),
    (0b101, Condition::LessOrEqual),
    (0b110, Condition::Greater),
    (0b111, Condition::GreaterOrEqual),
];

pub fn architecture() -> Result<Architecture, ArchError> {
    let registers = RegisterFile::builder()
        .register("R0", WordType::U8, Some(0))
        .register("R1", WordType::U8, Some(1))
        .register("R2", WordType::U8, Some(2))
        .register("R3", WordType::U8, Some(3))
        .register("R4", WordType::U8, Some(4))
        .register("R5", WordType::U8, Some(5))
        .register("R6", WordType::U8, Some(6))
        .register("R7", WordType::U8, Some(7))
        .register("X", WordType::U16, Some(8))
        .part("XL", "X", WordType::U8, 0, Some(9))
        .part("XH", "X", WordType::U8, 1, Some(10))
        .program_counter("PC", WordType::U16, Some(11))
        .part("PCL", "PC", WordType::U8, 0, Some(12))
        .access(true, true, false)
        .part("PCH", "PC", WordType::U8, 1, Some(13))
        .access(true, true, false);

    Architecture::builder(ID, WordType::U8)
        .address_type(WordType::U8)
        .stack_type(WordType::U16)
        .memory_size(192)
        .stack_size(16)
        .registers(registers)
        .memory_map(MemoryMap::new().memory(0..192, 0).program(192..256, 0))
        .codec(Rx8Codec::new())
        .build()
}

pub struct Rx8Codec {
    opcodes: BTreeMap<Operation, u8>,
    operations: BTreeMap<u8, Operation>,
    condition_codes: BTreeMap<Condition, u8>,
    conditions: BTreeMap<u8, Condition>,
}

impl Default for Rx8Codec {
    fn default() -> Self { Rx8Codec::new() }
}

impl Rx8Codec {
    pub fn new() -> Self {
        Rx8Codec {
            opcodes: OPCODES.iter().map(|(code, op)| (*op, *code)).collect(),
            operations: OPCODES.iter().copied().collect(),
            condition_codes: CONDITIONS.iter().map(|(code, cond)| (*cond, *code)).collect(),
            conditions: CONDITIONS.iter().copied().collect(),
        }
    }

    fn address(registers: &RegisterFile, var: VarIdx) -> Result<u8, EncodingError> {
        let variable = registers.variable(var);
        match variable.address {
            Some(address) if address < NO_ADDRESS => Ok(address),
            _ => Err(EncodingError::NotAddressable(variable.id.clone())),
        }
    }

    fn encode_input(registers: &RegisterFile, input: Input) -> Result<(bool, u8), EncodingError> {
        match input {
            Input::Immediate(value) if WordType::U8.fits(value) => Ok((false, value as u8)),
            Input::Immediate(value) => {
                Err(EncodingError::ImmediateTooWide { value, ty: WordType::U8 })
            }
            Input::Register(var) => {
                if !registers.variable(var).readable {
                    return Err(EncodingError::NotReadable(registers.variable_name(var).to_owned()));
                }
                Ok((true, Self::address(registers, var)?))
            }
        }
    }

    fn decode_variable(
        registers: &RegisterFile,
        address: u8,
    ) -> Result<Option<VarIdx>, EncodingError> {
        if address == NO_ADDRESS {
            return Ok(None);
        }
        registers.by_address(address).map(Some).ok_or(EncodingError::UnknownAddress(address))
    }

    fn decode_input(
        registers: &RegisterFile,
        is_reg: bool,
        byte: u8,
    ) -> Result<Input, EncodingError> {
        if !is_reg {
            return Ok(Input::Immediate(byte as u64));
        }
        registers.by_address(byte).map(Input::Register).ok_or(EncodingError::UnknownAddress(byte))
    }
}

impl InstructionCodec for Rx8Codec {
    #[inline]
    fn width(&self) -> usize { WIDTH }

    fn encode(
        &self,
        registers: &RegisterFile,
        instr: &Instruction,
    ) -> Result<Vec<u8>, EncodingError> {
        let opcode = *self
            .opcodes
            .get(&instr.operation)
            .ok_or(EncodingError::UnsupportedOperation(instr.operation))?;
        let condition = self.condition_codes[&instr.condition];

        if matches!(instr.operation, Operation::Load2 | Operation::Call2)
            && !matches!((instr.a, instr.b), (Input::Immediate(_), Input::Immediate(_)))
        {
            return Err(EncodingError::OperandShape {
                operation: instr.operation,
                expected: "immediate low and high words",
            });
        }

        let output = match instr.output {
            None => NO_ADDRESS,
            Some(var) if !registers.variable(var).writable => {
                return Err(EncodingError::NotWritable(registers.variable_name(var).to_owned()))
            }
            Some(var) => Self::address(registers, var)?,
        };
        let source = match instr.condition_source {
            None => NO_ADDRESS,
            Some(var) if !registers.variable(var).conditionable => {
                return Err(EncodingError::NotConditionable(
                    registers.variable_name(var).to_owned(),
                ))
            }
            Some(var) => Self::address(registers, var)?,
        };
        let (a_reg, a) = Self::encode_input(registers, instr.a)?;
        let (b_reg, b) = Self::encode_input(registers, instr.b)?;

        Ok(vec![
            opcode << 2 | (a_reg as u8) << 1 | b_reg as u8,
            condition << 5 | source,
            output,
            a,
            b,
        ])
    }

    fn decode(&self, registers: &RegisterFile, bytes: &[u8]) -> Result<Instruction, EncodingError> {
        if bytes.len() != WIDTH {
            return Err(EncodingError::WrongLength { expected: WIDTH, found: bytes.len() });
        }
        if bytes[2] & 0xE0 != 0 {
            return Err(EncodingError::ReservedBits);
        }
        let opcode = bytes[0] >> 2;
        let operation =
            *self.operations.get(&opcode).ok_or(EncodingError::UnknownOpcode(opcode))?;
        let code = bytes[1] >> 5;
        let condition = *self.conditions.get(&code).ok_or(EncodingError::UnknownCondition(code))?;

        Ok(Instruction {
            operation,
            condition,
            condition_source: Self::decode_variable(registers, bytes[1] & NO_ADDRESS)?,
            output: Self::decode_variable(registers, bytes[2])?,
            a: Self::decode_input(registers, bytes[0] & 0b10 != 0, bytes[3])?,
            b: Self::decode_input(registers, bytes[0] & 0b01 != 0, bytes[4])?,
        })
    }
}
