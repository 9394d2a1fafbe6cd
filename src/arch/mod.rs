// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Architecture descriptions consumed by both the assembler and the emulator

mod registers;
pub mod rx16;
pub mod rx8;

use std::fmt::{self, Debug, Formatter};
use std::ops::Range;
use std::sync::Arc;

pub use registers::{
    RegIdx, Register, RegisterFile, RegisterFileBuilder, RegisterFileError, RegisterVariable,
    VarIdx, VariableKind,
};

use crate::issues::Issue;
use crate::model::instr::{Instruction, Operation};
use crate::model::word::WordType;

/// Target of a memory window
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum MappingTarget {
    /// Plain memory; window start maps to the given memory cell
    Memory { offset: usize },
    /// Read-only view onto program space; window start maps to the given program index
    Program { offset: usize },
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct MemoryMapping {
    pub range: Range<u64>,
    pub target: MappingTarget,
}

/// Ordered list of address windows. The first window containing an address wins.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct MemoryMap {
    mappings: Vec<MemoryMapping>,
}

impl MemoryMap {
    pub fn new() -> Self { MemoryMap::default() }

    pub fn memory(mut self, range: Range<u64>, offset: usize) -> Self {
        self.mappings.push(MemoryMapping { range, target: MappingTarget::Memory { offset } });
        self
    }

    pub fn program(mut self, range: Range<u64>, offset: usize) -> Self {
        self.mappings.push(MemoryMapping { range, target: MappingTarget::Program { offset } });
        self
    }

    #[inline]
    pub fn mappings(&self) -> &[MemoryMapping] { &self.mappings }

    /// Resolves an address to the mapped location. Addresses outside all the windows are
    /// clamped into `[0, memory_size)` and treated as plain memory.
    pub fn resolve(&self, address: u64, memory_size: usize) -> MappingTarget {
        for mapping in &self.mappings {
            if mapping.range.contains(&address) {
                let delta = (address - mapping.range.start) as usize;
                return match mapping.target {
                    MappingTarget::Memory { offset } => MappingTarget::Memory {
                        offset: (offset + delta).min(memory_size.saturating_sub(1)),
                    },
                    MappingTarget::Program { offset } => {
                        MappingTarget::Program { offset: offset + delta }
                    }
                };
            }
        }
        let clamped = address.min(memory_size.saturating_sub(1) as u64) as usize;
        MappingTarget::Memory { offset: clamped }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum EncodingError {
    /// architecture `{0}` has no encoded instruction format
    Unsupported(&'static str),

    /// operation {0} can't be represented by the instruction encoding
    UnsupportedOperation(Operation),

    /// {operation} requires {expected}
    OperandShape { operation: Operation, expected: &'static str },

    /// immediate value {value} does not fit into {ty} operand
    ImmediateTooWide { value: u64, ty: WordType },

    /// register variable `{0}` has no address and can't be encoded
    NotAddressable(String),

    /// output must address a writable register, while `{0}` is read-only
    NotWritable(String),

    /// input register `{0}` is not readable
    NotReadable(String),

    /// register `{0}` can't be used as a condition source
    NotConditionable(String),

    /// unknown operation code {0:#04x}
    UnknownOpcode(u8),

    /// unknown condition code {0:#03b}
    UnknownCondition(u8),

    /// register address {0} does not map to any declared variable
    UnknownAddress(u8),

    /// encoded instruction must have {expected} bytes, while {found} bytes were given
    WrongLength { expected: usize, found: usize },

    /// reserved bits of encoded instruction are not zero
    ReservedBits,
}

impl Issue for EncodingError {
    fn errno(&self) -> u16 {
        match self {
            EncodingError::Unsupported(_) => 5001,
            EncodingError::UnsupportedOperation(_) => 5002,
            EncodingError::OperandShape { .. } => 5003,
            EncodingError::ImmediateTooWide { .. } => 5004,
            EncodingError::NotAddressable(_) => 5005,
            EncodingError::NotWritable(_) => 5006,
            EncodingError::NotReadable(_) => 5007,
            EncodingError::NotConditionable(_) => 5008,
            EncodingError::UnknownOpcode(_) => 5009,
            EncodingError::UnknownCondition(_) => 5010,
            EncodingError::UnknownAddress(_) => 5011,
            EncodingError::WrongLength { .. } => 5012,
            EncodingError::ReservedBits => 5013,
        }
    }

    #[inline]
    fn is_error(&self) -> bool { true }
}

/// Architecture-specific instruction encoding strategy
pub trait InstructionCodec: Send + Sync {
    /// Number of bytes every encoded instruction occupies
    fn width(&self) -> usize;

    fn encode(&self, registers: &RegisterFile, instr: &Instruction)
        -> Result<Vec<u8>, EncodingError>;

    fn decode(&self, registers: &RegisterFile, bytes: &[u8]) -> Result<Instruction, EncodingError>;
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ArchError {
    /// invalid register file: {0}
    #[from]
    Registers(RegisterFileError),

    /// architecture `{0}` must have non-zero memory size
    NoMemory(&'static str),

    /// architecture `{0}` must have non-zero stack size
    NoStack(&'static str),

    /// architecture `{0}` is missing the register file declaration
    NoRegisters(&'static str),

    /// unknown architecture `{0}`
    Unknown(String),
}

/// Complete description of an architecture.
pub struct Architecture {
    id: &'static str,
    data_type: WordType,
    address_type: WordType,
    stack_type: WordType,
    memory_size: usize,
    stack_size: usize,
    registers: RegisterFile,
    memory_map: MemoryMap,
    codec: Option<Box<dyn InstructionCodec>>,
}

impl Debug for Architecture {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Architecture")
            .field("id", &self.id)
            .field("data_type", &self.data_type)
            .field("address_type", &self.address_type)
            .field("stack_type", &self.stack_type)
            .field("memory_size", &self.memory_size)
            .field("stack_size", &self.stack_size)
            .field("encoded", &self.codec.is_some())
            .finish()
    }
}

impl Architecture {
    pub fn builder(id: &'static str, data_type: WordType) -> ArchitectureBuilder {
        ArchitectureBuilder {
            id,
            data_type,
            address_type: data_type,
            stack_type: data_type,
            memory_size: 256,
            stack_size: 16,
            registers: None,
            memory_map: None,
            codec: None,
        }
    }

    #[inline]
    pub fn id(&self) -> &'static str { self.id }

    #[inline]
    pub fn data_type(&self) -> WordType { self.data_type }

    #[inline]
    pub fn address_type(&self) -> WordType { self.address_type }

    #[inline]
    pub fn stack_type(&self) -> WordType { self.stack_type }

    #[inline]
    pub fn pc_type(&self) -> WordType { self.registers.pc_type() }

    #[inline]
    pub fn memory_size(&self) -> usize { self.memory_size }

    #[inline]
    pub fn stack_size(&self) -> usize { self.stack_size }

    #[inline]
    pub fn registers(&self) -> &RegisterFile { &self.registers }

    #[inline]
    pub fn memory_map(&self) -> &MemoryMap { &self.memory_map }

    #[inline]
    pub fn has_encoded_format(&self) -> bool { self.codec.is_some() }

    /// Size of a single encoded instruction, if the architecture has encoded format
    pub fn instruction_width(&self) -> Option<usize> { self.codec.as_ref().map(|c| c.width()) }

    pub fn encode_instruction(&self, instr: &Instruction) -> Result<Vec<u8>, EncodingError> {
        self.codec
            .as_ref()
            .ok_or(EncodingError::Unsupported(self.id))?
            .encode(&self.registers, instr)
    }

    pub fn decode_instruction(&self, bytes: &[u8]) -> Result<Instruction, EncodingError> {
        self.codec
            .as_ref()
            .ok_or(EncodingError::Unsupported(self.id))?
            .decode(&self.registers, bytes)
    }
}

pub struct ArchitectureBuilder {
    id: &'static str,
    data_type: WordType,
    address_type: WordType,
    stack_type: WordType,
    memory_size: usize,
    stack_size: usize,
    registers: Option<RegisterFileBuilder>,
    memory_map: Option<MemoryMap>,
    codec: Option<Box<dyn InstructionCodec>>,
}

impl ArchitectureBuilder {
    pub fn address_type(mut self, ty: WordType) -> Self {
        self.address_type = ty;
        self
    }

    pub fn stack_type(mut self, ty: WordType) -> Self {
        self.stack_type = ty;
        self
    }

    pub fn memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn registers(mut self, builder: RegisterFileBuilder) -> Self {
        self.registers = Some(builder);
        self
    }

    pub fn memory_map(mut self, map: MemoryMap) -> Self {
        self.memory_map = Some(map);
        self
    }

    pub fn codec(mut self, codec: impl InstructionCodec + 'static) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    pub fn build(self) -> Result<Architecture, ArchError> {
        if self.memory_size == 0 {
            return Err(ArchError::NoMemory(self.id));
        }
        if self.stack_size == 0 {
            return Err(ArchError::NoStack(self.id));
        }
        let registers = self.registers.ok_or(ArchError::NoRegisters(self.id))?.build()?;
        let memory_map = self
            .memory_map
            .unwrap_or_else(|| MemoryMap::new().memory(0..self.memory_size as u64, 0));
        Ok(Architecture {
            id: self.id,
            data_type: self.data_type,
            address_type: self.address_type,
            stack_type: self.stack_type,
            memory_size: self.memory_size,
            stack_size: self.stack_size,
            registers,
            memory_map,
            codec: self.codec,
        })
    }
}

/// Ids of the architectures shipped with the crate
pub const KNOWN: [&str; 2] = [rx8::ID, rx16::ID];

/// Constructs one of the shipped architectures by its id (case-insensitive)
pub fn by_id(id: &str) -> Result<Arc<Architecture>, ArchError> {
    let arch = match id.to_ascii_uppercase().as_str() {
        rx8::ID => rx8::architecture()?,
        rx16::ID => rx16::architecture()?,
        _ => return Err(ArchError::Unknown(id.to_owned())),
    };
    Ok(Arc::new(arch))
}
