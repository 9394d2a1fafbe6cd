// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

use std::collections::BTreeMap;

use crate::model::word::WordType;

/// Handle of a register inside its [`RegisterFile`]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display("reg#{0}")]
pub struct RegIdx(pub u16);

/// Handle of a register variable inside its [`RegisterFile`]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display("var#{0}")]
pub struct VarIdx(pub u16);

impl RegIdx {
    #[inline]
    pub fn index(self) -> usize { self.0 as usize }
}

impl VarIdx {
    #[inline]
    pub fn index(self) -> usize { self.0 as usize }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Register {
    pub id: String,
    pub ty: WordType,
}

/// Slice of the backing register a variable gives access to
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum VariableKind {
    Direct,
    Part { ty: WordType, index: u8 },
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct RegisterVariable {
    pub id: String,
    pub register: RegIdx,
    pub kind: VariableKind,
    /// Address used by instruction encoders; variables without address can't be encoded
    pub address: Option<u8>,
    pub readable: bool,
    pub writable: bool,
    pub conditionable: bool,
}

impl RegisterVariable {
    /// Bit offset of the variable inside its register
    pub fn shift(&self) -> u32 {
        match self.kind {
            VariableKind::Direct => 0,
            VariableKind::Part { ty, index } => ty.bits() * index as u32,
        }
    }

    /// Extracts variable value out of the full register value
    pub fn read(&self, register_ty: WordType, register_value: u64) -> u64 {
        match self.kind {
            VariableKind::Direct => register_ty.truncate(register_value),
            VariableKind::Part { ty, .. } => ty.truncate(register_value >> self.shift()),
        }
    }

    /// Produces new full register value with the variable bits replaced and all other bits
    /// preserved
    pub fn write(&self, register_ty: WordType, register_value: u64, value: u64) -> u64 {
        match self.kind {
            VariableKind::Direct => register_ty.truncate(value),
            VariableKind::Part { ty, .. } => {
                let shift = self.shift();
                let mask = ty.mask() << shift;
                register_ty.truncate((register_value & !mask) | ((ty.truncate(value)) << shift))
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum RegisterFileError {
    /// register `{0}` is declared more than once
    RepeatedRegister(String),

    /// register variable `{0}` is declared more than once
    RepeatedVariable(String),

    /// variable `{variable}` refers to unknown register `{register}`
    UnknownRegister { variable: String, register: String },

    /// part {index} of {ty} variable `{variable}` does not fit into `{register}`
    PartOutOfRange { variable: String, register: String, ty: WordType, index: u8 },

    /// variable address {address} is used by both `{first}` and `{second}`
    RepeatedAddress { address: u8, first: String, second: String },

    /// register file does not declare a program counter
    NoProgramCounter,
}

/// Complete catalog of the registers of an architecture and the variables giving access to them.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RegisterFile {
    registers: Vec<Register>,
    variables: Vec<RegisterVariable>,
    register_ids: BTreeMap<String, RegIdx>,
    variable_ids: BTreeMap<String, VarIdx>,
    addresses: BTreeMap<u8, VarIdx>,
    pc: RegIdx,
    pc_variable: VarIdx,
}

impl RegisterFile {
    #[inline]
    pub fn builder() -> RegisterFileBuilder { RegisterFileBuilder::default() }

    #[inline]
    pub fn registers(&self) -> &[Register] { &self.registers }

    #[inline]
    pub fn variables(&self) -> &[RegisterVariable] { &self.variables }

    pub fn register(&self, idx: RegIdx) -> &Register {
        self.registers.get(idx.index()).unwrap_or_else(|| {
            panic!("register handle {} does not belong to the register file", idx)
        })
    }

    pub fn variable(&self, idx: VarIdx) -> &RegisterVariable {
        self.variables.get(idx.index()).unwrap_or_else(|| {
            panic!("variable handle {} does not belong to the register file", idx)
        })
    }

    #[inline]
    pub fn variable_name(&self, idx: VarIdx) -> &str { &self.variable(idx).id }

    #[inline]
    pub fn find_register(&self, id: &str) -> Option<RegIdx> { self.register_ids.get(id).copied() }

    #[inline]
    pub fn find_variable(&self, id: &str) -> Option<VarIdx> { self.variable_ids.get(id).copied() }

    #[inline]
    pub fn by_address(&self, address: u8) -> Option<VarIdx> {
        self.addresses.get(&address).copied()
    }

    #[inline]
    pub fn pc(&self) -> RegIdx { self.pc }

    #[inline]
    pub fn pc_variable(&self) -> VarIdx { self.pc_variable }

    #[inline]
    pub fn pc_type(&self) -> WordType { self.register(self.pc).ty }

    /// Word type of the value visible through the variable
    pub fn variable_type(&self, idx: VarIdx) -> WordType {
        let var = self.variable(idx);
        match var.kind {
            VariableKind::Direct => self.register(var.register).ty,
            VariableKind::Part { ty, .. } => ty,
        }
    }

    /// Whether writing the variable changes the program counter
    #[inline]
    pub fn targets_pc(&self, idx: VarIdx) -> bool { self.variable(idx).register == self.pc }
}

#[derive(Clone, Debug)]
struct VariableDecl {
    id: String,
    register: String,
    kind: VariableKind,
    address: Option<u8>,
    readable: bool,
    writable: bool,
    conditionable: bool,
}

/// Declarative builder for [`RegisterFile`]. Each [`RegisterFileBuilder::register`] call
/// creates a register together with a direct variable of the same name.
#[derive(Clone, Debug, Default)]
pub struct RegisterFileBuilder {
    registers: Vec<Register>,
    variables: Vec<VariableDecl>,
    pc: Option<String>,
}

impl RegisterFileBuilder {
    /// General-purpose register with readable, writable and conditionable direct variable
    pub fn register(mut self, id: &str, ty: WordType, address: Option<u8>) -> Self {
        self.registers.push(Register { id: id.to_owned(), ty });
        self.variables.push(VariableDecl {
            id: id.to_owned(),
            register: id.to_owned(),
            kind: VariableKind::Direct,
            address,
            readable: true,
            writable: true,
            conditionable: true,
        });
        self
    }

    /// Program counter register; its direct variable is writable but can't be a condition source
    pub fn program_counter(mut self, id: &str, ty: WordType, address: Option<u8>) -> Self {
        self.registers.push(Register { id: id.to_owned(), ty });
        self.variables.push(VariableDecl {
            id: id.to_owned(),
            register: id.to_owned(),
            kind: VariableKind::Direct,
            address,
            readable: true,
            writable: true,
            conditionable: false,
        });
        self.pc = Some(id.to_owned());
        self
    }

    /// Narrower view onto `index`-th slice of the register
    pub fn part(
        mut self,
        id: &str,
        register: &str,
        ty: WordType,
        index: u8,
        address: Option<u8>,
    ) -> Self {
        self.variables.push(VariableDecl {
            id: id.to_owned(),
            register: register.to_owned(),
            kind: VariableKind::Part { ty, index },
            address,
            readable: true,
            writable: true,
            conditionable: true,
        });
        self
    }

    /// Restricts the most recently declared variable
    pub fn access(mut self, readable: bool, writable: bool, conditionable: bool) -> Self {
        if let Some(var) = self.variables.last_mut() {
            var.readable = readable;
            var.writable = writable;
            var.conditionable = conditionable;
        }
        self
    }

    pub fn build(self) -> Result<RegisterFile, RegisterFileError> {
        let mut register_ids = BTreeMap::new();
        for (no, reg) in self.registers.iter().enumerate() {
            if register_ids.insert(reg.id.clone(), RegIdx(no as u16)).is_some() {
                return Err(RegisterFileError::RepeatedRegister(reg.id.clone()));
            }
        }

        let mut variables = Vec::with_capacity(self.variables.len());
        let mut variable_ids = BTreeMap::new();
        let mut addresses = BTreeMap::<u8, VarIdx>::new();
        for decl in self.variables {
            let register = *register_ids.get(&decl.register).ok_or_else(|| {
                RegisterFileError::UnknownRegister {
                    variable: decl.id.clone(),
                    register: decl.register.clone(),
                }
            })?;
            if let VariableKind::Part { ty, index } = decl.kind {
                let backing = self.registers[register.index()].ty;
                if ty.bits() * index as u32 >= backing.bits() || ty.bits() >= backing.bits() {
                    return Err(RegisterFileError::PartOutOfRange {
                        variable: decl.id,
                        register: decl.register,
                        ty,
                        index,
                    });
                }
            }
            let idx = VarIdx(variables.len() as u16);
            if variable_ids.insert(decl.id.clone(), idx).is_some() {
                return Err(RegisterFileError::RepeatedVariable(decl.id));
            }
            if let Some(address) = decl.address {
                if let Some(prev) = addresses.insert(address, idx) {
                    let first: &RegisterVariable = &variables[prev.index()];
                    return Err(RegisterFileError::RepeatedAddress {
                        address,
                        first: first.id.clone(),
                        second: decl.id,
                    });
                }
            }
            variables.push(RegisterVariable {
                id: decl.id,
                register,
                kind: decl.kind,
                address: decl.address,
                readable: decl.readable,
                writable: decl.writable,
                conditionable: decl.conditionable,
            });
        }

        let pc_id = self.pc.ok_or(RegisterFileError::NoProgramCounter)?;
        let pc = register_ids[&pc_id];
        let pc_variable = variable_ids[&pc_id];

        Ok(RegisterFile {
            registers: self.registers,
            variables,
            register_ids,
            variable_ids,
            addresses,
            pc,
            pc_variable,
        })
    }
}
