// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Architecture state: carry flag, registers, memory and the circular stack

use crate::arch::{Architecture, RegIdx, RegisterFile, VarIdx};

/// Fixed-capacity circular stack. Pushing beyond the capacity overwrites the oldest cells; popping
/// an empty stack reads whatever the cell below the pointer holds.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Stack {
    cells: Vec<u64>,
    pointer: usize,
    depth: usize,
}

/// Stack pointer together with the number of occupied cells
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct StackPointer {
    pub pointer: usize,
    pub depth: usize,
}

impl Stack {
    pub fn with_capacity(capacity: usize) -> Self {
        Stack { cells: vec![0; capacity], pointer: 0, depth: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize { self.cells.len() }

    #[inline]
    pub fn cells(&self) -> &[u64] { &self.cells }

    #[inline]
    pub fn depth(&self) -> usize { self.depth }

    #[inline]
    pub fn pointer(&self) -> StackPointer {
        StackPointer { pointer: self.pointer, depth: self.depth }
    }

    pub fn cell(&self, index: usize) -> u64 { self.cells[index % self.capacity()] }

    pub(super) fn set_cell(&mut self, index: usize, value: u64) {
        let capacity = self.capacity();
        self.cells[index % capacity] = value;
    }

    pub(super) fn set_pointer(&mut self, pointer: StackPointer) {
        self.pointer = pointer.pointer;
        self.depth = pointer.depth;
    }

    /// Values from the top of the stack downwards
    pub fn values(&self) -> Vec<u64> {
        (1..=self.depth).map(|n| self.cell(self.pointer + self.capacity() - n)).collect()
    }
}

impl StackPointer {
    /// Pointer position after pushing onto a stack of the given capacity
    pub fn pushed(self, capacity: usize) -> StackPointer {
        StackPointer {
            pointer: (self.pointer + 1) % capacity,
            depth: (self.depth + 1).min(capacity),
        }
    }

    /// Pointer position after popping from a stack of the given capacity
    pub fn popped(self, capacity: usize) -> StackPointer {
        StackPointer {
            pointer: (self.pointer + capacity - 1) % capacity,
            depth: self.depth.saturating_sub(1),
        }
    }

    /// Cell holding the topmost value
    #[inline]
    pub fn top(self, capacity: usize) -> usize { (self.pointer + capacity - 1) % capacity }
}

/// Complete mutable state of an emulated architecture. Register values are kept at the full
/// register width; variables are views computed on access.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ArchState {
    pub carry: bool,
    pub registers: Vec<u64>,
    pub memory: Vec<u64>,
    pub stack: Stack,
}

impl ArchState {
    /// Zeroed state sized for the architecture
    pub fn new(arch: &Architecture) -> Self {
        ArchState {
            carry: false,
            registers: vec![0; arch.registers().registers().len()],
            memory: vec![0; arch.memory_size()],
            stack: Stack::with_capacity(arch.stack_size()),
        }
    }

    #[inline]
    pub fn register(&self, reg: RegIdx) -> u64 { self.registers[reg.index()] }

    /// Value visible through the register variable
    pub fn variable(&self, registers: &RegisterFile, var: VarIdx) -> u64 {
        let variable = registers.variable(var);
        let ty = registers.register(variable.register).ty;
        variable.read(ty, self.register(variable.register))
    }

    pub fn pc(&self, registers: &RegisterFile) -> u64 {
        self.variable(registers, registers.pc_variable())
    }
}
