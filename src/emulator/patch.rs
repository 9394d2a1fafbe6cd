// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Reversible state patches and the linear undo history

use std::collections::BTreeMap;

use super::state::{ArchState, StackPointer};
use crate::arch::{Architecture, RegIdx, VarIdx};
use crate::model::instr::Instruction;

/// Single typed state change carrying both the previous and the new value
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Change {
    Register { register: RegIdx, previous: u64, new: u64 },
    Memory { cell: usize, previous: u64, new: u64 },
    StackCell { cell: usize, previous: u64, new: u64 },
    StackPointer { previous: StackPointer, new: StackPointer },
    Carry { previous: bool, new: bool },
}

impl Change {
    pub fn apply(&self, state: &mut ArchState) {
        match *self {
            Change::Register { register, new, .. } => state.registers[register.index()] = new,
            Change::Memory { cell, new, .. } => state.memory[cell] = new,
            Change::StackCell { cell, new, .. } => state.stack.set_cell(cell, new),
            Change::StackPointer { new, .. } => state.stack.set_pointer(new),
            Change::Carry { new, .. } => state.carry = new,
        }
    }

    pub fn revert(&self, state: &mut ArchState) {
        match *self {
            Change::Register { register, previous, .. } => {
                state.registers[register.index()] = previous
            }
            Change::Memory { cell, previous, .. } => state.memory[cell] = previous,
            Change::StackCell { cell, previous, .. } => state.stack.set_cell(cell, previous),
            Change::StackPointer { previous, .. } => state.stack.set_pointer(previous),
            Change::Carry { previous, .. } => state.carry = previous,
        }
    }
}

/// Why a patch was produced by instruction execution
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct StepReason {
    /// Program counter the instruction was fetched from
    pub pc: u64,
    pub instruction: Instruction,
    pub condition_met: bool,
    pub hit_break: bool,
}

/// Ordered list of changes forming one undo step
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Patch {
    pub changes: Vec<Change>,
    /// Present for patches produced by instruction execution; absent for external modifications
    pub reason: Option<StepReason>,
}

impl Patch {
    pub fn apply(&self, state: &mut ArchState) {
        for change in &self.changes {
            change.apply(state);
        }
    }

    pub fn revert(&self, state: &mut ArchState) {
        for change in self.changes.iter().rev() {
            change.revert(state);
        }
    }

    #[inline]
    pub fn hit_break(&self) -> bool { self.reason.map(|reason| reason.hit_break).unwrap_or(false) }
}

/// Collects changes against a base state. Reads see the pending changes on top of the base, so
/// an instruction observes its own intermediate writes before the patch is committed.
pub struct PatchBuilder<'a> {
    arch: &'a Architecture,
    base: &'a ArchState,
    registers: BTreeMap<RegIdx, u64>,
    memory: BTreeMap<usize, u64>,
    stack_cells: BTreeMap<usize, u64>,
    stack_pointer: Option<StackPointer>,
    carry: Option<bool>,
    changes: Vec<Change>,
}

impl<'a> PatchBuilder<'a> {
    pub fn new(arch: &'a Architecture, base: &'a ArchState) -> Self {
        PatchBuilder {
            arch,
            base,
            registers: empty!(),
            memory: empty!(),
            stack_cells: empty!(),
            stack_pointer: None,
            carry: None,
            changes: vec![],
        }
    }

    #[inline]
    pub fn arch(&self) -> &'a Architecture { self.arch }

    pub fn register(&self, reg: RegIdx) -> u64 {
        self.registers.get(&reg).copied().unwrap_or_else(|| self.base.register(reg))
    }

    pub fn set_register(&mut self, reg: RegIdx, value: u64) {
        let value = self.arch.registers().register(reg).ty.truncate(value);
        let previous = self.register(reg);
        self.registers.insert(reg, value);
        self.changes.push(Change::Register { register: reg, previous, new: value });
    }

    pub fn read_variable(&self, var: VarIdx) -> u64 {
        let registers = self.arch.registers();
        let variable = registers.variable(var);
        let ty = registers.register(variable.register).ty;
        variable.read(ty, self.register(variable.register))
    }

    /// Writes the variable, keeping the bits of the backing register outside a part untouched
    pub fn write_variable(&mut self, var: VarIdx, value: u64) {
        let registers = self.arch.registers();
        let variable = registers.variable(var);
        let ty = registers.register(variable.register).ty;
        let full = variable.write(ty, self.register(variable.register), value);
        self.set_register(variable.register, full);
    }

    pub fn find_variable(&self, id: &str) -> Option<VarIdx> {
        self.arch.registers().find_variable(id)
    }

    pub fn memory(&self, cell: usize) -> u64 {
        self.memory.get(&cell).copied().unwrap_or_else(|| self.base.memory[cell])
    }

    pub fn set_memory(&mut self, cell: usize, value: u64) {
        let cell = cell.min(self.arch.memory_size() - 1);
        let value = self.arch.data_type().truncate(value);
        let previous = self.memory(cell);
        self.memory.insert(cell, value);
        self.changes.push(Change::Memory { cell, previous, new: value });
    }

    pub fn carry(&self) -> bool { self.carry.unwrap_or(self.base.carry) }

    pub fn set_carry(&mut self, carry: bool) {
        let previous = self.carry();
        self.carry = Some(carry);
        self.changes.push(Change::Carry { previous, new: carry });
    }

    fn stack_pointer(&self) -> StackPointer {
        self.stack_pointer.unwrap_or_else(|| self.base.stack.pointer())
    }

    fn stack_cell(&self, cell: usize) -> u64 {
        self.stack_cells.get(&cell).copied().unwrap_or_else(|| self.base.stack.cell(cell))
    }

    fn move_stack_pointer(&mut self, new: StackPointer) {
        let previous = self.stack_pointer();
        self.stack_pointer = Some(new);
        self.changes.push(Change::StackPointer { previous, new });
    }

    pub fn push(&mut self, value: u64) {
        let capacity = self.base.stack.capacity();
        let pointer = self.stack_pointer();
        let value = self.arch.stack_type().truncate(value);
        let previous = self.stack_cell(pointer.pointer);
        self.stack_cells.insert(pointer.pointer, value);
        self.changes.push(Change::StackCell { cell: pointer.pointer, previous, new: value });
        self.move_stack_pointer(pointer.pushed(capacity));
    }

    pub fn pop(&mut self) -> u64 {
        let capacity = self.base.stack.capacity();
        let pointer = self.stack_pointer();
        let value = self.stack_cell(pointer.top(capacity));
        self.move_stack_pointer(pointer.popped(capacity));
        value
    }

    pub fn peek(&self) -> u64 {
        let capacity = self.base.stack.capacity();
        self.stack_cell(self.stack_pointer().top(capacity))
    }

    #[inline]
    pub fn is_empty(&self) -> bool { self.changes.is_empty() }

    pub fn finish(self, reason: Option<StepReason>) -> Patch {
        Patch { changes: self.changes, reason }
    }
}

/// Linear undo history: committed patches plus a cursor separating the past from the undone
/// future
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct History {
    patches: Vec<Patch>,
    cursor: usize,
}

impl History {
    /// Records a newly applied patch, discarding the undone future
    pub fn push(&mut self, patch: Patch) -> &Patch {
        self.patches.truncate(self.cursor);
        self.patches.push(patch);
        self.cursor = self.patches.len();
        &self.patches[self.cursor - 1]
    }

    /// Patch to revert for a single step backwards
    pub fn undo(&mut self) -> Option<&Patch> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.patches.get(self.cursor)
    }

    /// Patch to re-apply for a single step forwards
    pub fn redo(&mut self) -> Option<&Patch> {
        let patch = self.patches.get(self.cursor)?;
        self.cursor += 1;
        Some(patch)
    }

    #[inline]
    pub fn cursor(&self) -> usize { self.cursor }

    #[inline]
    pub fn len(&self) -> usize { self.patches.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.patches.is_empty() }

    #[inline]
    pub fn last(&self) -> Option<&Patch> { self.cursor.checked_sub(1).map(|i| &self.patches[i]) }

    pub fn clear(&mut self) {
        self.patches.clear();
        self.cursor = 0;
    }
}
