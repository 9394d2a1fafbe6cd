// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Single instruction cycle: fetch, decode, condition, execute, increment and store

use super::io::Io;
use super::patch::{PatchBuilder, StepReason};
use crate::arch::MappingTarget;
use crate::model::instr::{Input, Instruction, Operation};
use crate::model::word::WordType;
use crate::program::Program;

/// Runs the instruction the program counter points at, recording all its effects in the builder.
/// A program counter outside the program executes a halting break.
pub fn execute(program: &Program, builder: &mut PatchBuilder, io: &mut impl Io) -> StepReason {
    let arch = builder.arch();
    let registers = arch.registers();
    let pc_var = registers.pc_variable();

    // fetch
    let pc = builder.read_variable(pc_var);
    let instruction = program.get(pc).copied().unwrap_or_else(Instruction::halt);

    // decode
    let a = operand(builder, instruction.a);
    let b = operand(builder, instruction.b);
    let condition_met = match instruction.condition_source {
        Some(source) => instruction
            .condition
            .evaluate(builder.read_variable(source), registers.variable_type(source)),
        None => instruction.condition.evaluate(0, arch.data_type()),
    };

    // execute
    let ty = instruction.output.map_or(arch.data_type(), |var| registers.variable_type(var));
    let mut cycle = Cycle { program, builder: &mut *builder, pc, ty, hit_break: false };
    let value = if condition_met { cycle.compute(instruction.operation, a, b, io) } else { None };
    let hit_break = cycle.hit_break;

    // increment
    let jumps = match (value, instruction.output) {
        (Some(_), Some(output)) => registers.targets_pc(output),
        _ => false,
    };
    if !jumps {
        builder.write_variable(pc_var, pc.wrapping_add(1));
    }

    // store
    if let (Some(value), Some(output)) = (value, instruction.output) {
        builder.write_variable(output, value);
    }

    trace!(
        "{:04}: {} ({})",
        pc,
        instruction.display(registers),
        if condition_met { "executed" } else { "skipped" }
    );
    StepReason { pc, instruction, condition_met, hit_break }
}

fn operand(builder: &PatchBuilder, input: Input) -> u64 {
    match input {
        Input::Immediate(value) => value,
        Input::Register(var) => builder.read_variable(var),
    }
}

struct Cycle<'p, 'b, 'a> {
    program: &'p Program,
    builder: &'b mut PatchBuilder<'a>,
    pc: u64,
    /// Output word type: arithmetic wraps and carries at its width
    ty: WordType,
    hit_break: bool,
}

impl<'p, 'b, 'a> Cycle<'p, 'b, 'a> {
    fn compute(&mut self, operation: Operation, a: u64, b: u64, io: &mut impl Io) -> Option<u64> {
        let ty = self.ty;
        let data = self.builder.arch().data_type();
        let (a_w, b_w) = (ty.truncate(a) as u128, ty.truncate(b) as u128);
        let carry_in = self.builder.carry() as u128;

        let value = match operation {
            Operation::Nop => return None,
            Operation::Load => a,
            Operation::Load2 => join(data, a, b),

            Operation::Add => self.carrying(a_w + b_w),
            Operation::AddWithCarry => self.carrying(a_w + b_w + carry_in),
            Operation::Increment => self.carrying(a_w + 1),
            Operation::Subtract => self.borrowing(a_w, b_w),
            Operation::SubtractWithCarry => self.borrowing(a_w, b_w + carry_in),
            Operation::Decrement => self.borrowing(a_w, 1),

            Operation::Multiply => ty.truncate_wide(a_w * b_w),
            Operation::Divide if b_w == 0 => 0,
            Operation::Divide => (a_w / b_w) as u64,
            Operation::Modulo if b_w == 0 => a_w as u64,
            Operation::Modulo => (a_w % b_w) as u64,

            Operation::And => a & b,
            Operation::Or => a | b,
            Operation::Xor => a ^ b,
            Operation::Nand => !(a & b),
            Operation::Nor => !(a | b),
            Operation::Xnor => !(a ^ b),

            Operation::ShiftLeft => self.shift_left(a_w, b),
            Operation::ShiftRight => self.shift_right(a_w, b),
            Operation::RotateLeft => self.rotate(a_w as u64, b, true),
            Operation::RotateRight => self.rotate(a_w as u64, b, false),

            Operation::MemoryLoad => {
                let address = self.address(a, b);
                self.load(address)
            }
            Operation::MemoryStore => {
                let address = self.address(a, 0);
                self.store(address, b);
                return None;
            }

            Operation::StackPush => {
                self.builder.push(a);
                return None;
            }
            Operation::StackPop => self.builder.pop(),
            Operation::StackPeek => self.builder.peek(),

            Operation::Call => {
                self.builder.push(self.pc.wrapping_add(1));
                a
            }
            Operation::Call2 => {
                self.builder.push(self.pc.wrapping_add(1));
                join(data, a, b)
            }
            Operation::Return => self.builder.pop(),

            Operation::Break => {
                self.hit_break = true;
                return None;
            }

            Operation::IoRead => io.provide_input(),
            Operation::IoWrite => {
                io.handle_output(a);
                return None;
            }
            Operation::IoPoll => io.input_available() as u64,
        };
        Some(ty.truncate(value))
    }

    /// Sets carry when the accumulator exceeds the output width
    fn carrying(&mut self, acc: u128) -> u64 {
        self.builder.set_carry(acc > self.ty.mask() as u128);
        self.ty.truncate_wide(acc)
    }

    /// Sets carry on borrow
    fn borrowing(&mut self, minuend: u128, subtrahend: u128) -> u64 {
        self.builder.set_carry(subtrahend > minuend);
        self.ty.truncate_wide(minuend.wrapping_sub(subtrahend))
    }

    /// Carry receives the last bit shifted out of the output width
    fn shift_left(&mut self, value: u128, shift: u64) -> u64 {
        let bits = self.ty.bits() as u64;
        let shifted = if shift > bits { 0 } else { value << shift };
        self.builder.set_carry(shift > 0 && (shifted >> bits) & 1 != 0);
        self.ty.truncate_wide(shifted)
    }

    fn shift_right(&mut self, value: u128, shift: u64) -> u64 {
        let bits = self.ty.bits() as u64;
        let carry = shift > 0 && shift <= bits && (value >> (shift - 1)) & 1 != 0;
        self.builder.set_carry(carry);
        if shift >= bits {
            0
        } else {
            (value >> shift) as u64
        }
    }

    /// Rotates through carry: the output bits plus carry form a ring one bit wider than the output
    fn rotate(&mut self, mut value: u64, count: u64, left: bool) -> u64 {
        let bits = self.ty.bits();
        let mut carry = self.builder.carry();
        for _ in 0..count % (bits as u64 + 1) {
            if left {
                let out = (value >> (bits - 1)) & 1 != 0;
                value = self.ty.truncate((value << 1) | carry as u64);
                carry = out;
            } else {
                let out = value & 1 != 0;
                value = (value >> 1) | ((carry as u64) << (bits - 1));
                carry = out;
            }
        }
        self.builder.set_carry(carry);
        value
    }

    /// Effective addresses saturate at the largest address instead of wrapping around
    fn address(&self, base: u64, offset: u64) -> u64 {
        let max = self.builder.arch().address_type().mask();
        base.saturating_add(offset).min(max)
    }

    /// Program windows expose the values of `DATA` entries; executable entries read as zero
    fn load(&self, address: u64) -> u64 {
        let arch = self.builder.arch();
        match arch.memory_map().resolve(address, arch.memory_size()) {
            MappingTarget::Memory { offset } => self.builder.memory(offset),
            MappingTarget::Program { offset } => self
                .program
                .get(offset as u64)
                .and_then(Instruction::constant_value)
                .unwrap_or_default(),
        }
    }

    fn store(&mut self, address: u64, value: u64) {
        let arch = self.builder.arch();
        match arch.memory_map().resolve(address, arch.memory_size()) {
            MappingTarget::Memory { offset } => self.builder.set_memory(offset, value),
            MappingTarget::Program { .. } => {
                debug!("Ignoring write of {} into program space at {:#x}", value, address)
            }
        }
    }
}

/// Joins low and high data words of a two-word operand
fn join(data: WordType, low: u64, high: u64) -> u64 {
    data.truncate(low) | data.truncate(high).checked_shl(data.bits()).unwrap_or_default()
}
