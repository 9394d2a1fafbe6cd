// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Reversible emulator. Every executed instruction and every external state modification is
//! recorded as a [`Patch`], so execution can be stepped backwards and forwards.

mod exec;
mod io;
mod patch;
mod runner;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use io::{Io, NullIo, QueueIo};
pub use patch::{Change, History, Patch, PatchBuilder, StepReason};
pub use runner::{EmulatorHandle, RunnerError, Stopper};
pub use state::{ArchState, Stack, StackPointer};

use crate::arch::{Architecture, VarIdx};
use crate::program::Program;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum Status {
    #[display("idle")]
    Idle,
    #[display("executing")]
    Executing,
    #[display("halted")]
    Halted,
}

impl Default for Status {
    fn default() -> Self { Status::Idle }
}

/// Why a run of several instructions ended
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum StopReason {
    #[display("break")]
    Break,
    #[display("step limit")]
    Limit,
    #[display("stop request")]
    Stopped,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RunOutcome {
    pub steps: u64,
    pub reason: StopReason,
}

/// Copy of the emulator state taken for display
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Snapshot {
    pub state: ArchState,
    pub status: Status,
    pub pc: u64,
    pub history: usize,
    pub cursor: usize,
}

pub struct Emulator<I: Io = NullIo> {
    arch: Arc<Architecture>,
    program: Program,
    state: ArchState,
    history: History,
    status: Status,
    io: I,
}

impl Emulator<NullIo> {
    pub fn new(arch: Arc<Architecture>) -> Self { Emulator::with_io(arch, NullIo) }
}

impl<I: Io> Emulator<I> {
    pub fn with_io(arch: Arc<Architecture>, io: I) -> Self {
        let state = ArchState::new(&arch);
        Emulator {
            arch,
            program: Program::default(),
            state,
            history: History::default(),
            status: Status::Idle,
            io,
        }
    }

    #[inline]
    pub fn arch(&self) -> &Architecture { &self.arch }

    #[inline]
    pub fn program(&self) -> &Program { &self.program }

    #[inline]
    pub fn state(&self) -> &ArchState { &self.state }

    #[inline]
    pub fn status(&self) -> Status { self.status }

    #[inline]
    pub fn history(&self) -> &History { &self.history }

    #[inline]
    pub fn io(&self) -> &I { &self.io }

    #[inline]
    pub fn io_mut(&mut self) -> &mut I { &mut self.io }

    pub fn pc(&self) -> u64 { self.state.pc(self.arch.registers()) }

    pub fn variable(&self, var: VarIdx) -> u64 { self.state.variable(self.arch.registers(), var) }

    /// Value of the register variable with the given name
    pub fn read(&self, name: &str) -> Option<u64> {
        self.arch.registers().find_variable(name).map(|var| self.variable(var))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            status: self.status,
            pc: self.pc(),
            history: self.history.len(),
            cursor: self.history.cursor(),
        }
    }

    /// Replaces the program and resets the machine
    pub fn load_program(&mut self, program: Program) {
        debug!("Loading program of {} instructions into {}", program.len(), self.arch.id());
        self.program = program;
        self.reset();
    }

    /// Clears all the storage and the history
    pub fn reset(&mut self) {
        self.state = ArchState::new(&self.arch);
        self.history.clear();
        self.status = Status::Idle;
    }

    /// Executes the instruction at the program counter and commits its patch
    pub fn run_single_instruction(&mut self) -> &Patch {
        let mut builder = PatchBuilder::new(&self.arch, &self.state);
        let reason = exec::execute(&self.program, &mut builder, &mut self.io);
        let patch = builder.finish(Some(reason));
        patch.apply(&mut self.state);
        self.status = if reason.hit_break { Status::Halted } else { Status::Executing };
        self.history.push(patch)
    }

    /// Runs until a break, the step limit or a raised stop flag. The flag is checked on every
    /// instruction boundary.
    pub fn run(&mut self, limit: Option<u64>, stop: &AtomicBool) -> RunOutcome {
        self.run_while(limit, || !stop.load(Ordering::Relaxed))
    }

    /// Runs until a break, the step limit or `proceed` returning `false` before an instruction
    pub fn run_while(&mut self, limit: Option<u64>, proceed: impl Fn() -> bool) -> RunOutcome {
        let mut steps = 0u64;
        let reason = loop {
            if limit.map(|limit| steps >= limit).unwrap_or(false) {
                break StopReason::Limit;
            }
            if !proceed() {
                break StopReason::Stopped;
            }
            steps += 1;
            if self.run_single_instruction().hit_break() {
                break StopReason::Break;
            }
        };
        debug!("Run ended after {} steps on {}", steps, reason);
        RunOutcome { steps, reason }
    }

    pub fn run_until_break(&mut self) -> RunOutcome { self.run(None, &AtomicBool::new(false)) }

    /// Applies an external modification through the patch mechanism, so it can be undone
    pub fn modify_state(&mut self, modify: impl FnOnce(&mut PatchBuilder)) -> &Patch {
        let mut builder = PatchBuilder::new(&self.arch, &self.state);
        modify(&mut builder);
        let patch = builder.finish(None);
        patch.apply(&mut self.state);
        self.history.push(patch)
    }

    /// Reverts the latest committed patch. Returns `None` at the beginning of the history.
    pub fn step_backwards(&mut self) -> Option<&Patch> {
        let patch = self.history.undo()?;
        patch.revert(&mut self.state);
        Some(patch)
    }

    /// Re-applies the next undone patch. Returns `None` when there is nothing to redo.
    pub fn step_forwards(&mut self) -> Option<&Patch> {
        let patch = self.history.redo()?;
        patch.apply(&mut self.state);
        Some(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::model::instr::{Input, Instruction, Operation};

    fn emulator(instructions: Vec<Instruction>) -> Emulator {
        let mut emu = Emulator::new(arch::by_id("rx8").unwrap());
        emu.load_program(Program::new(instructions));
        emu
    }

    #[test]
    fn status_transitions() {
        let mut emu = emulator(vec![Instruction::new(Operation::Nop), Instruction::halt()]);
        assert_eq!(emu.status(), Status::Idle);
        emu.run_single_instruction();
        assert_eq!(emu.status(), Status::Executing);
        assert!(emu.run_single_instruction().hit_break());
        assert_eq!(emu.status(), Status::Halted);
        emu.reset();
        assert_eq!(emu.status(), Status::Idle);
        assert_eq!(emu.pc(), 0);
        assert!(emu.history().is_empty());
    }

    #[test]
    fn run_limits() {
        let arch = arch::by_id("rx8").unwrap();
        let r1 = arch.registers().find_variable("R1").unwrap();
        let pc = arch.registers().pc_variable();
        let mut emu = emulator(vec![
            Instruction::new(Operation::Increment)
                .with_output(r1)
                .with_inputs(Input::Register(r1), Input::default()),
            Instruction::new(Operation::Load)
                .with_output(pc)
                .with_inputs(Input::Immediate(0), Input::default()),
        ]);
        let outcome = emu.run(Some(10), &AtomicBool::new(false));
        assert_eq!(outcome, RunOutcome { steps: 10, reason: StopReason::Limit });
        assert_eq!(emu.read("R1"), Some(5));

        let outcome = emu.run(Some(10), &AtomicBool::new(true));
        assert_eq!(outcome, RunOutcome { steps: 0, reason: StopReason::Stopped });
    }

    #[test]
    fn external_modification_is_undoable() {
        let mut emu = emulator(vec![]);
        emu.modify_state(|builder| {
            let r3 = builder.find_variable("R3").unwrap();
            builder.write_variable(r3, 42);
            builder.set_memory(1000, 7);
        });
        assert_eq!(emu.read("R3"), Some(42));
        assert_eq!(emu.state().memory[191], 7);
        assert!(emu.step_backwards().is_some());
        assert_eq!(emu.read("R3"), Some(0));
        assert_eq!(emu.state().memory[191], 0);
        assert!(emu.step_backwards().is_none());
        assert!(emu.step_forwards().is_some());
        assert_eq!(emu.read("R3"), Some(42));
    }
}
