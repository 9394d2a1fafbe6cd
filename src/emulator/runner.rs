// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Emulator hosted on a dedicated execution thread. Control requests are queued and drained by
//! the execution loop between instructions, which stays the only owner of the machine state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use super::{Emulator, Io, Patch, PatchBuilder, RunOutcome, Snapshot};
use crate::program::Program;

type Modification = Box<dyn FnOnce(&mut PatchBuilder) + Send>;

enum Request {
    Load(Program),
    RunSteps(u64, u64),
    RunUntilBreak(u64),
    Reset,
    Snapshot,
    Modify(Modification),
    StepBackwards,
    StepForwards,
    Shutdown,
}

enum Response {
    Done,
    Ran(RunOutcome),
    Snapshot(Box<Snapshot>),
    Modified(Patch),
    Stepped(Option<Patch>),
}

struct Command {
    request: Request,
    reply: mpsc::Sender<Response>,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum RunnerError {
    /// emulator execution thread has terminated
    Disconnected,
}

/// Run requests are numbered in the order they are issued. A stop cancels every run issued
/// before it, including runs still waiting in the queue, and none of the later ones.
#[derive(Debug, Default)]
struct RunTickets {
    issued: AtomicU64,
    stopped: AtomicU64,
}

impl RunTickets {
    fn issue(&self) -> u64 { self.issued.fetch_add(1, Ordering::SeqCst) + 1 }

    fn stop(&self) {
        let issued = self.issued.load(Ordering::SeqCst);
        self.stopped.fetch_max(issued, Ordering::SeqCst);
    }

    fn is_stopped(&self, ticket: u64) -> bool { self.stopped.load(Ordering::SeqCst) >= ticket }
}

/// Stops runs of an emulator from any thread
#[derive(Clone, Debug)]
pub struct Stopper(Arc<RunTickets>);

impl Stopper {
    /// Stops the current run before the next instruction is fetched, together with the runs
    /// already requested but not yet started
    pub fn stop(&self) { self.0.stop() }
}

pub struct EmulatorHandle {
    commands: mpsc::Sender<Command>,
    tickets: Arc<RunTickets>,
    thread: Option<JoinHandle<()>>,
}

impl EmulatorHandle {
    /// Moves the emulator onto its own execution thread
    pub fn spawn<I: Io + 'static>(emulator: Emulator<I>) -> Self {
        let (commands, queue) = mpsc::channel::<Command>();
        let tickets = Arc::new(RunTickets::default());
        let shared = tickets.clone();
        let thread = thread::spawn(move || serve(emulator, queue, shared));
        EmulatorHandle { commands, tickets, thread: Some(thread) }
    }

    pub fn stopper(&self) -> Stopper { Stopper(self.tickets.clone()) }

    fn call(&self, request: Request) -> Result<Response, RunnerError> {
        let (reply, response) = mpsc::channel();
        self.commands.send(Command { request, reply }).map_err(|_| RunnerError::Disconnected)?;
        response.recv().map_err(|_| RunnerError::Disconnected)
    }

    pub fn load(&self, program: Program) -> Result<(), RunnerError> {
        self.call(Request::Load(program)).map(|_| ())
    }

    pub fn reset(&self) -> Result<(), RunnerError> { self.call(Request::Reset).map(|_| ()) }

    pub fn run_steps(&self, count: u64) -> Result<RunOutcome, RunnerError> {
        match self.call(Request::RunSteps(count, self.tickets.issue()))? {
            Response::Ran(outcome) => Ok(outcome),
            _ => unreachable!("run request answered with a different response"),
        }
    }

    pub fn run_until_break(&self) -> Result<RunOutcome, RunnerError> {
        match self.call(Request::RunUntilBreak(self.tickets.issue()))? {
            Response::Ran(outcome) => Ok(outcome),
            _ => unreachable!("run request answered with a different response"),
        }
    }

    pub fn snapshot(&self) -> Result<Snapshot, RunnerError> {
        match self.call(Request::Snapshot)? {
            Response::Snapshot(snapshot) => Ok(*snapshot),
            _ => unreachable!("snapshot request answered with a different response"),
        }
    }

    /// Applies the modification on the execution thread, returning the recorded patch
    pub fn modify(
        &self,
        modify: impl FnOnce(&mut PatchBuilder) + Send + 'static,
    ) -> Result<Patch, RunnerError> {
        match self.call(Request::Modify(Box::new(modify)))? {
            Response::Modified(patch) => Ok(patch),
            _ => unreachable!("modify request answered with a different response"),
        }
    }

    pub fn step_backwards(&self) -> Result<Option<Patch>, RunnerError> {
        match self.call(Request::StepBackwards)? {
            Response::Stepped(patch) => Ok(patch),
            _ => unreachable!("step request answered with a different response"),
        }
    }

    pub fn step_forwards(&self) -> Result<Option<Patch>, RunnerError> {
        match self.call(Request::StepForwards)? {
            Response::Stepped(patch) => Ok(patch),
            _ => unreachable!("step request answered with a different response"),
        }
    }
}

impl Drop for EmulatorHandle {
    fn drop(&mut self) {
        self.tickets.stop();
        let (reply, _) = mpsc::channel();
        let _ = self.commands.send(Command { request: Request::Shutdown, reply });
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Emulator execution thread panicked");
            }
        }
    }
}

fn serve<I: Io>(
    mut emulator: Emulator<I>,
    queue: mpsc::Receiver<Command>,
    tickets: Arc<RunTickets>,
) {
    debug!("Emulator thread started for {}", emulator.arch().id());
    for Command { request, reply } in queue {
        let response = match request {
            Request::Load(program) => {
                emulator.load_program(program);
                Response::Done
            }
            Request::RunSteps(count, ticket) => {
                Response::Ran(emulator.run_while(Some(count), || !tickets.is_stopped(ticket)))
            }
            Request::RunUntilBreak(ticket) => {
                Response::Ran(emulator.run_while(None, || !tickets.is_stopped(ticket)))
            }
            Request::Reset => {
                emulator.reset();
                Response::Done
            }
            Request::Snapshot => Response::Snapshot(Box::new(emulator.snapshot())),
            Request::Modify(modify) => Response::Modified(emulator.modify_state(modify).clone()),
            Request::StepBackwards => Response::Stepped(emulator.step_backwards().cloned()),
            Request::StepForwards => Response::Stepped(emulator.step_forwards().cloned()),
            Request::Shutdown => break,
        };
        // the requester may have given up waiting
        let _ = reply.send(response);
    }
    debug!("Emulator thread finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::emulator::StopReason;
    use crate::model::instr::{Input, Instruction, Operation};

    #[test]
    fn requests_are_served_in_order() {
        let arch = arch::by_id("rx8").unwrap();
        let r1 = arch.registers().find_variable("R1").unwrap();
        let handle = EmulatorHandle::spawn(Emulator::new(arch));
        handle
            .load(Program::new(vec![
                Instruction::new(Operation::Load)
                    .with_output(r1)
                    .with_inputs(Input::Immediate(3), Input::default()),
                Instruction::halt(),
            ]))
            .unwrap();

        let outcome = handle.run_until_break().unwrap();
        assert_eq!(outcome, RunOutcome { steps: 2, reason: StopReason::Break });
        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.pc, 2);
        assert_eq!(snapshot.history, 2);

        let patch = handle.modify(move |builder| builder.write_variable(r1, 9)).unwrap();
        assert!(patch.reason.is_none());
        assert!(handle.step_backwards().unwrap().is_some());
        assert!(handle.step_backwards().unwrap().is_some());
        assert_eq!(handle.snapshot().unwrap().pc, 1);
        assert!(handle.step_forwards().unwrap().is_some());

        handle.reset().unwrap();
        assert_eq!(handle.run_steps(1).unwrap().steps, 1);
    }

    #[test]
    fn stopped_run_is_cleared_by_next_run() {
        let handle = EmulatorHandle::spawn(Emulator::new(arch::by_id("rx16").unwrap()));
        handle.load(Program::new(vec![Instruction::new(Operation::Nop); 4])).unwrap();
        handle.stopper().stop();
        let outcome = handle.run_steps(3).unwrap();
        assert_eq!(outcome, RunOutcome { steps: 3, reason: StopReason::Limit });
    }

    #[test]
    fn stop_cancels_queued_run() {
        let arch = arch::by_id("rx8").unwrap();
        let pc = arch.registers().pc_variable();
        let handle = EmulatorHandle::spawn(Emulator::new(arch));
        let endless = Instruction::new(Operation::Load)
            .with_output(pc)
            .with_inputs(Input::Immediate(0), Input::default());
        handle.load(Program::new(vec![endless])).unwrap();
        let stopper = handle.stopper();

        let (busy, started) = mpsc::channel();
        let (release, released) = mpsc::channel::<()>();
        thread::scope(|scope| {
            let handle = &handle;
            // keeps the execution thread occupied while the run request waits in the queue
            scope.spawn(move || {
                handle
                    .modify(move |_| {
                        busy.send(()).unwrap();
                        released.recv().unwrap();
                    })
                    .unwrap();
            });
            started.recv().unwrap();

            let run = scope.spawn(move || handle.run_until_break().unwrap());
            while handle.tickets.issued.load(Ordering::SeqCst) == 0 {
                thread::yield_now();
            }
            stopper.stop();
            release.send(()).unwrap();
            assert_eq!(run.join().unwrap(), RunOutcome { steps: 0, reason: StopReason::Stopped });
        });

        let outcome = handle.run_steps(5).unwrap();
        assert_eq!(outcome, RunOutcome { steps: 5, reason: StopReason::Limit });
    }

    #[test]
    fn stop_ends_running_loop() {
        let arch = arch::by_id("rx8").unwrap();
        let pc = arch.registers().pc_variable();
        let handle = EmulatorHandle::spawn(Emulator::new(arch));
        let endless = Instruction::new(Operation::Load)
            .with_output(pc)
            .with_inputs(Input::Immediate(0), Input::default());
        handle.load(Program::new(vec![endless])).unwrap();
        let stopper = handle.stopper();

        thread::scope(|scope| {
            let handle = &handle;
            let run = scope.spawn(move || handle.run_until_break().unwrap());
            while handle.tickets.issued.load(Ordering::SeqCst) == 0 {
                thread::yield_now();
            }
            stopper.stop();
            assert_eq!(run.join().unwrap().reason, StopReason::Stopped);
        });
    }
}
