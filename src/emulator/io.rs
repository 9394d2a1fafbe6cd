// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

use std::collections::VecDeque;

/// External I/O boundary of the emulated machine used by `IO_READ`, `IO_WRITE` and `IO_POLL`
pub trait Io: Send {
    fn input_available(&mut self) -> bool;

    /// Next input value; called by `IO_READ` regardless of availability
    fn provide_input(&mut self) -> u64;

    fn handle_output(&mut self, value: u64);
}

/// Machine with nothing attached: no input, output is discarded
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct NullIo;

impl Io for NullIo {
    #[inline]
    fn input_available(&mut self) -> bool { false }

    #[inline]
    fn provide_input(&mut self) -> u64 { 0 }

    #[inline]
    fn handle_output(&mut self, _value: u64) {}
}

/// Deterministic stub feeding queued input values and recording every output value
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct QueueIo {
    input: VecDeque<u64>,
    output: Vec<u64>,
}

impl QueueIo {
    pub fn new(input: impl IntoIterator<Item = u64>) -> Self {
        QueueIo { input: input.into_iter().collect(), output: vec![] }
    }

    pub fn feed(&mut self, value: u64) { self.input.push_back(value) }

    #[inline]
    pub fn output(&self) -> &[u64] { &self.output }

    #[inline]
    pub fn pending_input(&self) -> usize { self.input.len() }
}

impl Io for QueueIo {
    fn input_available(&mut self) -> bool { !self.input.is_empty() }

    /// Reads zero once the queue is drained
    fn provide_input(&mut self) -> u64 { self.input.pop_front().unwrap_or_default() }

    fn handle_output(&mut self, value: u64) { self.output.push(value) }
}
