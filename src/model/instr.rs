// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Resolved instruction model shared by the assembler output, encoders and the emulator

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use paste::paste;

use crate::arch::{RegisterFile, VarIdx};
use crate::model::word::WordType;

macro_rules! operations {
    ($( $code:ident ),+ $(,)?) => {
        paste! {
            /// Operation performed by an instruction. Names follow the canonical upper-case
            /// notation used in program dumps.
            #[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
            pub enum Operation {
                $( [<$code:camel>] ),+
            }

            impl Operation {
                pub const ALL: &'static [Operation] = &[ $( Operation::[<$code:camel>] ),+ ];

                pub const fn name(self) -> &'static str {
                    match self {
                        $( Operation::[<$code:camel>] => stringify!($code) ),+
                    }
                }
            }
        }
    };
}

operations! {
    NOP,
    LOAD,
    LOAD_2,
    ADD,
    SUBTRACT,
    ADD_WITH_CARRY,
    SUBTRACT_WITH_CARRY,
    INCREMENT,
    DECREMENT,
    MULTIPLY,
    DIVIDE,
    MODULO,
    AND,
    OR,
    XOR,
    NAND,
    NOR,
    XNOR,
    SHIFT_LEFT,
    SHIFT_RIGHT,
    ROTATE_LEFT,
    ROTATE_RIGHT,
    MEMORY_LOAD,
    MEMORY_STORE,
    STACK_PUSH,
    STACK_POP,
    STACK_PEEK,
    CALL,
    CALL_2,
    RETURN,
    BREAK,
    IO_READ,
    IO_WRITE,
    IO_POLL,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL.iter().copied().find(|op| op.name() == s).ok_or(())
    }
}

impl Operation {
    /// Whether the operation produces a value which is stored into the output variable.
    pub fn has_output(self) -> bool {
        !matches!(
            self,
            Operation::Nop
                | Operation::MemoryStore
                | Operation::StackPush
                | Operation::Break
                | Operation::IoWrite
        )
    }

    /// Number of inputs the operation reads
    pub fn arity(self) -> u8 {
        match self {
            Operation::Nop
            | Operation::StackPop
            | Operation::StackPeek
            | Operation::Return
            | Operation::Break
            | Operation::IoRead
            | Operation::IoPoll => 0,
            Operation::Load
            | Operation::Increment
            | Operation::Decrement
            | Operation::StackPush
            | Operation::Call
            | Operation::IoWrite => 1,
            _ => 2,
        }
    }

    /// Two-word counterpart used when the output is wider than the data word
    pub fn upcast(self) -> Option<Operation> {
        match self {
            Operation::Load => Some(Operation::Load2),
            Operation::Call => Some(Operation::Call2),
            _ => None,
        }
    }

    /// Infix symbol used by the source language and by dumps, if any
    pub fn symbol(self) -> Option<&'static str> {
        Some(match self {
            Operation::Add => "+",
            Operation::Subtract => "-",
            Operation::Multiply => "*",
            Operation::Divide => "/",
            Operation::Modulo => "%",
            Operation::And => "&",
            Operation::Or => "|",
            Operation::Xor => "^",
            Operation::ShiftLeft => "<<",
            Operation::ShiftRight => ">>",
            _ => return None,
        })
    }
}

/// Condition under which instruction effect is applied. Evaluated against the value of the
/// condition-source variable interpreted as a signed word.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum Condition {
    #[display("always")]
    Always,
    #[display("never")]
    Never,
    #[display("==")]
    Equal,
    #[display("!=")]
    NotEqual,
    #[display("<")]
    Less,
    #[display("<=")]
    LessOrEqual,
    #[display(">")]
    Greater,
    #[display(">=")]
    GreaterOrEqual,
}

impl Default for Condition {
    fn default() -> Self { Condition::Always }
}

impl FromStr for Condition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Condition::all().into_iter().find(|cond| cond.to_string() == s).ok_or(())
    }
}

impl Condition {
    pub const fn all() -> [Condition; 8] {
        use Condition::*;
        [Always, Never, Equal, NotEqual, Less, LessOrEqual, Greater, GreaterOrEqual]
    }

    pub const fn invert(self) -> Condition {
        match self {
            Condition::Always => Condition::Never,
            Condition::Never => Condition::Always,
            Condition::Equal => Condition::NotEqual,
            Condition::NotEqual => Condition::Equal,
            Condition::Less => Condition::GreaterOrEqual,
            Condition::LessOrEqual => Condition::Greater,
            Condition::Greater => Condition::LessOrEqual,
            Condition::GreaterOrEqual => Condition::Less,
        }
    }

    /// Whether the condition reads a condition-source variable at all
    #[inline]
    pub const fn needs_source(self) -> bool {
        !matches!(self, Condition::Always | Condition::Never)
    }

    pub fn evaluate(self, value: u64, ty: WordType) -> bool {
        let value = ty.truncate(value);
        let zero = value == 0;
        let negative = ty.is_negative(value);
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Equal => zero,
            Condition::NotEqual => !zero,
            Condition::Less => negative,
            Condition::LessOrEqual => negative || zero,
            Condition::Greater => !negative && !zero,
            Condition::GreaterOrEqual => !negative,
        }
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Input {
    Immediate(u64),
    Register(VarIdx),
}

impl Default for Input {
    fn default() -> Self { Input::Immediate(0) }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Instruction {
    pub operation: Operation,
    pub condition: Condition,
    pub condition_source: Option<VarIdx>,
    pub output: Option<VarIdx>,
    pub a: Input,
    pub b: Input,
}

impl Instruction {
    pub fn new(operation: Operation) -> Self {
        Instruction {
            operation,
            condition: Condition::Always,
            condition_source: None,
            output: None,
            a: Input::default(),
            b: Input::default(),
        }
    }

    /// Break instruction which is executed when the program counter leaves the program
    pub fn halt() -> Self { Instruction::new(Operation::Break) }

    /// Data word placed into program space; never executed
    pub fn constant(value: u64) -> Self {
        Instruction {
            condition: Condition::Never,
            a: Input::Immediate(value),
            ..Instruction::new(Operation::Nop)
        }
    }

    pub fn constant_value(&self) -> Option<u64> {
        match (self.operation, self.condition, self.a) {
            (Operation::Nop, Condition::Never, Input::Immediate(value)) => Some(value),
            _ => None,
        }
    }

    pub fn with_output(mut self, output: VarIdx) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_inputs(mut self, a: Input, b: Input) -> Self {
        self.a = a;
        self.b = b;
        self
    }

    pub fn when(mut self, condition: Condition, source: Option<VarIdx>) -> Self {
        self.condition = condition;
        self.condition_source = source;
        self
    }

    pub fn display<'a>(&'a self, registers: &'a RegisterFile) -> InstructionDisplay<'a> {
        InstructionDisplay { instr: self, registers }
    }
}

pub struct InstructionDisplay<'a> {
    instr: &'a Instruction,
    registers: &'a RegisterFile,
}

impl<'a> InstructionDisplay<'a> {
    fn input(&self, f: &mut Formatter<'_>, input: Input) -> fmt::Result {
        match input {
            Input::Immediate(value) => write!(f, "{}", value),
            Input::Register(var) => f.write_str(self.registers.variable_name(var)),
        }
    }
}

impl<'a> Display for InstructionDisplay<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let instr = self.instr;
        if let Some(value) = instr.constant_value() {
            return write!(f, "DATA {}", value);
        }
        f.write_str(instr.operation.name())?;
        if let Some(output) = instr.output {
            write!(f, " {} =", self.registers.variable_name(output))?;
        }
        match (instr.operation.arity(), instr.operation.symbol()) {
            (0, _) => {}
            (1, _) => {
                f.write_str(" ")?;
                self.input(f, instr.a)?;
            }
            (_, Some(symbol)) => {
                f.write_str(" ")?;
                self.input(f, instr.a)?;
                write!(f, " {} ", symbol)?;
                self.input(f, instr.b)?;
            }
            (_, None) => {
                f.write_str(" ")?;
                self.input(f, instr.a)?;
                f.write_str(", ")?;
                self.input(f, instr.b)?;
            }
        }
        match (instr.condition, instr.condition_source) {
            (Condition::Always, _) => Ok(()),
            (cond, Some(source)) => {
                write!(f, " if {} {} 0", self.registers.variable_name(source), cond)
            }
            (cond, None) => write!(f, " if {}", cond),
        }
    }
}
