// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Statements produced by the parser and rewritten by the resolution passes

use crate::arch::VarIdx;
use crate::issues::Src;
use crate::model::instr::{Condition, Operation};

/// Handle of a scope inside the resolution [`crate::scope::Context`]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display("scope#{0}")]
pub struct ScopeId(pub u32);

/// Handle of an anchor inside the resolution [`crate::scope::Context`]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display("anchor#{0}")]
pub struct AnchorId(pub u32);

/// Handle of a variable definition inside the resolution [`crate::scope::Context`]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display("variable#{0}")]
pub struct VariableId(pub u32);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);

    #[inline]
    pub fn index(self) -> usize { self.0 as usize }
}

impl AnchorId {
    #[inline]
    pub fn index(self) -> usize { self.0 as usize }
}

impl VariableId {
    #[inline]
    pub fn index(self) -> usize { self.0 as usize }
}

/// Registers with a symbolic name independent of the architecture
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum Special {
    #[display("pc")]
    Pc,
}

/// Argument value. Names are replaced with references, and references with integers, as the
/// resolution passes advance.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum Value {
    #[display("{0}")]
    Int(i128),

    #[display("{0}")]
    RegisterName(String),

    #[display("{0}")]
    Special(Special),

    #[display("${0}")]
    VariableName(String),

    #[display("@{0}")]
    LabelName(String),

    #[display("@{0}")]
    ScopeName(String),

    #[display("{0}")]
    Register(VarIdx),

    #[display("{0}")]
    Variable(VariableId),

    #[display("{0}")]
    Scope(ScopeId),

    #[display("{0}")]
    Anchor(AnchorId),

    #[display("{anchor}[{part}]")]
    AnchorPart { anchor: AnchorId, part: u8 },
}

impl Value {
    /// Whether the value is still an unresolved name
    pub fn is_name(&self) -> bool {
        matches!(
            self,
            Value::RegisterName(_)
                | Value::VariableName(_)
                | Value::LabelName(_)
                | Value::ScopeName(_)
        )
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Arg {
    pub value: Value,
    pub src: Src,
}

impl Arg {
    #[inline]
    pub fn new(value: Value, src: Src) -> Arg { Arg { value, src } }

    /// Same source location, different value
    #[inline]
    pub fn with(&self, value: Value) -> Arg { Arg { value, src: self.src.clone() } }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum JumpKind {
    #[display("repeat")]
    Repeat,
    #[display("exit")]
    Exit,
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Include {
    Unit(String),
    Scope { scope: String, unit: String, alias: Option<String> },
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Constant {
    Int(Arg),
    Str(String),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Kind {
    Instruction {
        operation: Operation,
        condition: Condition,
        source: Option<Arg>,
        output: Option<Arg>,
        a: Option<Arg>,
        b: Option<Arg>,
    },
    ScopeOpen {
        name: Option<String>,
        position: Option<u64>,
    },
    ScopeClose,
    Label(String),
    Variable {
        name: String,
        value: Arg,
    },
    Include(Include),
    If {
        condition: Condition,
        source: Arg,
    },
    ScopedJump {
        kind: JumpKind,
        target: Option<Arg>,
        condition: Condition,
        source: Option<Arg>,
    },
    Constant(Constant),
    Anchor(AnchorId),
}

impl Kind {
    /// Short human-readable name of the statement kind used in diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            Kind::Instruction { .. } => "an instruction",
            Kind::ScopeOpen { .. } => "a scope",
            Kind::ScopeClose => "a scope end",
            Kind::Label(_) => "a label",
            Kind::Variable { .. } => "a variable definition",
            Kind::Include(_) => "an include",
            Kind::If { .. } => "another `if`",
            Kind::ScopedJump { .. } => "a scoped jump",
            Kind::Constant(_) => "a constant",
            Kind::Anchor(_) => "a label or scope boundary",
        }
    }

    /// Whether the statement occupies a program entry
    #[inline]
    pub fn occupies(&self) -> bool {
        matches!(self, Kind::Instruction { .. } | Kind::Constant(_))
    }

    /// Mutable access to every argument of the statement
    pub fn args_mut(&mut self) -> Vec<&mut Arg> {
        match self {
            Kind::Instruction { source, output, a, b, .. } => {
                [source, output, a, b].into_iter().flat_map(Option::as_mut).collect()
            }
            Kind::Variable { value, .. } => vec![value],
            Kind::If { source, .. } => vec![source],
            Kind::ScopedJump { target, source, .. } => {
                [target, source].into_iter().flat_map(Option::as_mut).collect()
            }
            Kind::Constant(Constant::Int(arg)) => vec![arg],
            Kind::Constant(Constant::Str(_))
            | Kind::ScopeOpen { .. }
            | Kind::ScopeClose
            | Kind::Label(_)
            | Kind::Include(_)
            | Kind::Anchor(_) => vec![],
        }
    }

    /// Arguments which must end up referring to a register
    pub fn register_args(&self) -> Vec<&Arg> {
        match self {
            Kind::Instruction { source, output, .. } => {
                [source, output].into_iter().flatten().collect()
            }
            Kind::If { source, .. } => vec![source],
            Kind::ScopedJump { source, .. } => source.iter().collect(),
            _ => vec![],
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Statement {
    pub kind: Kind,
    pub src: Src,
    pub scope: ScopeId,
}

impl Statement {
    pub fn new(kind: Kind, src: Src) -> Statement {
        Statement { kind, src, scope: ScopeId::GLOBAL }
    }

    /// New statement sharing source and scope with `self`
    pub fn derive(&self, kind: Kind) -> Statement {
        Statement { kind, src: self.src.clone(), scope: self.scope }
    }

    /// Unconditional or conditional write of `target` into the program counter variable `pc`
    pub fn jump(
        &self,
        pc: VarIdx,
        target: Value,
        condition: Condition,
        source: Option<Arg>,
    ) -> Statement {
        self.derive(Kind::Instruction {
            operation: Operation::Load,
            condition,
            source,
            output: Some(Arg::new(Value::Register(pc), self.src.clone())),
            a: Some(Arg::new(target, self.src.clone())),
            b: None,
        })
    }
}
