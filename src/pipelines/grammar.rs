// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Ordered table of statement transformation rules.
//!
//! Patterns are written in a small notation: whitespace-separated segments, where
//! `<name:kind>` is a typed argument slot, `!name` a directive, `[ ... ]` and `( ... )` a
//! bracket group, an integer matches exactly that integer and anything else is a literal symbol.

use crate::lexer::Bracket;
use crate::model::instr::{Condition, Operation};
use crate::statement::{JumpKind, Special, Value};

/// Token-kind predicate of an argument slot
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum SlotKind {
    /// string literal
    #[display("text")]
    Text,
    #[display("int")]
    Int,
    /// variable name
    #[display("var")]
    Var,
    /// label name
    #[display("label")]
    Label,
    /// comparison against zero
    #[display("cond")]
    Cond,
    /// integer, register, variable or label
    #[display("val")]
    Val,
    /// register or variable
    #[display("reg")]
    Reg,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Segment {
    Symbol(String),
    Integer(i128),
    Directive(String),
    Group(Bracket, Vec<Segment>),
    Slot(String, SlotKind),
}

/// Shape of the statement a rule produces
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Prototype {
    Instruction(Operation),
    ScopeOpen,
    ScopeClose,
    Label,
    Variable,
    Include,
    If,
    ScopedJump(JumpKind),
    Constant,
}

/// Fixed argument value supplied by the rule rather than by the source
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Param {
    Value(Value),
    Cond(Condition),
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Transform {
    pub pattern: Vec<Segment>,
    pub prototype: Prototype,
    pub params: Vec<(&'static str, Param)>,
}

/// Words which can't be used as register names
pub const KEYWORDS: [&str; 22] = [
    "if", "load", "jump", "call", "return", "break", "nop", "push", "pop", "peek", "in", "out",
    "poll", "inc", "dec", "repeat", "exit", "adc", "sbc", "nand", "nor", "xnor",
];

/// Directives known to the grammar
pub const DIRECTIVES: [&str; 3] = ["at", "include", "data"];

const CONDITION_SUFFIX: &str = "if <src:reg> <cond:cond> 0";

impl Transform {
    /// Parses the pattern notation.
    ///
    /// # Panics
    ///
    /// On a malformed pattern; rule tables are static and covered by tests.
    pub fn new(prototype: Prototype, pattern: &str) -> Transform {
        Transform { pattern: parse_pattern(pattern), prototype, params: vec![] }
    }

    pub fn with(mut self, name: &'static str, param: Param) -> Transform {
        self.params.push((name, param));
        self
    }

    #[inline]
    pub fn writes_pc(self) -> Transform {
        self.with("out", Param::Value(Value::Special(Special::Pc)))
    }

    /// Variant of the rule ending with the `if <reg> <cond> 0` suffix
    pub fn conditional(&self) -> Transform {
        let mut rule = self.clone();
        rule.pattern.extend(parse_pattern(CONDITION_SUFFIX));
        rule
    }
}

pub fn parse_pattern(pattern: &str) -> Vec<Segment> {
    parse_segments(pattern, &mut pattern.split_whitespace(), None)
}

fn parse_segments<'p>(
    pattern: &str,
    words: &mut impl Iterator<Item = &'p str>,
    closing: Option<&str>,
) -> Vec<Segment> {
    let mut segments = vec![];
    while let Some(word) = words.next() {
        let segment = match word {
            "[" => Segment::Group(Bracket::Square, parse_segments(pattern, words, Some("]"))),
            "(" => Segment::Group(Bracket::Round, parse_segments(pattern, words, Some(")"))),
            "]" | ")" if closing == Some(word) => return segments,
            "]" | ")" => panic!("unbalanced `{}` in grammar pattern `{}`", word, pattern),
            slot if slot.starts_with('<') && slot.ends_with('>') => {
                let (name, kind) = slot[1..slot.len() - 1]
                    .split_once(':')
                    .unwrap_or_else(|| panic!("slot `{}` in `{}` has no kind", slot, pattern));
                let kind = match kind {
                    "text" => SlotKind::Text,
                    "int" => SlotKind::Int,
                    "var" => SlotKind::Var,
                    "label" => SlotKind::Label,
                    "cond" => SlotKind::Cond,
                    "val" => SlotKind::Val,
                    "reg" => SlotKind::Reg,
                    other => {
                        panic!("unknown slot kind `{}` in grammar pattern `{}`", other, pattern)
                    }
                };
                Segment::Slot(name.to_owned(), kind)
            }
            directive if directive.starts_with('!') && directive.len() > 1 => {
                Segment::Directive(directive[1..].to_owned())
            }
            int if int.starts_with(|c: char| c.is_ascii_digit()) => match int.parse() {
                Ok(value) => Segment::Integer(value),
                Err(_) => panic!("invalid integer `{}` in grammar pattern `{}`", int, pattern),
            },
            symbol => Segment::Symbol(symbol.to_owned()),
        };
        segments.push(segment);
    }
    if let Some(closing) = closing {
        panic!("missing `{}` in grammar pattern `{}`", closing, pattern);
    }
    segments
}

/// Complete ordered rule table of the language; the first matching rule wins
pub fn rules() -> Vec<Transform> {
    use Operation::*;
    use Prototype as P;

    let mut rules = vec![
        Transform::new(P::ScopeOpen, "{"),
        Transform::new(P::ScopeOpen, "<name:label> {"),
        Transform::new(P::ScopeOpen, "<name:label> !at <position:int> {"),
        Transform::new(P::ScopeOpen, "!at <position:int> {"),
        Transform::new(P::ScopeClose, "}"),
        Transform::new(P::Label, "<name:label> :"),
        Transform::new(P::Variable, "<name:var> = <value:val>"),
        Transform::new(P::Include, "!include <unit:text>"),
        Transform::new(P::Include, "!include <scope:label> from <unit:text>"),
        Transform::new(P::Include, "!include <scope:label> from <unit:text> as <alias:label>"),
        Transform::new(P::Constant, "!data <value:int>"),
        Transform::new(P::Constant, "!data <text:text>"),
        Transform::new(P::If, "if <src:reg> <cond:cond> 0"),
    ];

    let mut conditional = vec![
        Transform::new(P::ScopedJump(JumpKind::Repeat), "repeat"),
        Transform::new(P::ScopedJump(JumpKind::Repeat), "repeat <target:label>"),
        Transform::new(P::ScopedJump(JumpKind::Exit), "exit"),
        Transform::new(P::ScopedJump(JumpKind::Exit), "exit <target:label>"),
        Transform::new(P::Instruction(Nop), "nop"),
        Transform::new(P::Instruction(Break), "break"),
        Transform::new(P::Instruction(Return), "return").writes_pc(),
        Transform::new(P::Instruction(Load), "jump <a:val>").writes_pc(),
        Transform::new(P::Instruction(Call), "call <a:val>").writes_pc(),
        Transform::new(P::Instruction(StackPush), "push <a:val>"),
        Transform::new(P::Instruction(IoWrite), "out <a:val>"),
        Transform::new(P::Instruction(MemoryStore), "[ <a:val> ] = <b:val>"),
        Transform::new(P::Instruction(StackPop), "<out:reg> = pop"),
        Transform::new(P::Instruction(StackPeek), "<out:reg> = peek"),
        Transform::new(P::Instruction(IoRead), "<out:reg> = in"),
        Transform::new(P::Instruction(IoPoll), "<out:reg> = poll"),
        Transform::new(P::Instruction(MemoryLoad), "<out:reg> = [ <a:val> ]"),
        Transform::new(P::Instruction(MemoryLoad), "<out:reg> = [ <a:val> + <b:val> ]"),
        Transform::new(P::Instruction(Increment), "<out:reg> = inc <a:val>"),
        Transform::new(P::Instruction(Decrement), "<out:reg> = dec <a:val>"),
    ];

    let binary = [
        (Add, "+"),
        (Subtract, "-"),
        (Multiply, "*"),
        (Divide, "/"),
        (Modulo, "%"),
        (And, "&"),
        (Or, "|"),
        (Xor, "^"),
        (ShiftLeft, "<<"),
        (ShiftRight, ">>"),
        (AddWithCarry, "adc"),
        (SubtractWithCarry, "sbc"),
        (Nand, "nand"),
        (Nor, "nor"),
        (Xnor, "xnor"),
        (RotateLeft, "rol"),
        (RotateRight, "ror"),
    ];
    for (operation, symbol) in binary {
        let pattern = format!("<out:reg> = <a:val> {} <b:val>", symbol);
        conditional.push(Transform::new(P::Instruction(operation), &pattern));
    }

    conditional.push(Transform::new(P::Instruction(Load), "load <out:reg> = <a:val>"));
    conditional.push(Transform::new(P::Instruction(Load), "<out:reg> = <a:val>"));

    for rule in conditional {
        let suffixed = rule.conditional();
        rules.push(rule);
        rules.push(suffixed);
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_builds() {
        let rules = rules();
        assert!(rules.len() > 60);
        let memory = rules
            .iter()
            .find(|rule| rule.prototype == Prototype::Instruction(Operation::MemoryStore))
            .unwrap();
        assert_eq!(memory.pattern, vec![
            Segment::Group(Bracket::Square, vec![Segment::Slot(s!("a"), SlotKind::Val)]),
            Segment::Symbol(s!("=")),
            Segment::Slot(s!("b"), SlotKind::Val),
        ]);
    }

    #[test]
    fn suffix_variant() {
        let rules = rules();
        let jumps: Vec<_> = rules
            .iter()
            .filter(|rule| rule.prototype == Prototype::Instruction(Operation::Load))
            .filter(|rule| rule.params.iter().any(|(name, _)| *name == "out"))
            .collect();
        assert_eq!(jumps.len(), 2);
        assert_eq!(jumps[1].pattern.len(), 7);
        assert_eq!(jumps[1].pattern[6], Segment::Integer(0));
    }

    #[test]
    #[should_panic]
    fn malformed_pattern() { Transform::new(Prototype::Label, "<name:unknown>"); }
}
