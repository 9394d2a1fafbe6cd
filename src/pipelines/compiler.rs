// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Compiler running the ordered resolution passes over linked statements and emitting the
//! resulting [`Program`]

use crate::arch::{Architecture, VarIdx};
use crate::issues::{self, Issues, ResolveError};
use crate::model::instr::{Input, Instruction};
use crate::model::scope::Context;
use crate::model::word::WordType;
use crate::pipelines::{control, layout, names, scopes};
use crate::program::Program;
use crate::statement::{Arg, Constant, Kind, Statement, Value};
use crate::MainError;

/// Program-rewriting pass: consumes the whole statement list and returns its replacement
pub type Pass =
    fn(&mut Context<'_>, Vec<Statement>) -> Result<Vec<Statement>, Issues<issues::Resolving>>;

/// Resolution passes in the order they must run
pub const PASSES: [(&str, Pass); 12] = [
    ("build scopes", scopes::build_scopes),
    ("expand strings", scopes::expand_strings),
    ("define start label", scopes::define_start_label),
    ("define labels and variables", scopes::define_symbols),
    ("replace names", names::replace_names),
    ("resolve variable values", names::resolve_variables),
    ("replace special registers", names::replace_special),
    ("resolve if-blocks", control::resolve_if_blocks),
    ("resolve scoped jumps", control::resolve_scoped_jumps),
    ("insert start jump", control::insert_start_jump),
    ("upcast wide loads", layout::upcast),
    ("apply anchor indices", layout::apply_anchor_indices),
];

const EMIT: &str = "emit instructions";

/// Resolves statements of the unit `unit_id` into a program for the architecture
pub fn compile(
    arch: &Architecture,
    unit_id: &str,
    statements: Vec<Statement>,
) -> Result<Program, MainError> {
    let mut ctx = Context::new(arch);
    let mut statements = statements;
    for (name, pass) in PASSES {
        let count = statements.len();
        statements = pass(&mut ctx, statements)
            .map_err(|issues| MainError::Resolve(unit_id.to_owned(), name, issues))?;
        debug!("Pass `{}`: {} statements in, {} out", name, count, statements.len());
    }
    let program = emit(&ctx, statements)
        .map_err(|issues| MainError::Resolve(unit_id.to_owned(), EMIT, issues))?;
    debug!("Compiled `{}` into {} instructions for {}", unit_id, program.len(), arch.id());
    Ok(program)
}

fn register(arg: &Arg) -> VarIdx {
    match arg.value {
        Value::Register(var) => var,
        ref other => unreachable!("operand `{}` must be resolved to a register", other),
    }
}

/// Integers are accepted from the most negative signed value of the word type up to its largest
/// unsigned value; negative values are stored in two's complement
pub(crate) fn immediate(value: i128, ty: WordType) -> Result<u64, ResolveError> {
    let min = -(1i128 << (ty.bits() - 1));
    let max = ty.mask() as i128;
    if value < min || value > max {
        return Err(ResolveError::IntegerOutOfRange { value, ty });
    }
    Ok(ty.truncate(value as u64))
}

fn input(arg: Option<Arg>, ty: WordType, issues: &mut Issues<issues::Resolving>) -> Input {
    let arg = match arg {
        Some(arg) => arg,
        None => return Input::default(),
    };
    match arg.value {
        Value::Register(var) => Input::Register(var),
        Value::Int(value) => match immediate(value, ty) {
            Ok(value) => Input::Immediate(value),
            Err(err) => {
                issues.push_error(err, &arg.src);
                Input::default()
            }
        },
        ref other => unreachable!("operand `{}` survived resolution", other),
    }
}

fn emit(ctx: &Context, statements: Vec<Statement>) -> Result<Program, Issues<issues::Resolving>> {
    let registers = ctx.arch.registers();
    let data = ctx.arch.data_type();
    let mut issues = Issues::default();
    let mut instructions = Vec::with_capacity(statements.len());
    let mut sources = Vec::with_capacity(statements.len());

    for statement in statements {
        let instr = match statement.kind {
            Kind::Instruction { operation, condition, source, output, a, b } => {
                let output = output.as_ref().map(register);
                let ty = output.map(|var| registers.variable_type(var)).unwrap_or(data);
                let mut instr = Instruction::new(operation)
                    .when(condition, source.as_ref().map(register))
                    .with_inputs(input(a, ty, &mut issues), input(b, ty, &mut issues));
                instr.output = output;
                instr
            }
            Kind::Constant(Constant::Int(arg)) => match arg.value {
                Value::Int(value) => match immediate(value, data) {
                    Ok(value) => Instruction::constant(value),
                    Err(err) => {
                        issues.push_error(err, &arg.src);
                        continue;
                    }
                },
                ref other => unreachable!("constant `{}` survived resolution", other),
            },
            other => unreachable!("{} survived resolution", other.describe()),
        };
        instructions.push(instr);
        sources.push(Some(statement.src));
    }

    if issues.has_errors() {
        return Err(issues);
    }
    Ok(Program::with_sources(instructions, sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::arch;
    use crate::issues::SourceUnit;

    fn compile_text(arch: &Architecture, text: &str) -> Result<Program, MainError> {
        let statements = Analyzer::default().analyze(&SourceUnit::new("test", text)).unwrap();
        compile(arch, "test", statements)
    }

    #[test]
    fn pass_order() {
        let names: Vec<_> = PASSES.iter().map(|(name, _)| *name).collect();
        let position = |name| names.iter().position(|n| *n == name).unwrap();
        assert!(position("build scopes") < position("replace names"));
        assert!(position("resolve if-blocks") < position("apply anchor indices"));
        assert!(position("upcast wide loads") < position("apply anchor indices"));
    }

    #[test]
    fn forward_reference() {
        let arch = arch::by_id("rx16").unwrap();
        let program = compile_text(&arch, "jump @target\nnop\nnop\n@target: nop").unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program.get(0).unwrap().a, Input::Immediate(3));
        assert_eq!(program.source(0).unwrap().as_str(), "jump @target");
    }

    #[test]
    fn negative_and_out_of_range() {
        let arch = arch::by_id("rx8").unwrap();
        let program = compile_text(&arch, "R1 = -1").unwrap();
        assert_eq!(program.get(0).unwrap().a, Input::Immediate(0xFF));

        match compile_text(&arch, "R1 = 256\nR2 = -129").unwrap_err() {
            MainError::Resolve(unit, pass, issues) => {
                assert_eq!(unit, "test");
                assert_eq!(pass, EMIT);
                assert_eq!(issues.count_errors(), 2);
                assert_eq!(
                    issues.errors().next(),
                    Some(&ResolveError::IntegerOutOfRange { value: 256, ty: WordType::U8 })
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn failing_pass_is_named() {
        let arch = arch::by_id("rx8").unwrap();
        match compile_text(&arch, "if R1 == 0").unwrap_err() {
            MainError::Resolve(_, pass, _) => assert_eq!(pass, "resolve if-blocks"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
