// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Passes giving statements their final shape and program indices

use crate::issues::{self, Issues, ResolveError};
use crate::model::instr::Operation;
use crate::model::scope::{AnchorKind, Context};
use crate::pipelines::compiler::immediate;
use crate::statement::{AnchorId, Kind, Statement, Value};

type PassResult = Result<Vec<Statement>, Issues<issues::Resolving>>;

/// Splits operands of loads and calls whose output is wider than the data word into the low and
/// high data words of the two-word operation counterpart. Integer operands must fit the output
/// type; registers of the output width keep the plain operation.
pub fn upcast(ctx: &mut Context, mut statements: Vec<Statement>) -> PassResult {
    let data = ctx.arch.data_type();
    let registers = ctx.arch.registers();
    let mut issues = Issues::default();

    for statement in &mut statements {
        if let Kind::Instruction { operation, output: Some(output), a: Some(a), b, .. } =
            &mut statement.kind
        {
            let (wide, ty) = match (operation.upcast(), &output.value) {
                (Some(wide), Value::Register(var)) => {
                    let ty = registers.variable_type(*var);
                    if ty.bits() <= data.bits() {
                        continue;
                    }
                    if ty.bits() > data.bits() * 2 {
                        let err = ResolveError::UpcastUnsupported(format!("{:#}", a.src));
                        issues.push_error(err, &a.src);
                        continue;
                    }
                    (wide, ty)
                }
                _ => continue,
            };
            let (low, high) = match a.value {
                Value::Int(value) => match immediate(value, ty) {
                    Ok(value) => {
                        let mask = data.mask();
                        let high = (value >> data.bits()) & mask;
                        (Value::Int((value & mask) as i128), Value::Int(high as i128))
                    }
                    Err(err) => {
                        issues.push_error(err, &a.src);
                        continue;
                    }
                },
                Value::Anchor(anchor) => {
                    (Value::AnchorPart { anchor, part: 0 }, Value::AnchorPart { anchor, part: 1 })
                }
                // A register of the output width is copied by the plain operation
                Value::Register(var) if registers.variable_type(var).bits() == ty.bits() => {
                    continue
                }
                _ => {
                    let err = ResolveError::UpcastUnsupported(format!("{:#}", a.src));
                    issues.push_error(err, &a.src);
                    continue;
                }
            };
            *b = Some(a.with(high));
            a.value = low;
            *operation = wide;
        }
    }

    if issues.has_errors() {
        return Err(issues);
    }
    Ok(statements)
}

/// Assigns program indices to the anchors, pads positioned scopes with `NOP`s and replaces
/// anchor references with the indices
pub fn apply_anchor_indices(ctx: &mut Context, statements: Vec<Statement>) -> PassResult {
    let mut index = 0u64;
    let mut placed = Vec::with_capacity(statements.len());

    for statement in statements {
        let anchor = match statement.kind {
            Kind::Anchor(anchor) => anchor,
            ref kind => {
                if kind.occupies() {
                    index += 1;
                }
                placed.push(statement);
                continue;
            }
        };
        if let AnchorKind::ScopeStart(scope) = ctx.anchor(anchor).kind {
            if let Some(position) = ctx.scope(scope).position {
                if position < index {
                    let err = ResolveError::PlacementOverlap { position, index };
                    return Err(Issues::with_error(err, &statement.src));
                }
                while index < position {
                    placed.push(statement.derive(Kind::Instruction {
                        operation: Operation::Nop,
                        condition: Default::default(),
                        source: None,
                        output: None,
                        a: None,
                        b: None,
                    }));
                    index += 1;
                }
            }
        }
        ctx.anchor_mut(anchor).index = Some(index);
    }

    let data = ctx.arch.data_type();
    let index_of = |anchor: AnchorId| match ctx.anchor(anchor).index {
        Some(index) => index as i128,
        None => unreachable!("{} is never placed into the program", anchor),
    };
    for statement in &mut placed {
        for arg in statement.kind.args_mut() {
            match arg.value {
                Value::Anchor(anchor) => arg.value = Value::Int(index_of(anchor)),
                Value::AnchorPart { anchor, part } => {
                    let shift = data.bits() * part as u32;
                    let value = (index_of(anchor) >> shift) & data.mask() as i128;
                    arg.value = Value::Int(value);
                }
                _ => {}
            }
        }
    }

    debug!("Program layout: {} entries", index);
    Ok(placed)
}
