// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Passes lowering structured control flow into conditional jumps

use crate::issues::{self, Issues, ResolveError};
use crate::model::instr::Condition;
use crate::model::scope::{AnchorKind, Context};
use crate::statement::{JumpKind, Kind, ScopeId, Statement, Value};

type PassResult = Result<Vec<Statement>, Issues<issues::Resolving>>;

fn is_body(kind: &Kind) -> bool {
    matches!(kind, Kind::Instruction { .. } | Kind::ScopedJump { .. })
}

/// Turns `if` into a jump over its body. A scope body is skipped by jumping to the scope end;
/// a single instruction body is skipped by jumping to an anchor placed right after it.
pub fn resolve_if_blocks(ctx: &mut Context, statements: Vec<Statement>) -> PassResult {
    let pc = ctx.arch.registers().pc_variable();
    let mut resolved = Vec::with_capacity(statements.len());
    let mut iter = statements.into_iter().peekable();

    while let Some(statement) = iter.next() {
        let (condition, source) = match &statement.kind {
            Kind::If { condition, source } => (condition.invert(), source.clone()),
            _ => {
                resolved.push(statement);
                continue;
            }
        };

        let scope_end = match iter.peek().map(|next| &next.kind) {
            None => return Err(Issues::with_error(ResolveError::IfWithoutBody, &statement.src)),
            Some(Kind::Anchor(anchor)) => match ctx.anchor(*anchor).kind {
                AnchorKind::ScopeStart(scope) => ctx.scope(scope).end,
                _ => None,
            },
            Some(kind) if is_body(kind) => None,
            Some(other) => {
                let err = ResolveError::IfFollowedBy(other.describe());
                return Err(Issues::with_error(err, &statement.src));
            }
        };

        match scope_end {
            Some(end) => {
                resolved.push(statement.jump(pc, Value::Anchor(end), condition, Some(source)));
            }
            None => {
                let body = match iter.next() {
                    Some(body) if is_body(&body.kind) => body,
                    Some(other) => {
                        let err = ResolveError::IfFollowedBy(other.kind.describe());
                        return Err(Issues::with_error(err, &statement.src));
                    }
                    None => {
                        return Err(Issues::with_error(ResolveError::IfWithoutBody, &statement.src))
                    }
                };
                let after = ctx.new_anchor(AnchorKind::Unnamed);
                resolved.push(statement.jump(pc, Value::Anchor(after), condition, Some(source)));
                let anchor = body.derive(Kind::Anchor(after));
                resolved.push(body);
                resolved.push(anchor);
            }
        }
    }

    Ok(resolved)
}

/// Turns `repeat` into a jump to the start and `exit` into a jump to the end of the target scope
pub fn resolve_scoped_jumps(ctx: &mut Context, statements: Vec<Statement>) -> PassResult {
    let pc = ctx.arch.registers().pc_variable();
    let mut resolved = Vec::with_capacity(statements.len());

    for statement in statements {
        let (kind, target, condition, source) = match &statement.kind {
            Kind::ScopedJump { kind, target, condition, source } => {
                (*kind, target.clone(), *condition, source.clone())
            }
            _ => {
                resolved.push(statement);
                continue;
            }
        };
        let name = match kind {
            JumpKind::Repeat => "repeat",
            JumpKind::Exit => "exit",
        };
        let scope = match target.map(|arg| arg.value) {
            Some(Value::Scope(scope)) if !ctx.scope(scope).is_global() => ctx.scope(scope),
            _ => {
                let err = ResolveError::InvalidJumpTarget(name);
                return Err(Issues::with_error(err, &statement.src));
            }
        };
        let anchor = match kind {
            JumpKind::Repeat => scope.start,
            JumpKind::Exit => scope.end,
        };
        let anchor = anchor.unwrap_or_else(|| unreachable!("local scope without boundary anchors"));
        resolved.push(statement.jump(pc, Value::Anchor(anchor), condition, source));
    }

    Ok(resolved)
}

/// Prepends a jump to `@start` when the label does not end up at the very first program index
pub fn insert_start_jump(ctx: &mut Context, mut statements: Vec<Statement>) -> PassResult {
    let start = match ctx.start_label() {
        Some(start) => start,
        None => return Ok(statements),
    };
    let pc = ctx.arch.registers().pc_variable();

    let mut displaced = false;
    let mut label = None;
    for statement in &statements {
        match &statement.kind {
            Kind::Anchor(anchor) if *anchor == start => {
                label = Some(statement);
                break;
            }
            Kind::Anchor(anchor) => {
                if let AnchorKind::ScopeStart(scope) = ctx.anchor(*anchor).kind {
                    displaced |= ctx.scope(scope).position.unwrap_or_default() > 0;
                }
            }
            kind if kind.occupies() => displaced = true,
            _ => {}
        }
    }

    if let (true, Some(label)) = (displaced, label) {
        let mut jump = label.jump(pc, Value::Anchor(start), Condition::Always, None);
        jump.scope = ScopeId::GLOBAL;
        statements.insert(0, jump);
    }
    Ok(statements)
}
