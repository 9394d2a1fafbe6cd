// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Passes building the scope tree and defining the symbols of every scope

use crate::issues::{self, Issues, ResolveError};
use crate::model::scope::{Context, START_LABEL};
use crate::statement::{Arg, Constant, Kind, ScopeId, Statement, Value};

type PassResult = Result<Vec<Statement>, Issues<issues::Resolving>>;

/// Replaces scope open and close statements with the scope anchors and attaches every other
/// statement to the innermost scope enclosing it
pub fn build_scopes(ctx: &mut Context, statements: Vec<Statement>) -> PassResult {
    let mut stack = vec![ScopeId::GLOBAL];
    let mut resolved = Vec::with_capacity(statements.len());

    for mut statement in statements {
        let current = stack.last().copied().unwrap_or(ScopeId::GLOBAL);
        match statement.kind {
            Kind::ScopeOpen { name, position } => {
                let id = ctx
                    .new_scope(current, name.clone(), position, statement.src.clone())
                    .ok_or_else(|| {
                        let name = name.unwrap_or_default();
                        Issues::with_error(ResolveError::RepeatedScope(name), &statement.src)
                    })?;
                let start = ctx.scope(id).start.unwrap_or_else(|| unreachable!("local scope"));
                stack.push(id);
                let src = statement.src;
                resolved.push(Statement { kind: Kind::Anchor(start), src, scope: id });
            }
            Kind::ScopeClose => {
                if stack.len() <= 1 {
                    return Err(Issues::with_error(ResolveError::ScopeUnderflow, &statement.src));
                }
                stack.pop();
                let end = ctx.scope(current).end.unwrap_or_else(|| unreachable!("local scope"));
                resolved.push(Statement {
                    kind: Kind::Anchor(end),
                    src: statement.src,
                    scope: current,
                });
            }
            _ => {
                statement.scope = current;
                resolved.push(statement);
            }
        }
    }

    if let Some(unclosed) = stack.last().copied().filter(|id| *id != ScopeId::GLOBAL) {
        let scope = ctx.scope(unclosed);
        let name = scope.name().map(|name| format!("@{}", name)).unwrap_or_else(|| s!("unnamed"));
        let mut issues = Issues::default();
        match &scope.src {
            Some(src) => issues.push_error(ResolveError::ScopeNotClosed(name), src),
            None => issues.push_error_nospan(ResolveError::ScopeNotClosed(name)),
        }
        return Err(issues);
    }

    Ok(resolved)
}

/// Expands string constants into one integer constant per byte followed by a terminating zero
pub fn expand_strings(_ctx: &mut Context, statements: Vec<Statement>) -> PassResult {
    let mut resolved = Vec::with_capacity(statements.len());
    for statement in statements {
        let text = match &statement.kind {
            Kind::Constant(Constant::Str(text)) => text.clone(),
            _ => {
                resolved.push(statement);
                continue;
            }
        };
        for byte in text.bytes().chain([0]) {
            let arg = Arg::new(Value::Int(byte as i128), statement.src.clone());
            resolved.push(statement.derive(Kind::Constant(Constant::Int(arg))));
        }
    }
    Ok(resolved)
}

/// Defines the `@start` label at the very beginning of the program unless the global scope
/// defines it explicitly
pub fn define_start_label(_ctx: &mut Context, mut statements: Vec<Statement>) -> PassResult {
    let defined = statements.iter().any(|statement| {
        statement.scope == ScopeId::GLOBAL
            && matches!(&statement.kind, Kind::Label(name) if name == START_LABEL)
    });
    if !defined {
        if let Some(first) = statements.first() {
            let mut start = first.derive(Kind::Label(START_LABEL.to_owned()));
            start.scope = ScopeId::GLOBAL;
            statements.insert(0, start);
        }
    }
    Ok(statements)
}

/// Registers labels and variables in their scopes. Labels turn into anchors; variable
/// definitions are dropped since their values are kept by the scope.
pub fn define_symbols(ctx: &mut Context, statements: Vec<Statement>) -> PassResult {
    let mut issues = Issues::default();
    let mut resolved = Vec::with_capacity(statements.len());

    for statement in statements {
        match &statement.kind {
            Kind::Label(name) => match ctx.define_label(statement.scope, name) {
                Some(anchor) => resolved.push(statement.derive(Kind::Anchor(anchor))),
                None => {
                    issues.push_error(ResolveError::RepeatedLabel(name.clone()), &statement.src)
                }
            },
            Kind::Variable { name, value } => {
                if ctx.define_variable(statement.scope, name, value.clone()).is_none() {
                    issues.push_error(ResolveError::RepeatedVariable(name.clone()), &statement.src);
                }
            }
            _ => resolved.push(statement),
        }
    }

    if issues.has_errors() {
        return Err(issues);
    }
    Ok(resolved)
}
