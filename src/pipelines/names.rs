// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Passes replacing names with references and substituting variable values

use std::collections::BTreeSet;

use crate::issues::{self, Issues, ResolveError};
use crate::model::scope::Context;
use crate::statement::{Arg, JumpKind, Kind, ScopeId, Special, Statement, Value, VariableId};

type PassResult = Result<Vec<Statement>, Issues<issues::Resolving>>;

/// Looks the name up from `scope`; returns `None` for values which are not names
fn resolve_name(
    ctx: &Context,
    scope: ScopeId,
    value: &Value,
) -> Result<Option<Value>, ResolveError> {
    Ok(Some(match value {
        Value::LabelName(name) => match ctx.lookup_label(scope, name) {
            Some(anchor) => Value::Anchor(anchor),
            None => match ctx.lookup_scope(scope, name).and_then(|id| ctx.scope(id).start) {
                Some(start) => Value::Anchor(start),
                None => return Err(ResolveError::UnknownLabel(name.clone())),
            },
        },
        Value::ScopeName(name) => match ctx.lookup_scope(scope, name) {
            Some(id) => Value::Scope(id),
            None => return Err(ResolveError::UnknownScope(name.clone())),
        },
        Value::VariableName(name) => match ctx.lookup_variable(scope, name) {
            Some(id) => Value::Variable(id),
            None => return Err(ResolveError::UnknownVariable(name.clone())),
        },
        Value::RegisterName(name) => match ctx.arch.registers().find_variable(name) {
            Some(var) => Value::Register(var),
            None => return Err(ResolveError::UnknownRegister(name.clone())),
        },
        _ => return Ok(None),
    }))
}

fn resolve_arg(ctx: &Context, scope: ScopeId, arg: &mut Arg) -> Result<(), ResolveError> {
    if let Some(value) = resolve_name(ctx, scope, &arg.value)? {
        arg.value = value;
    }
    Ok(())
}

/// Replaces label, scope, variable and register names with references, looking them up from the
/// scope of the statement. Scoped jumps without explicit target get the innermost local scope.
pub fn replace_names(ctx: &mut Context, mut statements: Vec<Statement>) -> PassResult {
    let mut issues = Issues::default();

    for statement in &mut statements {
        let scope = statement.scope;
        if let Kind::ScopedJump { kind, target: target @ None, .. } = &mut statement.kind {
            match ctx.innermost_local(scope) {
                Some(id) => *target = Some(Arg::new(Value::Scope(id), statement.src.clone())),
                None => {
                    let name = match kind {
                        JumpKind::Repeat => "repeat",
                        JumpKind::Exit => "exit",
                    };
                    issues.push_error(ResolveError::InvalidJumpTarget(name), &statement.src);
                    continue;
                }
            }
        }
        for arg in statement.kind.args_mut() {
            if let Err(err) = resolve_arg(ctx, scope, arg) {
                issues.push_error(err, &arg.src);
            }
        }
    }

    for id in ctx.variable_ids().collect::<Vec<_>>() {
        let def = ctx.variable(id);
        let mut value = def.value.clone();
        match resolve_arg(ctx, def.scope, &mut value) {
            Ok(()) => ctx.variable_mut(id).value = value,
            Err(err) => issues.push_error(err, &value.src),
        }
    }

    if issues.has_errors() {
        return Err(issues);
    }
    Ok(statements)
}

/// Follows the chain of variables defined through other variables down to the final value
fn final_value(ctx: &Context, id: VariableId) -> Result<Arg, (ResolveError, Arg)> {
    let mut visited = BTreeSet::new();
    let mut current = id;
    loop {
        let def = ctx.variable(current);
        if !visited.insert(current) {
            return Err((ResolveError::CircularReference(def.name.clone()), def.value.clone()));
        }
        match def.value.value {
            Value::Variable(next) => current = next,
            _ => return Ok(def.value.clone()),
        }
    }
}

/// Substitutes every variable reference with the final value of the variable and checks that
/// register operands refer to registers
pub fn resolve_variables(ctx: &mut Context, mut statements: Vec<Statement>) -> PassResult {
    let mut issues = Issues::default();

    let mut values = Vec::new();
    for id in ctx.variable_ids() {
        match final_value(ctx, id) {
            Ok(arg) => values.push(Some(arg.value)),
            Err((err, arg)) => {
                issues.push_error(err, &arg.src);
                values.push(None);
            }
        }
    }
    if issues.has_errors() {
        return Err(issues);
    }

    for statement in &mut statements {
        for arg in statement.kind.args_mut() {
            if let Value::Variable(id) = arg.value {
                if let Some(Some(value)) = values.get(id.index()) {
                    arg.value = value.clone();
                }
            }
        }
        for arg in statement.kind.register_args() {
            if !matches!(arg.value, Value::Register(_) | Value::Special(_)) {
                issues.push_error(ResolveError::NotRegister(format!("{:#}", arg.src)), &arg.src);
            }
        }
    }

    if issues.has_errors() {
        return Err(issues);
    }
    Ok(statements)
}

/// Replaces special register names with the register variables of the architecture
pub fn replace_special(ctx: &mut Context, mut statements: Vec<Statement>) -> PassResult {
    let pc = ctx.arch.registers().pc_variable();
    for statement in &mut statements {
        for arg in statement.kind.args_mut() {
            if arg.value == Value::Special(Special::Pc) {
                arg.value = Value::Register(pc);
            }
        }
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::arch;
    use crate::issues::SourceUnit;
    use crate::pipelines::scopes;

    fn prepare<'a>(ctx: &mut Context<'a>, text: &str) -> Vec<Statement> {
        let statements = Analyzer::default().analyze(&SourceUnit::new("test", text)).unwrap();
        let statements = scopes::build_scopes(ctx, statements).unwrap();
        scopes::define_symbols(ctx, statements).unwrap()
    }

    fn operands(statement: &Statement) -> (Option<Value>, Option<Value>) {
        match &statement.kind {
            Kind::Instruction { output, a, .. } => {
                (output.as_ref().map(|o| o.value.clone()), a.as_ref().map(|a| a.value.clone()))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn names_and_variables() {
        let arch = arch::by_id("rx8").unwrap();
        let r1 = arch.registers().find_variable("R1").unwrap();
        let mut ctx = Context::new(&arch);
        let statements = prepare(&mut ctx, "$a = $b\n$b = 7\n@l: R1 = $a\n$r = R1\nload $r = @l");
        let statements = replace_names(&mut ctx, statements).unwrap();
        let statements = resolve_variables(&mut ctx, statements).unwrap();
        assert_eq!(operands(&statements[1]), (Some(Value::Register(r1)), Some(Value::Int(7))));
        let label = ctx.lookup_label(ScopeId::GLOBAL, "l").unwrap();
        assert_eq!(operands(&statements[2]), (
            Some(Value::Register(r1)),
            Some(Value::Anchor(label))
        ));
    }

    #[test]
    fn circular_variables() {
        let arch = arch::by_id("rx8").unwrap();
        let mut ctx = Context::new(&arch);
        let statements = prepare(&mut ctx, "$a = $b\n$b = $a");
        let statements = replace_names(&mut ctx, statements).unwrap();
        let err = resolve_variables(&mut ctx, statements).unwrap_err();
        assert!(matches!(
            err.errors().next(),
            Some(ResolveError::CircularReference(name)) if name == "a" || name == "b"
        ));
    }

    #[test]
    fn unknown_names() {
        let arch = arch::by_id("rx8").unwrap();
        let mut ctx = Context::new(&arch);
        let statements = prepare(&mut ctx, "R9 = 1\njump @nowhere\nR1 = $x\nexit");
        let err = replace_names(&mut ctx, statements).unwrap_err();
        let errors: Vec<_> = err.errors().cloned().collect();
        assert_eq!(errors, vec![
            ResolveError::UnknownRegister(s!("R9")),
            ResolveError::UnknownLabel(s!("nowhere")),
            ResolveError::UnknownVariable(s!("x")),
            ResolveError::InvalidJumpTarget("exit"),
        ]);
    }

    #[test]
    fn labels_fall_back_to_scopes() {
        let arch = arch::by_id("rx8").unwrap();
        let mut ctx = Context::new(&arch);
        let statements = prepare(&mut ctx, "@loop {\nrepeat\n}\njump @loop");
        let statements = replace_names(&mut ctx, statements).unwrap();
        let scope = ctx.lookup_scope(ScopeId::GLOBAL, "loop").unwrap();
        match &statements[1].kind {
            Kind::ScopedJump { target: Some(target), .. } => {
                assert_eq!(target.value, Value::Scope(scope))
            }
            other => panic!("unexpected {:?}", other),
        }
        let start = ctx.scope(scope).start.unwrap();
        assert_eq!(operands(&statements[3]).1, Some(Value::Anchor(start)));
    }

    #[test]
    fn not_register() {
        let arch = arch::by_id("rx8").unwrap();
        let mut ctx = Context::new(&arch);
        let statements = prepare(&mut ctx, "$c = 5\nR1 = 1 if $c == 0");
        let statements = replace_names(&mut ctx, statements).unwrap();
        let err = resolve_variables(&mut ctx, statements).unwrap_err();
        assert_eq!(err.errors().next(), Some(&ResolveError::NotRegister(s!("$c"))));
    }
}
