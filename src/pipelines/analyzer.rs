// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Analyzer splitting token stream into statements and turning each of them into a typed
//! [`Statement`] with the first matching rule of the grammar table

use std::sync::Arc;

use crate::grammar::{self, Param, Prototype, Segment, SlotKind, Transform, DIRECTIVES, KEYWORDS};
use crate::issues::{self, Issues, ParseError, SourceUnit, Src};
use crate::lexer::{self, Separator, Token, TokenKind};
use crate::model::instr::Condition;
use crate::statement::{Arg, Constant, Include, Kind, Special, Statement, Value};

/// Argument bound by a matched rule
#[derive(Clone, Eq, PartialEq, Debug)]
enum Bound {
    Arg(Arg),
    Cond(Condition),
    Str(String, Src),
    Int(i128, Src),
}

#[derive(Clone, Debug, Default)]
struct Bindings(Vec<(String, Bound)>);

impl Bindings {
    fn get(&self, name: &str) -> Option<&Bound> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, bound)| bound)
    }

    fn arg(&self, name: &str) -> Option<Arg> {
        match self.get(name)? {
            Bound::Arg(arg) => Some(arg.clone()),
            _ => None,
        }
    }

    fn cond(&self, name: &str) -> Option<Condition> {
        match self.get(name)? {
            Bound::Cond(cond) => Some(*cond),
            _ => None,
        }
    }

    fn str(&self, name: &str) -> Option<(String, Src)> {
        match self.get(name)? {
            Bound::Str(s, src) => Some((s.clone(), src.clone())),
            _ => None,
        }
    }

    fn int(&self, name: &str) -> Option<(i128, Src)> {
        match self.get(name)? {
            Bound::Int(value, src) => Some((*value, src.clone())),
            _ => None,
        }
    }
}

/// Rule-matching engine holding the ordered transformation table
#[derive(Clone, Debug)]
pub struct Analyzer {
    rules: Vec<Transform>,
}

impl Default for Analyzer {
    fn default() -> Self { Analyzer::with_rules(grammar::rules()) }
}

impl Analyzer {
    pub fn with_rules(rules: Vec<Transform>) -> Self { Analyzer { rules } }

    #[inline]
    pub fn rules(&self) -> &[Transform] { &self.rules }

    /// Lexes and parses the whole unit. Reports every statement no rule applies to.
    pub fn analyze(&self, unit: &Arc<SourceUnit>) -> Result<Vec<Statement>, AnalyzeError> {
        let tokens = lexer::tokenize(unit).map_err(AnalyzeError::Lexer)?;
        let mut issues = Issues::<issues::Parsing>::default();
        let mut statements = vec![];
        for tokens in split(tokens) {
            match self.parse_statement(&tokens) {
                Ok(statement) => statements.push(statement),
                Err((error, src)) => issues.push_error(error, &src),
            }
        }
        if issues.has_errors() {
            return Err(AnalyzeError::Parser(issues));
        }
        Ok(statements)
    }

    /// Applies the first rule whose pattern matches the statement tokens
    pub fn parse_statement(&self, tokens: &[Token]) -> Result<Statement, (ParseError, Src)> {
        let src = statement_src(tokens);
        if let Some(Token { kind: TokenKind::Directive(name), src }) = tokens.first() {
            if !DIRECTIVES.contains(&name.as_str()) {
                return Err((ParseError::UnknownDirective(name.clone()), src.clone()));
            }
        }
        for rule in &self.rules {
            let mut bindings = Bindings::default();
            if !match_segments(&rule.pattern, tokens, &mut bindings) {
                continue;
            }
            for (name, param) in &rule.params {
                let bound = match param {
                    Param::Value(value) => Bound::Arg(Arg::new(value.clone(), src.clone())),
                    Param::Cond(cond) => Bound::Cond(*cond),
                };
                bindings.0.push((name.to_string(), bound));
            }
            if let Some(kind) = build(rule.prototype, &bindings) {
                return Ok(Statement::new(kind, src));
            }
        }
        Err((ParseError::NoApplicableRule(format!("{:#}", src)), src))
    }
}

#[derive(Clone, Debug, Display, From)]
pub enum AnalyzeError {
    #[display(inner)]
    #[from]
    Lexer(Issues<issues::Lexing>),

    #[display(inner)]
    #[from]
    Parser(Issues<issues::Parsing>),
}

fn statement_src(tokens: &[Token]) -> Src {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => first.src.join(&last.src),
        _ => Src::new(&SourceUnit::new("", ""), 0, 0),
    }
}

/// Splits tokens into statements. A newline or `;` ends a statement; `{` ends the statement it
/// opens (`@name {`, `@name !at 4 {`), or stands on its own after any other prefix; `}` and
/// `@label:` always form statements of their own.
pub fn split(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut statements = vec![];
    let mut buffer: Vec<Token> = vec![];

    fn flush(statements: &mut Vec<Vec<Token>>, buffer: &mut Vec<Token>) {
        if !buffer.is_empty() {
            statements.push(std::mem::take(buffer));
        }
    }

    for token in tokens {
        match token.separator() {
            Some(Separator::Weak) => continue,
            Some(Separator::Normal | Separator::Strong) => flush(&mut statements, &mut buffer),
            None if token.is_symbol("{") => {
                if opens_scope(&buffer) {
                    buffer.push(token);
                    flush(&mut statements, &mut buffer);
                } else {
                    flush(&mut statements, &mut buffer);
                    statements.push(vec![token]);
                }
            }
            None if token.is_symbol("}") => {
                flush(&mut statements, &mut buffer);
                statements.push(vec![token]);
            }
            None if token.is_symbol(":")
                && buffer.len() == 1
                && matches!(buffer[0].kind, TokenKind::Label(_)) =>
            {
                buffer.push(token);
                flush(&mut statements, &mut buffer);
            }
            None => buffer.push(token),
        }
    }
    flush(&mut statements, &mut buffer);
    statements
}

fn opens_scope(prefix: &[Token]) -> bool {
    let at = |tokens: &[Token]| {
        matches!(tokens, [
            Token { kind: TokenKind::Directive(d), .. },
            Token { kind: TokenKind::Integer(_), .. }
        ] if d == "at")
    };
    match prefix {
        [] => true,
        [Token { kind: TokenKind::Label(_), .. }] => true,
        [Token { kind: TokenKind::Label(_), .. }, rest @ ..] => at(rest),
        rest => at(rest),
    }
}

fn is_identifier(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') && !KEYWORDS.contains(&s)
}

fn register_value(name: &str) -> Value {
    if name.eq_ignore_ascii_case("pc") {
        Value::Special(Special::Pc)
    } else {
        Value::RegisterName(name.to_owned())
    }
}

fn match_segments(segments: &[Segment], tokens: &[Token], bindings: &mut Bindings) -> bool {
    if segments.len() != tokens.len() {
        return false;
    }
    segments.iter().zip(tokens).all(|(segment, token)| match_segment(segment, token, bindings))
}

fn match_segment(segment: &Segment, token: &Token, bindings: &mut Bindings) -> bool {
    let src = token.src.clone();
    let bound = match (segment, &token.kind) {
        (Segment::Symbol(expected), TokenKind::Symbol(s)) => return expected == s,
        (Segment::Integer(expected), TokenKind::Integer(value)) => return expected == value,
        (Segment::Directive(expected), TokenKind::Directive(d)) => return expected == d,
        (Segment::Group(expected, segments), TokenKind::Group { bracket, tokens }) => {
            let inner: Vec<Token> =
                tokens.iter().filter(|t| t.separator().is_none()).cloned().collect();
            return expected == bracket && match_segments(segments, &inner, bindings);
        }
        (Segment::Slot(_, kind), token_kind) => match (kind, token_kind) {
            (SlotKind::Text, TokenKind::Str(s)) => Bound::Str(s.clone(), src),
            (SlotKind::Int, TokenKind::Integer(value)) => Bound::Int(*value, src),
            (SlotKind::Var, TokenKind::Variable(name)) => Bound::Str(name.clone(), src),
            (SlotKind::Label, TokenKind::Label(name)) => Bound::Str(name.clone(), src),
            (SlotKind::Cond, TokenKind::Symbol(s)) => match s.parse::<Condition>() {
                Ok(cond) if cond.needs_source() => Bound::Cond(cond),
                _ => return false,
            },
            (SlotKind::Val, TokenKind::Integer(value)) => {
                Bound::Arg(Arg::new(Value::Int(*value), src))
            }
            (SlotKind::Val, TokenKind::Label(name)) => {
                Bound::Arg(Arg::new(Value::LabelName(name.clone()), src))
            }
            (SlotKind::Val | SlotKind::Reg, TokenKind::Variable(name)) => {
                Bound::Arg(Arg::new(Value::VariableName(name.clone()), src))
            }
            (SlotKind::Val | SlotKind::Reg, TokenKind::Symbol(s)) if is_identifier(s) => {
                Bound::Arg(Arg::new(register_value(s), src))
            }
            _ => return false,
        },
        _ => return false,
    };
    if let Segment::Slot(name, _) = segment {
        bindings.0.push((name.clone(), bound));
    }
    true
}

fn build(prototype: Prototype, bindings: &Bindings) -> Option<Kind> {
    Some(match prototype {
        Prototype::Instruction(operation) => Kind::Instruction {
            operation,
            condition: bindings.cond("cond").unwrap_or_default(),
            source: bindings.arg("src"),
            output: bindings.arg("out"),
            a: bindings.arg("a"),
            b: bindings.arg("b"),
        },
        Prototype::ScopeOpen => Kind::ScopeOpen {
            name: bindings.str("name").map(|(name, _)| name),
            position: match bindings.int("position") {
                Some((position, _)) => Some(u64::try_from(position).ok()?),
                None => None,
            },
        },
        Prototype::ScopeClose => Kind::ScopeClose,
        Prototype::Label => Kind::Label(bindings.str("name")?.0),
        Prototype::Variable => {
            Kind::Variable { name: bindings.str("name")?.0, value: bindings.arg("value")? }
        }
        Prototype::Include => {
            let (unit, _) = bindings.str("unit")?;
            match bindings.str("scope") {
                None => Kind::Include(Include::Unit(unit)),
                Some((scope, _)) => Kind::Include(Include::Scope {
                    scope,
                    unit,
                    alias: bindings.str("alias").map(|(alias, _)| alias),
                }),
            }
        }
        Prototype::If => {
            Kind::If { condition: bindings.cond("cond")?, source: bindings.arg("src")? }
        }
        Prototype::ScopedJump(kind) => Kind::ScopedJump {
            kind,
            target: bindings
                .str("target")
                .map(|(name, src)| Arg::new(Value::ScopeName(name), src)),
            condition: bindings.cond("cond").unwrap_or_default(),
            source: bindings.arg("src"),
        },
        Prototype::Constant => match (bindings.int("value"), bindings.str("text")) {
            (Some((value, src)), _) => {
                Kind::Constant(Constant::Int(Arg::new(Value::Int(value), src)))
            }
            (None, Some((text, _))) => Kind::Constant(Constant::Str(text)),
            (None, None) => return None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instr::Operation;
    use crate::statement::JumpKind;

    fn analyze(text: &str) -> Vec<Kind> {
        Analyzer::default()
            .analyze(&SourceUnit::new("test", text))
            .unwrap()
            .into_iter()
            .map(|s| s.kind)
            .collect()
    }

    fn value(kind: &Kind, slot: &str) -> Option<Value> {
        match kind {
            Kind::Instruction { output, a, b, source, .. } => match slot {
                "out" => output.as_ref().map(|a| a.value.clone()),
                "a" => a.as_ref().map(|a| a.value.clone()),
                "b" => b.as_ref().map(|a| a.value.clone()),
                "src" => source.as_ref().map(|a| a.value.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn operation(kind: &Kind) -> Option<Operation> {
        match kind {
            Kind::Instruction { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    #[test]
    fn instructions() {
        let kinds = analyze("R1 = 10\nR1 = R1 + 5; R2 = [R1 + 1]\n[R2] = R1\nload $x = @end");
        assert_eq!(kinds.len(), 5);
        assert_eq!(operation(&kinds[0]), Some(Operation::Load));
        assert_eq!(value(&kinds[0], "out"), Some(Value::RegisterName(s!("R1"))));
        assert_eq!(value(&kinds[0], "a"), Some(Value::Int(10)));
        assert_eq!(operation(&kinds[1]), Some(Operation::Add));
        assert_eq!(operation(&kinds[2]), Some(Operation::MemoryLoad));
        assert_eq!(value(&kinds[2], "b"), Some(Value::Int(1)));
        assert_eq!(operation(&kinds[3]), Some(Operation::MemoryStore));
        assert_eq!(value(&kinds[4], "out"), Some(Value::VariableName(s!("x"))));
        assert_eq!(value(&kinds[4], "a"), Some(Value::LabelName(s!("end"))));
    }

    #[test]
    fn condition_suffix() {
        let kinds = analyze("jump @loop if R2 != 0\nR1 = pop if R1 >= 0\nexit @outer if R3 < 0");
        match &kinds[0] {
            Kind::Instruction { operation: Operation::Load, condition, .. } => {
                assert_eq!(*condition, Condition::NotEqual)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(value(&kinds[0], "out"), Some(Value::Special(Special::Pc)));
        assert_eq!(value(&kinds[0], "src"), Some(Value::RegisterName(s!("R2"))));
        assert_eq!(operation(&kinds[1]), Some(Operation::StackPop));
        match &kinds[2] {
            Kind::ScopedJump { kind: JumpKind::Exit, target: Some(target), condition, .. } => {
                assert_eq!(target.value, Value::ScopeName(s!("outer")));
                assert_eq!(*condition, Condition::Less);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn structure() {
        let kinds = analyze(
            "@outer {\n  @loop: R1 = inc R1\n  if R1 == 0 {\n  }\n}\n!at 8 {\n}\n$x = R1\n!data \
             \"ab\"\n!include @lib from \"util\" as @tools",
        );
        assert_eq!(kinds[0], Kind::ScopeOpen { name: Some(s!("outer")), position: None });
        assert_eq!(kinds[1], Kind::Label(s!("loop")));
        assert_eq!(operation(&kinds[2]), Some(Operation::Increment));
        assert!(matches!(kinds[3], Kind::If { condition: Condition::Equal, .. }));
        assert_eq!(kinds[4], Kind::ScopeOpen { name: None, position: None });
        assert_eq!(kinds[5], Kind::ScopeClose);
        assert_eq!(kinds[6], Kind::ScopeClose);
        assert_eq!(kinds[7], Kind::ScopeOpen { name: None, position: Some(8) });
        assert!(matches!(&kinds[9], Kind::Variable { name, .. } if name == "x"));
        assert_eq!(kinds[10], Kind::Constant(Constant::Str(s!("ab"))));
        assert_eq!(
            kinds[11],
            Kind::Include(Include::Scope {
                scope: s!("lib"),
                unit: s!("util"),
                alias: Some(s!("tools"))
            })
        );
    }

    #[test]
    fn unmatched_statements_collected() {
        let err = Analyzer::default()
            .analyze(&SourceUnit::new("test", "R1 = = 2\nnop\nfoo bar baz\n!macro x"))
            .unwrap_err();
        match err {
            AnalyzeError::Parser(issues) => {
                let errors: Vec<_> = issues.errors().cloned().collect();
                assert_eq!(errors, vec![
                    ParseError::NoApplicableRule(s!("R1 = = 2")),
                    ParseError::NoApplicableRule(s!("foo bar baz")),
                    ParseError::UnknownDirective(s!("macro")),
                ]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keywords_are_not_registers() {
        let kinds = analyze("R1 = in\nR1 = poll\npush pc");
        assert_eq!(operation(&kinds[0]), Some(Operation::IoRead));
        assert_eq!(operation(&kinds[1]), Some(Operation::IoPoll));
        assert_eq!(value(&kinds[2], "a"), Some(Value::Special(Special::Pc)));
    }
}
