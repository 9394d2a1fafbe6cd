// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

use std::fmt::{self, Debug, Display, Formatter, Write};
use std::sync::Arc;

use pest::Position;

use crate::arch::EncodingError;
use crate::model::word::WordType;

pub trait Issue: Debug + Display {
    fn errno(&self) -> u16;
    fn is_error(&self) -> bool;
}

pub trait Stage {
    type Error: std::error::Error + Issue + Clone;
    type Warning: Issue + Clone;
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct Lexing;
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct Parsing;
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct Linking;
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct Resolving;
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct Encoding;

impl Stage for Lexing {
    type Error = LexError;
    type Warning = NoWarning;
}

impl Stage for Parsing {
    type Error = ParseError;
    type Warning = NoWarning;
}

impl Stage for Linking {
    type Error = LinkError;
    type Warning = LinkWarning;
}

impl Stage for Resolving {
    type Error = ResolveError;
    type Warning = NoWarning;
}

impl Stage for Encoding {
    type Error = EncodingError;
    type Warning = NoWarning;
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum LexError {
    /// string literal is not terminated before the end of the source
    UnterminatedLiteral,

    /// bracket `{0}` is never closed
    UnterminatedBracket(char),

    /// closing bracket `{0}` does not match any opening bracket
    UnbalancedBracket(char),

    /// invalid integer literal `{0}`
    InvalidInteger(String),

    /// unexpected character `{0}`
    UnexpectedCharacter(String),
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ParseError {
    /// no applicable rule for statement `{0}`
    NoApplicableRule(String),

    /// unknown directive `!{0}`
    UnknownDirective(String),
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum LinkError {
    /// compilation unit `{0}` was not found in any of the include directories
    UnitNotFound(String),

    /// circular include of `{unit}` via {chain}
    CircularInclude { unit: String, chain: String },

    /// unit `{unit}` has no top-level scope named `@{scope}`
    ScopeNotFound { scope: String, unit: String },

    /// unable to read compilation unit `{unit}`
    /// \n
    /// details: {details}
    ReadFailure { unit: String, details: String },
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ResolveError {
    /// closing brace does not match any open scope
    ScopeUnderflow,

    /// scope `{0}` is never closed
    ScopeNotClosed(String),

    /// repeated label `@{0}`
    RepeatedLabel(String),

    /// repeated variable `${0}` in the same scope
    RepeatedVariable(String),

    /// repeated scope name `@{0}` in the same scope
    RepeatedScope(String),

    /// unknown label `@{0}`
    UnknownLabel(String),

    /// unknown variable `${0}`
    UnknownVariable(String),

    /// unknown scope `@{0}`
    UnknownScope(String),

    /// unknown register `{0}`
    UnknownRegister(String),

    /// circular reference while resolving variable `${0}`
    CircularReference(String),

    /// `{0}` is used as a register, but does not refer to one
    NotRegister(String),

    /// `{0}` requires an enclosing local scope, while the global scope can't be repeated or
    /// exited
    InvalidJumpTarget(&'static str),

    /// `if` at the end of the program has no body
    IfWithoutBody,

    /// `if` must be followed by a scope or an instruction, while it is followed by {0}
    IfFollowedBy(&'static str),

    /// value `{0}` can't be split into the data words of the architecture
    UpcastUnsupported(String),

    /// scope placed at position {position} overlaps the code already placed up to position
    /// {index}
    PlacementOverlap { position: u64, index: u64 },

    /// integer {value} does not fit into {ty}
    IntegerOutOfRange { value: i128, ty: WordType },
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display(doc_comments)]
pub enum LinkWarning {
    /// unit `{0}` is included more than once into the same unit
    RepeatedInclude(String),
}

#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display(doc_comments)]
pub enum NoWarning {}

impl Issue for LexError {
    fn errno(&self) -> u16 {
        match self {
            LexError::UnterminatedLiteral => 1001,
            LexError::UnterminatedBracket(_) => 1002,
            LexError::UnbalancedBracket(_) => 1003,
            LexError::InvalidInteger(_) => 1004,
            LexError::UnexpectedCharacter(_) => 1005,
        }
    }

    #[inline]
    fn is_error(&self) -> bool { true }
}

impl Issue for ParseError {
    fn errno(&self) -> u16 {
        match self {
            ParseError::NoApplicableRule(_) => 2001,
            ParseError::UnknownDirective(_) => 2002,
        }
    }

    #[inline]
    fn is_error(&self) -> bool { true }
}

impl Issue for LinkError {
    fn errno(&self) -> u16 {
        match self {
            LinkError::UnitNotFound(_) => 3001,
            LinkError::CircularInclude { .. } => 3002,
            LinkError::ScopeNotFound { .. } => 3003,
            LinkError::ReadFailure { .. } => 3004,
        }
    }

    #[inline]
    fn is_error(&self) -> bool { true }
}

impl Issue for ResolveError {
    fn errno(&self) -> u16 {
        match self {
            ResolveError::ScopeUnderflow => 4001,
            ResolveError::ScopeNotClosed(_) => 4002,
            ResolveError::RepeatedLabel(_) => 4003,
            ResolveError::RepeatedVariable(_) => 4004,
            ResolveError::RepeatedScope(_) => 4005,
            ResolveError::UnknownLabel(_) => 4006,
            ResolveError::UnknownVariable(_) => 4007,
            ResolveError::UnknownScope(_) => 4008,
            ResolveError::UnknownRegister(_) => 4009,
            ResolveError::CircularReference(_) => 4010,
            ResolveError::NotRegister(_) => 4011,
            ResolveError::InvalidJumpTarget(_) => 4012,
            ResolveError::IfWithoutBody => 4013,
            ResolveError::IfFollowedBy(_) => 4014,
            ResolveError::UpcastUnsupported(_) => 4015,
            ResolveError::PlacementOverlap { .. } => 4016,
            ResolveError::IntegerOutOfRange { .. } => 4017,
        }
    }

    #[inline]
    fn is_error(&self) -> bool { true }
}

impl Issue for LinkWarning {
    fn errno(&self) -> u16 {
        match self {
            LinkWarning::RepeatedInclude(_) => 3101,
        }
    }

    #[inline]
    fn is_error(&self) -> bool { false }
}

impl Issue for NoWarning {
    fn errno(&self) -> u16 { match *self {} }

    #[inline]
    fn is_error(&self) -> bool { false }
}

#[derive(Clone, Debug)]
pub struct Issues<S>
where
    S: Stage,
{
    errors: Vec<(S::Error, Option<Src>)>,
    warnings: Vec<(S::Warning, Option<Src>)>,
}

impl<S> Default for Issues<S>
where
    S: Stage,
{
    #[inline]
    fn default() -> Self { Issues { errors: vec![], warnings: vec![] } }
}

impl<S> Display for Issues<S>
where
    S: Stage,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fn _f(f: &mut Formatter<'_>, issue: &impl Issue, src: &Option<Src>) -> fmt::Result {
            write!(
                f,
                "{} E{:04}:\x1B[0m \x1B[1;15m{}\x1B[0m",
                if issue.is_error() { "\x1B[1;31mError" } else { "\x1B[1;33mWarning" },
                issue.errno(),
                issue
            )?;
            match src {
                Some(src) => Display::fmt(src, f),
                None => f.write_char('\n'),
            }
        }

        for (error, src) in &self.errors {
            _f(f, error, src)?;
        }

        for (warning, src) in &self.warnings {
            _f(f, warning, src)?;
        }

        Ok(())
    }
}

impl<S> Issues<S>
where
    S: Stage,
{
    pub fn with_error(error: S::Error, src: &Src) -> Self {
        let mut issues = Issues::default();
        issues.push_error(error, src);
        issues
    }
    pub fn push_error(&mut self, error: S::Error, src: &Src) {
        self.errors.push((error, Some(src.clone())));
    }
    pub fn push_warning(&mut self, warning: S::Warning, src: &Src) {
        self.warnings.push((warning, Some(src.clone())));
    }
    pub fn push_error_nospan(&mut self, error: S::Error) { self.errors.push((error, None)); }
    pub fn has_errors(&self) -> bool { !self.errors.is_empty() }
    pub fn count_errors(&self) -> usize { self.errors.len() }
    pub fn count_warnings(&self) -> usize { self.warnings.len() }
    pub fn errors(&self) -> impl Iterator<Item = &S::Error> { self.errors.iter().map(|(e, _)| e) }
    pub fn warnings(&self) -> impl Iterator<Item = &S::Warning> {
        self.warnings.iter().map(|(w, _)| w)
    }
    /// Source location of the first error, if it has one
    pub fn first_src(&self) -> Option<&Src> {
        self.errors.first().and_then(|(_, src)| src.as_ref())
    }
}

/// Single compilation unit: its id (used in diagnostics and for include resolution) and text
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct SourceUnit {
    pub id: String,
    pub text: String,
}

impl SourceUnit {
    pub fn new(id: impl ToString, text: impl ToString) -> Arc<SourceUnit> {
        Arc::new(SourceUnit { id: id.to_string(), text: text.to_string() })
    }
}

/// Exact slice of a compilation unit
#[derive(Clone)]
pub struct Src {
    unit: Arc<SourceUnit>,
    offset: usize,
    len: usize,
}

impl PartialEq for Src {
    fn eq(&self, other: &Self) -> bool {
        self.unit.id == other.unit.id && self.offset == other.offset && self.len == other.len
    }
}

impl Eq for Src {}

impl Src {
    pub fn new(unit: &Arc<SourceUnit>, offset: usize, len: usize) -> Src {
        Src { unit: unit.clone(), offset, len }
    }

    #[inline]
    pub fn unit(&self) -> &Arc<SourceUnit> { &self.unit }

    #[inline]
    pub fn unit_id(&self) -> &str { &self.unit.id }

    #[inline]
    pub fn offset(&self) -> usize { self.offset }

    #[inline]
    pub fn len(&self) -> usize { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn as_str(&self) -> &str {
        self.unit.text.get(self.offset..self.offset + self.len).unwrap_or_default()
    }

    /// Smallest slice covering both sources; falls back to `self` for slices of different units
    pub fn join(&self, other: &Src) -> Src {
        if !Arc::ptr_eq(&self.unit, &other.unit) {
            return self.clone();
        }
        let start = self.offset.min(other.offset);
        let end = (self.offset + self.len).max(other.offset + other.len);
        Src { unit: self.unit.clone(), offset: start, len: end - start }
    }

    /// One-based line and column of the slice start
    pub fn line_col(&self) -> (usize, usize) {
        Position::new(&self.unit.text, self.offset).map(|pos| pos.line_col()).unwrap_or((0, 0))
    }
}

impl Display for Src {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return f.write_str(self.as_str());
        }

        let (line, col) = self.line_col();
        let text = &self.unit.text;
        let line_start =
            text[..self.offset.min(text.len())].rfind('\n').map(|p| p + 1).unwrap_or(0);
        let end = self.offset + self.len;

        writeln!(f, "\n\x1B[1;34m   --> {}:{}:{}", self.unit.id, line, col)?;
        writeln!(f, "\x1B[1;34m     |\x1B[0m")?;
        let mut pos = line_start;
        for (index, s) in text[line_start..].split_inclusive('\n').enumerate() {
            if index > 0 && pos >= end {
                break;
            }
            pos += s.len();
            let s = s.trim_end_matches(&['\r', '\n'][..]);
            writeln!(f, "\x1B[1;34m{:>4} |\x1B[0m {}", line + index, s)?;
            if index == 0 {
                let width = self.as_str().lines().next().unwrap_or_default().chars().count();
                write!(f, "\x1B[1;34m     |\x1B[1;31m{:1$}", "", col)?;
                for _ in 0..width.max(1) {
                    f.write_char('^')?;
                }
                f.write_str("\x1B[0m\n")?;
            }
        }
        writeln!(f)
    }
}

impl Debug for Src {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let end = self.offset + self.len;
        write!(f, "{}@{}..{} {:?}", self.unit.id, self.offset, end, self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn src_position() {
        let unit = SourceUnit::new("main", "nop\n  R1 = 5\n");
        let src = Src::new(&unit, 6, 6);
        assert_eq!(src.as_str(), "R1 = 5");
        assert_eq!(src.line_col(), (2, 3));
        assert_eq!(format!("{:#}", src), "R1 = 5");
        let rendered = src.to_string();
        assert!(rendered.contains("--> main:2:3"));
        assert!(rendered.contains("^^^^^^"));
    }

    #[test]
    fn src_join() {
        let unit = SourceUnit::new("main", "R1 = R2 + 3");
        let a = Src::new(&unit, 0, 2);
        let b = Src::new(&unit, 10, 1);
        assert_eq!(a.join(&b).as_str(), "R1 = R2 + 3");
    }

    #[test]
    fn issues_render() {
        let unit = SourceUnit::new("main", "jump @nowhere");
        let mut issues = Issues::<Resolving>::default();
        issues.push_error(ResolveError::UnknownLabel(s!("nowhere")), &Src::new(&unit, 5, 8));
        assert!(issues.has_errors());
        assert_eq!(issues.count_errors(), 1);
        let rendered = issues.to_string();
        assert!(rendered.contains("E4006"));
        assert!(rendered.contains("unknown label `@nowhere`"));
    }
}
