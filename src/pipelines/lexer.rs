// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Lexer splitting source text into tokens with exact source slices

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use pest::Parser;

use crate::grammar::KEYWORDS;
use crate::issues::{self, Issues, LexError, SourceUnit, Src};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct SourceParser;

/// Strength of a token separator
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum Separator {
    /// inline whitespace
    #[display("weak")]
    Weak,
    /// line break
    #[display("normal")]
    Normal,
    /// explicit `;` terminator
    #[display("strong")]
    Strong,
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Bracket {
    Square,
    Round,
}

impl Bracket {
    pub fn open(self) -> char {
        match self {
            Bracket::Square => '[',
            Bracket::Round => '(',
        }
    }

    pub fn close(self) -> char {
        match self {
            Bracket::Square => ']',
            Bracket::Round => ')',
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum TokenKind {
    /// Bare word: identifier, keyword, operator or brace
    Symbol(String),
    Integer(i128),
    Str(String),
    Label(String),
    Variable(String),
    Directive(String),
    Separator(Separator),
    Group { bracket: Bracket, tokens: Vec<Token> },
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub src: Src,
}

impl Token {
    #[inline]
    pub fn is_symbol(&self, symbol: &str) -> bool {
        matches!(&self.kind, TokenKind::Symbol(s) if s == symbol)
    }

    #[inline]
    pub fn separator(&self) -> Option<Separator> {
        match self.kind {
            TokenKind::Separator(sep) => Some(sep),
            _ => None,
        }
    }

    /// Whether the token can stand for an operand, as opposed to an operator or a keyword
    fn is_value(&self) -> bool {
        match &self.kind {
            TokenKind::Symbol(s) => {
                s.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
                    && !KEYWORDS.contains(&s.as_str())
            }
            TokenKind::Integer(_)
            | TokenKind::Str(_)
            | TokenKind::Label(_)
            | TokenKind::Variable(_)
            | TokenKind::Group { .. } => true,
            TokenKind::Directive(_) | TokenKind::Separator(_) => false,
        }
    }

    fn adjacent(&self, next: &Token) -> bool {
        self.src.offset() + self.src.len() == next.src.offset()
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Symbol(s) => f.write_str(s),
            TokenKind::Integer(value) => write!(f, "{}", value),
            TokenKind::Str(s) => write!(f, "{:?}", s),
            TokenKind::Label(name) => write!(f, "@{}", name),
            TokenKind::Variable(name) => write!(f, "${}", name),
            TokenKind::Directive(name) => write!(f, "!{}", name),
            TokenKind::Separator(Separator::Weak) => f.write_str(" "),
            TokenKind::Separator(Separator::Normal) => f.write_str("\n"),
            TokenKind::Separator(Separator::Strong) => f.write_str(";"),
            TokenKind::Group { bracket, tokens } => {
                write!(f, "{}", bracket.open())?;
                for token in tokens {
                    Display::fmt(token, f)?;
                }
                write!(f, "{}", bracket.close())
            }
        }
    }
}

/// Parses integer literal with optional sign, `0b`, `0o`, `0d` or `0x` base prefix and `_` digit
/// separators
pub fn parse_integer(text: &str) -> Option<i128> {
    let (negative, text) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = text.to_ascii_lowercase();
    let (radix, digits) = match lower.get(..2) {
        Some("0b") => (2, &lower[2..]),
        Some("0o") => (8, &lower[2..]),
        Some("0d") => (10, &lower[2..]),
        Some("0x") => (16, &lower[2..]),
        _ => (10, &lower[..]),
    };
    let digits = digits.replace('_', "");
    if digits.is_empty() || digits.starts_with(&['+', '-'][..]) {
        return None;
    }
    let value = i128::from_str_radix(&digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

/// Substitutes backslash escapes; unknown escapes are kept as they are
pub fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('b') => result.push('\x08'),
            Some('f') => result.push('\x0C'),
            Some('v') => result.push('\x0B'),
            Some('0') => result.push('\0'),
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

/// Splits the unit text into tokens. Comments are dropped; brackets become nested groups.
pub fn tokenize(unit: &Arc<SourceUnit>) -> Result<Vec<Token>, Issues<issues::Lexing>> {
    let fail = |error: LexError, src: Src| Err(Issues::with_error(error, &src));

    let mut pairs = match SourceParser::parse(Rule::source, &unit.text) {
        Ok(pairs) => pairs,
        Err(err) => {
            let pos = match err.location {
                pest::error::InputLocation::Pos(pos) => pos,
                pest::error::InputLocation::Span((start, _)) => start,
            };
            let found = unit.text[pos..].chars().next().map(String::from).unwrap_or_default();
            return fail(LexError::UnexpectedCharacter(found), Src::new(unit, pos, 1));
        }
    };
    let source = match pairs.next() {
        Some(pair) => pair,
        None => return Ok(vec![]),
    };

    let mut tokens = Vec::new();
    let mut groups: Vec<(Bracket, Src, Vec<Token>)> = Vec::new();

    for pair in source.into_inner() {
        let span = pair.as_span();
        let src = Src::new(unit, span.start(), span.end() - span.start());
        let text = span.as_str();
        let kind = match pair.as_rule() {
            Rule::comment | Rule::EOI => continue,
            Rule::newline if groups.is_empty() => TokenKind::Separator(Separator::Normal),
            Rule::newline | Rule::space => TokenKind::Separator(Separator::Weak),
            Rule::strong => TokenKind::Separator(Separator::Strong),
            Rule::open => {
                let bracket = if text == "[" { Bracket::Square } else { Bracket::Round };
                groups.push((bracket, src, Vec::new()));
                continue;
            }
            Rule::close => {
                let bracket = if text == "]" { Bracket::Square } else { Bracket::Round };
                let (opened, open_src, inner) = match groups.pop() {
                    Some(group) if group.0 == bracket => group,
                    Some((opened, open_src, _)) => {
                        return fail(LexError::UnterminatedBracket(opened.open()), open_src)
                    }
                    None => return fail(LexError::UnbalancedBracket(bracket.close()), src),
                };
                let token = Token {
                    kind: TokenKind::Group { bracket: opened, tokens: merge_signs(inner) },
                    src: open_src.join(&src),
                };
                match groups.last_mut() {
                    Some((_, _, parent)) => parent.push(token),
                    None => tokens.push(token),
                }
                continue;
            }
            Rule::string => TokenKind::Str(unescape(&text[1..text.len() - 1])),
            Rule::unterminated => {
                return fail(LexError::UnterminatedLiteral, Src::new(unit, span.start(), 1))
            }
            Rule::label => TokenKind::Label(text[1..].to_owned()),
            Rule::variable => TokenKind::Variable(text[1..].to_owned()),
            Rule::directive => TokenKind::Directive(text[1..].to_owned()),
            Rule::number => match parse_integer(text) {
                Some(value) => TokenKind::Integer(value),
                None => return fail(LexError::InvalidInteger(text.to_owned()), src),
            },
            Rule::brace | Rule::name | Rule::operator => TokenKind::Symbol(text.to_owned()),
            _ => return fail(LexError::UnexpectedCharacter(text.to_owned()), src),
        };
        let token = Token { kind, src };
        match groups.last_mut() {
            Some((_, _, parent)) => parent.push(token),
            None => tokens.push(token),
        }
    }

    if let Some((bracket, src, _)) = groups.pop() {
        return fail(LexError::UnterminatedBracket(bracket.open()), src);
    }

    Ok(merge_signs(tokens))
}

/// Folds `-` or `+` written right before an integer into the integer, unless the sign follows an
/// operand (`R2-5` and `R2 -5` stay subtractions)
fn merge_signs(tokens: Vec<Token>) -> Vec<Token> {
    let mut result: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        let sign = match &token.kind {
            TokenKind::Symbol(s) if s == "-" => -1,
            TokenKind::Symbol(s) if s == "+" => 1,
            _ => {
                result.push(token);
                continue;
            }
        };
        let follows_value = result
            .iter()
            .rev()
            .find(|prev| prev.separator() != Some(Separator::Weak))
            .map_or(false, Token::is_value);
        let next_integer = match iter.peek() {
            Some(next) if token.adjacent(next) => match next.kind {
                TokenKind::Integer(value) => Some((value, next.src.clone())),
                _ => None,
            },
            _ => None,
        };
        match next_integer {
            Some((value, src)) if !follows_value => {
                iter.next();
                let src = token.src.join(&src);
                result.push(Token { kind: TokenKind::Integer(sign * value), src });
            }
            _ => result.push(token),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(&SourceUnit::new("test", text))
            .unwrap()
            .into_iter()
            .filter(|t| t.separator() != Some(Separator::Weak))
            .map(|t| t.kind)
            .collect()
    }

    fn sym(s: &str) -> TokenKind { TokenKind::Symbol(s.to_owned()) }

    #[test]
    fn integers() {
        assert_eq!(parse_integer("0x1F"), Some(31));
        assert_eq!(parse_integer("0b1010_1010"), Some(0xAA));
        assert_eq!(parse_integer("0o17"), Some(15));
        assert_eq!(parse_integer("0d19"), Some(19));
        assert_eq!(parse_integer("-42"), Some(-42));
        assert_eq!(parse_integer("1_000"), Some(1000));
        assert_eq!(parse_integer("0b102"), None);
        assert_eq!(parse_integer("0x"), None);
        assert_eq!(parse_integer("12ab"), None);
    }

    #[test]
    fn escapes() {
        assert_eq!(unescape(r#"a\nb\t\"c\"\\"#), "a\nb\t\"c\"\\");
        assert_eq!(unescape(r"\0\b\f\v\r"), "\0\x08\x0C\x0B\r");
        assert_eq!(unescape(r"\q"), r"\q");
    }

    #[test]
    fn statement_tokens() {
        assert_eq!(kinds("R1 = R2 + 0x10 # comment"), vec![
            sym("R1"),
            sym("="),
            sym("R2"),
            sym("+"),
            TokenKind::Integer(16)
        ]);
        assert_eq!(kinds("@loop: $x = -5; !data \"hi\\n\""), vec![
            TokenKind::Label(s!("loop")),
            sym(":"),
            TokenKind::Variable(s!("x")),
            sym("="),
            TokenKind::Integer(-5),
            TokenKind::Separator(Separator::Strong),
            TokenKind::Directive(s!("data")),
            TokenKind::Str(s!("hi\n")),
        ]);
        assert_eq!(kinds("R1=R2-5"), vec![
            sym("R1"),
            sym("="),
            sym("R2"),
            sym("-"),
            TokenKind::Integer(5)
        ]);
        assert_eq!(kinds("R1 = R2 -5"), vec![
            sym("R1"),
            sym("="),
            sym("R2"),
            sym("-"),
            TokenKind::Integer(5)
        ]);
        assert_eq!(kinds("push -5"), vec![sym("push"), TokenKind::Integer(-5)]);
        assert_eq!(kinds("R1 = - 3"), vec![sym("R1"), sym("="), sym("-"), TokenKind::Integer(3)]);
        assert_eq!(kinds("if R1 != 0 {\n}"), vec![
            sym("if"),
            sym("R1"),
            sym("!="),
            TokenKind::Integer(0),
            sym("{"),
            TokenKind::Separator(Separator::Normal),
            sym("}"),
        ]);
    }

    #[test]
    fn groups() {
        let tokens = kinds("[R1 +\n 2] = 3");
        match &tokens[0] {
            TokenKind::Group { bracket: Bracket::Square, tokens } => {
                let inner: Vec<_> = tokens
                    .iter()
                    .filter(|t| t.separator().is_none())
                    .map(|t| t.kind.clone())
                    .collect();
                assert_eq!(inner, vec![sym("R1"), sym("+"), TokenKind::Integer(2)]);
            }
            other => panic!("unexpected token {:?}", other),
        }
        assert_eq!(tokens[1..], [sym("="), TokenKind::Integer(3)]);

        match &kinds("[R1 + -2]")[0] {
            TokenKind::Group { tokens, .. } => {
                let last = tokens.last().map(|t| t.kind.clone());
                assert_eq!(last, Some(TokenKind::Integer(-2)));
            }
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn lexical_errors() {
        let unit = SourceUnit::new("test", "R1 = \"abc");
        let err = tokenize(&unit).unwrap_err();
        assert_eq!(err.errors().next(), Some(&LexError::UnterminatedLiteral));
        assert_eq!(err.first_src().unwrap().offset(), 5);

        let unit = SourceUnit::new("test", "R1 = [R2 + 1");
        let err = tokenize(&unit).unwrap_err();
        assert_eq!(err.errors().next(), Some(&LexError::UnterminatedBracket('[')));
        assert_eq!(err.first_src().unwrap().offset(), 5);

        let unit = SourceUnit::new("test", "R1 = R2)");
        let err = tokenize(&unit).unwrap_err();
        assert_eq!(err.errors().next(), Some(&LexError::UnbalancedBracket(')')));

        let unit = SourceUnit::new("test", "R1 = 0b12");
        let err = tokenize(&unit).unwrap_err();
        assert_eq!(err.errors().next(), Some(&LexError::InvalidInteger(s!("0b12"))));
    }
}
