// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Linker expanding `!include` statements with the statements of the included units

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::issues::{self, Issues, LinkError, LinkWarning, SourceUnit};
use crate::statement::{Include, Kind, Statement};
use crate::MainError;

/// Source of compilation units referenced by `!include`
pub trait SourceProvider {
    fn provide(&self, name: &str) -> Result<Arc<SourceUnit>, LinkError>;
}

/// Looks units up in a list of directories, trying the name as is and with the `.asm` extension
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct DirectoryProvider {
    dirs: Vec<PathBuf>,
}

impl DirectoryProvider {
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        DirectoryProvider { dirs: dirs.into_iter().map(Into::into).collect() }
    }

    #[inline]
    pub fn dirs(&self) -> &[PathBuf] { &self.dirs }
}

impl SourceProvider for DirectoryProvider {
    fn provide(&self, name: &str) -> Result<Arc<SourceUnit>, LinkError> {
        let candidates = [name.to_owned(), format!("{}.asm", name)];
        for dir in &self.dirs {
            for candidate in &candidates {
                let path = dir.join(candidate);
                match fs::read_to_string(&path) {
                    Ok(text) => return Ok(SourceUnit::new(path.display(), text)),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        return Err(LinkError::ReadFailure {
                            unit: path.display().to_string(),
                            details: err.to_string(),
                        })
                    }
                }
            }
        }
        Err(LinkError::UnitNotFound(name.to_owned()))
    }
}

/// Units kept in memory; used by tests and by hosts embedding the assembler
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct MemoryProvider {
    units: BTreeMap<String, String>,
}

impl MemoryProvider {
    pub fn new() -> Self { MemoryProvider::default() }

    pub fn with(mut self, name: impl ToString, text: impl ToString) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl ToString, text: impl ToString) {
        self.units.insert(name.to_string(), text.to_string());
    }
}

impl SourceProvider for MemoryProvider {
    fn provide(&self, name: &str) -> Result<Arc<SourceUnit>, LinkError> {
        self.units
            .get(name)
            .map(|text| SourceUnit::new(name, text))
            .ok_or_else(|| LinkError::UnitNotFound(name.to_owned()))
    }
}

/// Statements of a unit with all of its includes expanded
#[derive(Clone, Debug)]
pub struct Linked {
    pub statements: Vec<Statement>,
    /// Warnings collected from the unit and everything it includes
    pub warnings: Issues<issues::Linking>,
}

pub struct Linker<'a, P: SourceProvider + ?Sized> {
    analyzer: &'a Analyzer,
    provider: &'a P,
}

impl<'a, P: SourceProvider + ?Sized> Linker<'a, P> {
    pub fn new(analyzer: &'a Analyzer, provider: &'a P) -> Self { Linker { analyzer, provider } }

    pub fn link(&self, unit: &Arc<SourceUnit>) -> Result<Linked, MainError> {
        let mut warnings = Issues::default();
        let mut chain = vec![unit.id.clone()];
        let statements = self.expand(unit, &mut chain, &mut warnings)?;
        Ok(Linked { statements, warnings })
    }

    fn expand(
        &self,
        unit: &Arc<SourceUnit>,
        chain: &mut Vec<String>,
        warnings: &mut Issues<issues::Linking>,
    ) -> Result<Vec<Statement>, MainError> {
        let statements = self.analyzer.analyze(unit).map_err(|err| MainError::analyze(unit, err))?;

        let mut issues = Issues::<issues::Linking>::default();
        let mut seen = BTreeSet::new();
        let mut linked = Vec::with_capacity(statements.len());

        for statement in statements {
            let include = match &statement.kind {
                Kind::Include(include) => include.clone(),
                _ => {
                    linked.push(statement);
                    continue;
                }
            };
            let name = match &include {
                Include::Unit(name) | Include::Scope { unit: name, .. } => name.clone(),
            };

            if !seen.insert(include.clone()) {
                warnings.push_warning(LinkWarning::RepeatedInclude(name), &statement.src);
                continue;
            }

            let included = match self.provider.provide(&name) {
                Ok(included) => included,
                Err(err) => {
                    issues.push_error(err, &statement.src);
                    continue;
                }
            };
            if chain.contains(&included.id) {
                let cycle = LinkError::CircularInclude {
                    unit: included.id.clone(),
                    chain: chain.join(" -> "),
                };
                issues.push_error(cycle, &statement.src);
                continue;
            }

            debug!("Including `{}` into `{}`", included.id, unit.id);
            chain.push(included.id.clone());
            let expanded = self.expand(&included, chain, warnings);
            chain.pop();
            let expanded = expanded.map_err(|err| MainError::Included {
                unit: unit.id.clone(),
                included: included.id.clone(),
                source: Box::new(err),
            })?;

            match include {
                Include::Unit(_) => linked.extend(expanded),
                Include::Scope { scope, alias, .. } => match extract_scope(expanded, &scope) {
                    Some(mut body) => {
                        if let (Some(alias), Some(open)) = (alias, body.first_mut()) {
                            if let Kind::ScopeOpen { name, .. } = &mut open.kind {
                                *name = Some(alias);
                            }
                        }
                        linked.extend(body);
                    }
                    None => issues.push_error(
                        LinkError::ScopeNotFound { scope, unit: included.id.clone() },
                        &statement.src,
                    ),
                },
            }
        }

        if issues.has_errors() {
            return Err(MainError::Linking(
                unit.id.clone(),
                issues.count_errors(),
                issues.count_warnings(),
                issues,
            ));
        }
        Ok(linked)
    }
}

/// Statements of the top-level scope `name`, from its opening to its matching closing statement
fn extract_scope(statements: Vec<Statement>, name: &str) -> Option<Vec<Statement>> {
    let mut depth = 0usize;
    let mut body: Option<Vec<Statement>> = None;
    for statement in statements {
        let opens = matches!(statement.kind, Kind::ScopeOpen { .. });
        let closes = statement.kind == Kind::ScopeClose;
        let wanted =
            matches!(&statement.kind, Kind::ScopeOpen { name: Some(open), .. } if open == name);
        match body.as_mut() {
            None if depth == 0 && wanted => {
                depth = 1;
                body = Some(vec![statement]);
            }
            None if opens => depth += 1,
            None if closes => depth = depth.saturating_sub(1),
            None => {}
            Some(collected) => {
                if opens {
                    depth += 1;
                } else if closes {
                    depth -= 1;
                }
                collected.push(statement);
                if depth == 0 {
                    return body;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(provider: &MemoryProvider, root: &str) -> Result<Linked, MainError> {
        let analyzer = Analyzer::default();
        let unit = provider.provide(root).unwrap();
        Linker::new(&analyzer, provider).link(&unit)
    }

    #[test]
    fn unit_include() {
        let provider = MemoryProvider::new()
            .with("main", "!include \"lib\"\nR1 = 1")
            .with("lib", "@helper: R2 = 2");
        let linked = link(&provider, "main").unwrap();
        let kinds: Vec<_> = linked.statements.iter().map(|s| s.kind.clone()).collect();
        assert_eq!(kinds.len(), 3);
        assert_eq!(kinds[0], Kind::Label(s!("helper")));
        assert_eq!(linked.statements[1].src.unit_id(), "lib");
        assert_eq!(linked.statements[2].src.unit_id(), "main");
    }

    #[test]
    fn scope_include_with_alias() {
        let provider = MemoryProvider::new()
            .with("main", "!include @math from \"lib\" as @m\nR1 = 1")
            .with("lib", "R0 = 0\n@math {\n @inner {\n }\n R1 = 2\n}\n@other {\n}");
        let linked = link(&provider, "main").unwrap();
        let kinds: Vec<_> = linked.statements.iter().map(|s| s.kind.clone()).collect();
        assert_eq!(kinds[0], Kind::ScopeOpen { name: Some(s!("m")), position: None });
        assert_eq!(kinds[1], Kind::ScopeOpen { name: Some(s!("inner")), position: None });
        assert_eq!(kinds[2], Kind::ScopeClose);
        assert_eq!(kinds[4], Kind::ScopeClose);
        assert_eq!(kinds.len(), 6);
    }

    #[test]
    fn repeated_include_warns() {
        let provider = MemoryProvider::new()
            .with("main", "!include \"lib\"\n!include \"lib\"")
            .with("lib", "nop");
        let linked = link(&provider, "main").unwrap();
        assert_eq!(linked.statements.len(), 1);
        assert_eq!(linked.warnings.count_warnings(), 1);
    }

    #[test]
    fn circular_include() {
        let provider = MemoryProvider::new()
            .with("a", "!include \"b\"")
            .with("b", "!include \"a\"");
        match link(&provider, "a").unwrap_err() {
            MainError::Included { included, source, .. } => {
                assert_eq!(included, "b");
                match *source {
                    MainError::Linking(unit, 1, 0, issues) => {
                        assert_eq!(unit, "b");
                        assert!(matches!(
                            issues.errors().next(),
                            Some(LinkError::CircularInclude { unit, .. }) if unit == "a"
                        ));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_unit_and_scope() {
        let provider = MemoryProvider::new()
            .with("main", "!include \"nowhere\"\n!include @absent from \"lib\"")
            .with("lib", "nop");
        match link(&provider, "main").unwrap_err() {
            MainError::Linking(_, 2, 0, issues) => {
                let errors: Vec<_> = issues.errors().cloned().collect();
                assert_eq!(errors, vec![
                    LinkError::UnitNotFound(s!("nowhere")),
                    LinkError::ScopeNotFound { scope: s!("absent"), unit: s!("lib") },
                ]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
