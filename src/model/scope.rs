// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Scope tree, anchors and variable definitions shared by the resolution passes

use std::collections::BTreeMap;

use crate::arch::Architecture;
use crate::issues::Src;
use crate::statement::{AnchorId, Arg, ScopeId, VariableId};

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum ScopeKind {
    Global,
    Named(String),
    Unnamed,
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub start: Option<AnchorId>,
    pub end: Option<AnchorId>,
    /// Explicit program index the scope must be placed at
    pub position: Option<u64>,
    pub labels: BTreeMap<String, AnchorId>,
    pub variables: BTreeMap<String, VariableId>,
    pub children: BTreeMap<String, ScopeId>,
    pub src: Option<Src>,
}

impl Scope {
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ScopeKind::Named(name) => Some(name),
            _ => None,
        }
    }

    #[inline]
    pub fn is_global(&self) -> bool { self.kind == ScopeKind::Global }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum AnchorKind {
    Label(String),
    ScopeStart(ScopeId),
    ScopeEnd(ScopeId),
    Unnamed,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Anchor {
    pub kind: AnchorKind,
    /// Final program index, known after anchor indices are applied
    pub index: Option<u64>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct VariableDef {
    pub name: String,
    pub scope: ScopeId,
    pub value: Arg,
}

/// Arena owning every scope, anchor and variable of a compilation. Statements refer to the
/// arena entries by their handles.
#[derive(Debug)]
pub struct Context<'a> {
    pub arch: &'a Architecture,
    scopes: Vec<Scope>,
    anchors: Vec<Anchor>,
    variables: Vec<VariableDef>,
}

impl<'a> Context<'a> {
    pub fn new(arch: &'a Architecture) -> Self {
        let global = Scope {
            kind: ScopeKind::Global,
            parent: None,
            start: None,
            end: None,
            position: None,
            labels: empty!(),
            variables: empty!(),
            children: empty!(),
            src: None,
        };
        Context { arch, scopes: vec![global], anchors: vec![], variables: vec![] }
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        self.scopes
            .get(id.index())
            .unwrap_or_else(|| panic!("{} does not belong to the compilation context", id))
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        self.scopes
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("{} does not belong to the compilation context", id))
    }

    pub fn anchor(&self, id: AnchorId) -> &Anchor {
        self.anchors
            .get(id.index())
            .unwrap_or_else(|| panic!("{} does not belong to the compilation context", id))
    }

    pub fn anchor_mut(&mut self, id: AnchorId) -> &mut Anchor {
        self.anchors
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("{} does not belong to the compilation context", id))
    }

    pub fn variable(&self, id: VariableId) -> &VariableDef {
        self.variables
            .get(id.index())
            .unwrap_or_else(|| panic!("{} does not belong to the compilation context", id))
    }

    pub fn variable_mut(&mut self, id: VariableId) -> &mut VariableDef {
        self.variables
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("{} does not belong to the compilation context", id))
    }

    #[inline]
    pub fn scopes(&self) -> &[Scope] { &self.scopes }

    #[inline]
    pub fn anchors(&self) -> &[Anchor] { &self.anchors }

    pub fn variable_ids(&self) -> impl Iterator<Item = VariableId> {
        (0..self.variables.len() as u32).map(VariableId)
    }

    /// Creates local scope under `parent` together with its start and end anchors. Returns
    /// `None` if the parent already has a child scope with the same name.
    pub fn new_scope(
        &mut self,
        parent: ScopeId,
        name: Option<String>,
        position: Option<u64>,
        src: Src,
    ) -> Option<ScopeId> {
        let id = ScopeId(self.scopes.len() as u32);
        if let Some(name) = &name {
            if self.scope(parent).children.contains_key(name) {
                return None;
            }
            self.scope_mut(parent).children.insert(name.clone(), id);
        }
        let start = self.new_anchor(AnchorKind::ScopeStart(id));
        let end = self.new_anchor(AnchorKind::ScopeEnd(id));
        self.scopes.push(Scope {
            kind: name.map(ScopeKind::Named).unwrap_or(ScopeKind::Unnamed),
            parent: Some(parent),
            start: Some(start),
            end: Some(end),
            position,
            labels: empty!(),
            variables: empty!(),
            children: empty!(),
            src: Some(src),
        });
        Some(id)
    }

    pub fn new_anchor(&mut self, kind: AnchorKind) -> AnchorId {
        let id = AnchorId(self.anchors.len() as u32);
        self.anchors.push(Anchor { kind, index: None });
        id
    }

    /// Registers label in the scope. Returns `None` if the scope already has such label.
    pub fn define_label(&mut self, scope: ScopeId, name: &str) -> Option<AnchorId> {
        if self.scope(scope).labels.contains_key(name) {
            return None;
        }
        let anchor = self.new_anchor(AnchorKind::Label(name.to_owned()));
        self.scope_mut(scope).labels.insert(name.to_owned(), anchor);
        Some(anchor)
    }

    /// Registers variable in the scope. Returns `None` if the scope already has such variable.
    pub fn define_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        value: Arg,
    ) -> Option<VariableId> {
        if self.scope(scope).variables.contains_key(name) {
            return None;
        }
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(VariableDef { name: name.to_owned(), scope, value });
        self.scope_mut(scope).variables.insert(name.to_owned(), id);
        Some(id)
    }

    /// Walks from `scope` up to the global scope
    pub fn ancestry(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        let mut next = Some(scope);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.scope(current).parent;
            Some(current)
        })
    }

    pub fn lookup_label(&self, scope: ScopeId, name: &str) -> Option<AnchorId> {
        self.ancestry(scope).find_map(|id| self.scope(id).labels.get(name).copied())
    }

    pub fn lookup_variable(&self, scope: ScopeId, name: &str) -> Option<VariableId> {
        self.ancestry(scope).find_map(|id| self.scope(id).variables.get(name).copied())
    }

    /// Finds named scope visible from `scope`: either one of the enclosing scopes or a child of
    /// one of them
    pub fn lookup_scope(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        self.ancestry(scope).find_map(|id| {
            let current = self.scope(id);
            if current.name() == Some(name) {
                return Some(id);
            }
            current.children.get(name).copied()
        })
    }

    /// Innermost local scope enclosing `scope`, or `None` when it is the global scope
    pub fn innermost_local(&self, scope: ScopeId) -> Option<ScopeId> {
        Some(scope).filter(|id| !self.scope(*id).is_global())
    }

    /// Start anchor of the global `start` label, if defined
    pub fn start_label(&self) -> Option<AnchorId> {
        self.scope(ScopeId::GLOBAL).labels.get(START_LABEL).copied()
    }
}

/// Label marking program entry point
pub const START_LABEL: &str = "start";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::issues::SourceUnit;
    use crate::statement::Value;

    fn src() -> Src { Src::new(&SourceUnit::new("test", "x"), 0, 1) }

    #[test]
    fn lookup_walks_parents() {
        let arch = arch::by_id("rx8").unwrap();
        let mut ctx = Context::new(&arch);
        let outer = ctx.new_scope(ScopeId::GLOBAL, Some(s!("outer")), None, src()).unwrap();
        let inner = ctx.new_scope(outer, Some(s!("inner")), None, src()).unwrap();
        let label = ctx.define_label(outer, "loop").unwrap();
        let var =
            ctx.define_variable(ScopeId::GLOBAL, "x", Arg::new(Value::Int(1), src())).unwrap();

        assert_eq!(ctx.lookup_label(inner, "loop"), Some(label));
        assert_eq!(ctx.lookup_label(ScopeId::GLOBAL, "loop"), None);
        assert_eq!(ctx.lookup_variable(inner, "x"), Some(var));
        assert_eq!(ctx.lookup_scope(inner, "outer"), Some(outer));
        assert_eq!(ctx.lookup_scope(ScopeId::GLOBAL, "outer"), Some(outer));
        assert_eq!(ctx.lookup_scope(inner, "inner"), Some(inner));
        assert_eq!(ctx.innermost_local(inner), Some(inner));
        assert_eq!(ctx.innermost_local(ScopeId::GLOBAL), None);
        assert_eq!(ctx.ancestry(inner).collect::<Vec<_>>(), vec![inner, outer, ScopeId::GLOBAL]);
    }

    #[test]
    fn repeated_definitions() {
        let arch = arch::by_id("rx8").unwrap();
        let mut ctx = Context::new(&arch);
        assert!(ctx.new_scope(ScopeId::GLOBAL, Some(s!("a")), None, src()).is_some());
        assert!(ctx.new_scope(ScopeId::GLOBAL, Some(s!("a")), None, src()).is_none());
        assert!(ctx.new_scope(ScopeId::GLOBAL, None, None, src()).is_some());
        assert!(ctx.define_label(ScopeId::GLOBAL, "l").is_some());
        assert!(ctx.define_label(ScopeId::GLOBAL, "l").is_none());
    }
}
