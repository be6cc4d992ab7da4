//! Cross-module index of exported symbols.
//!
//! Three views over one arena: by qualified name (unique), by simple name
//! (possibly ambiguous), and by module. Simple-name lookup of an ambiguous
//! name returns every candidate; the type checker forces a qualified
//! reference in that case.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::{DeclKind, Program};
use crate::scope::SymbolKind;
use crate::source::SourceSpan;

/// One exported symbol, as visible across modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSymbol {
    pub module: String,
    pub name: String,
    pub kind: SymbolKind,
    pub location: SourceSpan,
}

impl GlobalSymbol {
    /// `Module::name`, the unique key.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

/// Result of a simple-name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleLookup<'a> {
    NotFound,
    Unique(&'a GlobalSymbol),
    /// More than one module exports the name; the caller must qualify.
    Ambiguous(Vec<&'a GlobalSymbol>),
}

#[derive(Debug, Default)]
pub struct GlobalSymbolTable {
    entries: Vec<GlobalSymbol>,
    by_qualified: IndexMap<String, usize>,
    by_simple: AHashMap<String, Vec<usize>>,
    by_module: AHashMap<String, Vec<usize>>,
}

impl GlobalSymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every exported declaration of `program`.
    pub fn add_module(&mut self, program: &Program) {
        for decl in &program.decls {
            if !decl.is_exported() {
                continue;
            }
            let Some(name) = decl.name() else { continue };
            let kind = match &decl.kind {
                DeclKind::Function(_) => SymbolKind::Function,
                DeclKind::Variable(v) if v.is_const => SymbolKind::Constant,
                DeclKind::Variable(_) | DeclKind::Map(_) => SymbolKind::Variable,
                DeclKind::Enum(_) | DeclKind::TypeAlias(_) => SymbolKind::Constant,
                DeclKind::Import(_) => continue,
            };
            self.insert(GlobalSymbol {
                module: program.name.clone(),
                name: name.to_owned(),
                kind,
                location: decl.location,
            });
        }
    }

    fn insert(&mut self, symbol: GlobalSymbol) {
        let index = self.entries.len();
        self.by_qualified.insert(symbol.qualified_name(), index);
        self.by_simple.entry(symbol.name.clone()).or_default().push(index);
        self.by_module.entry(symbol.module.clone()).or_default().push(index);
        self.entries.push(symbol);
    }

    #[must_use]
    pub fn lookup_qualified(&self, module: &str, name: &str) -> Option<&GlobalSymbol> {
        let key = format!("{module}::{name}");
        self.by_qualified.get(&key).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn lookup_simple(&self, name: &str) -> SimpleLookup<'_> {
        match self.by_simple.get(name).map(Vec::as_slice) {
            None | Some([]) => SimpleLookup::NotFound,
            Some([index]) => SimpleLookup::Unique(&self.entries[*index]),
            Some(indices) => SimpleLookup::Ambiguous(indices.iter().map(|&i| &self.entries[i]).collect()),
        }
    }

    /// Exports of one module, in declaration order.
    pub fn module_exports(&self, module: &str) -> impl Iterator<Item = &GlobalSymbol> {
        self.by_module
            .get(module)
            .into_iter()
            .flatten()
            .map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;

    fn module_with_export(module: &str, symbol: &str) -> Program {
        let mut b = AstBuilder::new();
        let body = {
            let one = b.number(1);
            vec![b.ret(Some(one))]
        };
        let decl = b.function(symbol, vec![], Some(b.ty("byte")), body);
        let decl = AstBuilder::export(decl);
        b.program(module, vec![decl])
    }

    #[test]
    fn qualified_lookup_finds_export() {
        let mut globals = GlobalSymbolTable::new();
        globals.add_module(&module_with_export("A", "helper"));
        let found = globals.lookup_qualified("A", "helper").unwrap();
        assert_eq!(found.kind, SymbolKind::Function);
        assert_eq!(found.qualified_name(), "A::helper");
        assert!(globals.lookup_qualified("B", "helper").is_none());
    }

    #[test]
    fn simple_lookup_reports_ambiguity() {
        let mut globals = GlobalSymbolTable::new();
        globals.add_module(&module_with_export("A", "init"));
        globals.add_module(&module_with_export("B", "init"));
        match globals.lookup_simple("init") {
            SimpleLookup::Ambiguous(candidates) => {
                let modules: Vec<_> = candidates.iter().map(|c| c.module.as_str()).collect();
                assert_eq!(modules, vec!["A", "B"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
        assert!(matches!(globals.lookup_simple("missing"), SimpleLookup::NotFound));
    }
}
