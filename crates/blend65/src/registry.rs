//! Module registry and import resolution.
//!
//! The registry tracks every parsed module by name. The resolver validates
//! import declarations against the exporting module's declarations and
//! caches each module's export map on first use; [`ImportResolver::reset`]
//! invalidates the cache when the registry changes.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::{Decl, DeclKind, ImportDecl, ImportList, Program};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::source::SourceSpan;

/// One registered module.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub program: Program,
    /// Registration sequence number; later registrations of the same name
    /// replace earlier ones and bump this.
    pub registered_at: u64,
}

/// Name → parsed module, in registration order.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, Module>,
    next_seq: u64,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parsed program under its module name, replacing any
    /// earlier registration.
    pub fn register(&mut self, program: Program) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.modules.insert(
            program.name.clone(),
            Module {
                name: program.name.clone(),
                program,
                registered_at: seq,
            },
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// One exported declaration, as seen by importers.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub name: String,
    pub location: SourceSpan,
    /// Which declaration form exported the name; importers mirror enum and
    /// alias types into their own type tables.
    pub kind: ExportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    Variable,
    Constant,
    Enum,
    TypeAlias,
    Map,
}

impl ExportKind {
    fn of(decl: &Decl) -> Option<Self> {
        match &decl.kind {
            DeclKind::Function(_) => Some(Self::Function),
            DeclKind::Variable(v) if v.is_const => Some(Self::Constant),
            DeclKind::Variable(_) => Some(Self::Variable),
            DeclKind::Enum(_) => Some(Self::Enum),
            DeclKind::TypeAlias(_) => Some(Self::TypeAlias),
            DeclKind::Map(_) => Some(Self::Map),
            DeclKind::Import(_) => None,
        }
    }
}

/// An import validated against the exporting module.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    /// Name bound in the importing module.
    pub name: String,
    /// Name in the source module (identical until aliasing lands in the
    /// surface syntax).
    pub original_name: String,
    pub source_module: String,
    pub kind: ExportKind,
    /// Location of the import name (or the whole declaration for `*`).
    pub location: SourceSpan,
}

/// Validates imports and caches export maps per module.
#[derive(Debug, Default)]
pub struct ImportResolver {
    export_cache: AHashMap<String, IndexMap<String, ExportEntry>>,
}

impl ImportResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cached export map. Call after mutating the registry.
    pub fn reset(&mut self) {
        self.export_cache.clear();
    }

    fn exports_of<'a>(
        cache: &'a mut AHashMap<String, IndexMap<String, ExportEntry>>,
        module: &Module,
    ) -> &'a IndexMap<String, ExportEntry> {
        cache.entry(module.name.clone()).or_insert_with(|| {
            let mut exports = IndexMap::new();
            for decl in &module.program.decls {
                if !decl.is_exported() {
                    continue;
                }
                let (Some(name), Some(kind)) = (decl.name(), ExportKind::of(decl)) else {
                    continue;
                };
                exports.insert(
                    name.to_owned(),
                    ExportEntry {
                        name: name.to_owned(),
                        location: decl.location,
                        kind,
                    },
                );
            }
            exports
        })
    }

    /// Validates one import declaration.
    ///
    /// Reports `MODULE_NOT_FOUND`, `SYMBOL_NOT_FOUND`, `SYMBOL_NOT_EXPORTED`
    /// or `NO_EXPORTS` and keeps resolving the remaining names, so one bad
    /// name doesn't hide its siblings.
    pub fn resolve(
        &mut self,
        import: &ImportDecl,
        location: SourceSpan,
        registry: &ModuleRegistry,
        diagnostics: &mut DiagnosticBag,
    ) -> Vec<ResolvedImport> {
        let Some(module) = registry.get(&import.module) else {
            diagnostics.report(
                DiagnosticCode::ModuleNotFound,
                format!("module '{}' is not registered", import.module),
                location,
            );
            return Vec::new();
        };
        let exports = Self::exports_of(&mut self.export_cache, module);

        match &import.list {
            ImportList::Wildcard => {
                if exports.is_empty() {
                    diagnostics.report(
                        DiagnosticCode::NoExports,
                        format!("module '{}' has no exported symbols", import.module),
                        location,
                    );
                    return Vec::new();
                }
                exports
                    .values()
                    .map(|entry| ResolvedImport {
                        name: entry.name.clone(),
                        original_name: entry.name.clone(),
                        source_module: import.module.clone(),
                        kind: entry.kind,
                        location,
                    })
                    .collect()
            }
            ImportList::Named(names) => {
                let mut resolved = Vec::with_capacity(names.len());
                for wanted in names {
                    if let Some(entry) = exports.get(&wanted.name) {
                        resolved.push(ResolvedImport {
                            name: wanted.name.clone(),
                            original_name: entry.name.clone(),
                            source_module: import.module.clone(),
                            kind: entry.kind,
                            location: wanted.location,
                        });
                    } else if module.program.find_decl(&wanted.name).is_some() {
                        diagnostics.report(
                            DiagnosticCode::SymbolNotExported,
                            format!("'{}' exists in module '{}' but is not exported", wanted.name, import.module),
                            wanted.location,
                        );
                    } else {
                        diagnostics.report(
                            DiagnosticCode::SymbolNotFound,
                            format!("module '{}' does not declare '{}'", import.module, wanted.name),
                            wanted.location,
                        );
                    }
                }
                resolved
            }
        }
    }
}
